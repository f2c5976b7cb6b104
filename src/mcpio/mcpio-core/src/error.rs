use crate::constants::status;
use core::fmt;

/// Failure conditions reported by every fallible expander operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Pin, port, register or mode outside its valid domain; nothing was sent on the bus
    OutOfRange,
    /// The device did not acknowledge a register write
    WriteFailure,
    /// The device did not answer a register read
    ReadFailure,
    /// `configure_output` was given no host pin
    PinAssignment,
    /// Host vector attach/detach failed, the reset line refused a level, or the
    /// pin is configured as an output
    OperationFailed,
    /// A service pass found no flag bit set
    UndeterminedPin,
    /// `bind_trigger` was called before `configure_output` succeeded
    NotConfigured,
    /// Every trampoline slot is already owned by another instance
    RegistryFull,
}

impl Error {
    /// Numeric status code, `status::OK` being reserved for success
    pub fn code(self) -> u8 {
        match self {
            Error::OutOfRange => status::OUT_OF_RANGE,
            Error::WriteFailure => status::WRITE_FAILURE,
            Error::ReadFailure => status::READ_FAILURE,
            Error::PinAssignment => status::PIN_ASSIGNMENT,
            Error::OperationFailed => status::OPERATION_FAILED,
            Error::UndeterminedPin => status::UNDETERMINED_PIN,
            Error::NotConfigured => status::NOT_CONFIGURED,
            Error::RegistryFull => status::REGISTRY_FULL,
        }
    }

    /// Collapse a result into a status code
    pub fn status<T>(result: &Result<T, Error>) -> u8 {
        match result {
            Ok(_) => status::OK,
            Err(e) => e.code(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::OutOfRange => "value out of range",
            Error::WriteFailure => "device write failed",
            Error::ReadFailure => "device read failed",
            Error::PinAssignment => "no host interrupt pin assigned",
            Error::OperationFailed => "operation failed",
            Error::UndeterminedPin => "unable to determine interrupt pin",
            Error::NotConfigured => "interrupt output not configured",
            Error::RegistryFull => "no free interrupt slot",
        };
        write!(f, "{} (0x{:02x})", msg, self.code())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
