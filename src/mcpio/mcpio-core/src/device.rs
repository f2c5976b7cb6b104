use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use log::{debug, warn};

use crate::constants::registers::IOCON;
use crate::constants::{iocon, RESET_PULSE_MS};
use crate::error::Error;
use crate::host::HostVector;
use crate::interrupt::{InterruptState, SlotGuard, REGISTRY};
use crate::registers::{AddressMode, RegisterBank, RegisterDump};
use crate::transport::{I2cTransport, RegisterTransport};
use crate::utils::set_bit;

// Hardware strapping range of A2..A0
const ADDRESS_RANGE: core::ops::RangeInclusive<u8> = 0x20..=0x27;

/// Fixed facts about one expander instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentity {
    pub address: u8, // 7-bit bus address
    pub slot: usize, // Callback registry slot
}

/// One MCP23017 on the bus.
///
/// Owns the register mirror, the reset line, the host interrupt vectors and
/// a callback registry slot. Pin and interrupt operations live on the
/// `PinControl` and `InterruptControl` traits.
pub struct Expander<T, RST, H> {
    pub(crate) bank: RegisterBank<T>,
    reset_line: RST,
    pub(crate) host: H,
    identity: DeviceIdentity,
    pub(crate) slot: SlotGuard,
    pub(crate) interrupts: InterruptState,
}

impl<I2C, RST, H> Expander<I2cTransport<I2C>, RST, H>
where
    I2C: I2c,
    RST: OutputPin,
    H: HostVector,
{
    /// Creates an expander on an I2C bus. Fails with `RegistryFull` when
    /// every trampoline slot is taken.
    pub fn new(i2c: I2C, reset_line: RST, address: u8, host: H) -> Result<Self, Error> {
        Self::with_transport(I2cTransport::new(i2c, address), reset_line, address, host)
    }
}

impl<T, RST, H> Expander<T, RST, H>
where
    T: RegisterTransport,
    RST: OutputPin,
    H: HostVector,
{
    pub fn with_transport(
        transport: T,
        reset_line: RST,
        address: u8,
        host: H,
    ) -> Result<Self, Error> {
        if !ADDRESS_RANGE.contains(&address) {
            return Err(Error::OutOfRange);
        }
        let slot = REGISTRY.claim()?;
        debug!("expander 0x{:02x} owns slot {}", address, slot.index());
        Ok(Expander {
            bank: RegisterBank::new(transport),
            reset_line,
            host,
            identity: DeviceIdentity {
                address,
                slot: slot.index(),
            },
            slot,
            interrupts: InterruptState::new(),
        })
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// Detects the device, resets it and loads the mirror. A missing device
    /// is still reset but reported as `WriteFailure`.
    pub fn begin(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        let present = self.bank.probe();
        match present {
            Ok(()) => debug!("MCP23017 found at 0x{:02x}", self.identity.address),
            Err(_) => warn!("MCP23017 not found at 0x{:02x}", self.identity.address),
        }
        self.reset(delay)?;
        present?;
        self.bank.sync_all()
    }

    /// Pulses the reset line and returns all host-side state to power-on
    /// defaults: mirror, paired layout, bindings and host vectors.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        if let Err(e) = self.detach_host() {
            warn!("detach during reset failed: {}", e);
        }
        self.interrupts.reset();
        self.slot.clear_pending();
        self.bank.reset_mirror();

        self.reset_line
            .set_low()
            .map_err(|_| Error::OperationFailed)?;
        delay.delay_ms(RESET_PULSE_MS);
        self.reset_line
            .set_high()
            .map_err(|_| Error::OperationFailed)
    }

    /// Switches the device between paired and grouped register layouts
    pub fn set_address_mode(&mut self, mode: AddressMode) -> Result<(), Error> {
        let current = self.bank.sync_one(IOCON)?;
        let value = set_bit(current, iocon::BIT_BANK, mode == AddressMode::Grouped);
        self.bank.commit_one(IOCON, value)?;
        self.bank.set_mode(mode);
        Ok(())
    }

    pub fn address_mode(&self) -> AddressMode {
        self.bank.mode()
    }

    /// Reports and clears the sticky read-failure flag
    pub fn take_read_error(&mut self) -> bool {
        self.bank.take_read_error()
    }

    /// Reports and clears the sticky write-failure flag
    pub fn take_write_error(&mut self) -> bool {
        self.bank.take_write_error()
    }

    pub fn registers(&self) -> RegisterDump {
        self.bank.snapshot()
    }

    pub fn register_bank(&mut self) -> &mut RegisterBank<T> {
        &mut self.bank
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Tears the instance down, freeing its registry slot
    pub fn release(mut self) -> (T, RST, H) {
        if let Err(e) = self.detach_host() {
            warn!("detach during release failed: {}", e);
        }
        let Expander {
            bank,
            reset_line,
            host,
            ..
        } = self;
        (bank.release(), reset_line, host)
    }

    pub(crate) fn detach_host(&mut self) -> Result<(), Error> {
        let mut result = Ok(());
        for pin in self.interrupts.host_pins.iter() {
            if let Err(e) = self.host.detach(*pin) {
                warn!("host pin {} detach failed: {:?}", pin, e);
                result = Err(Error::OperationFailed);
            }
        }
        result
    }

    pub(crate) fn attach_host(&mut self) -> Result<(), Error> {
        let sense = match self.interrupts.output {
            Some(output) => output.sense(),
            None => return Err(Error::NotConfigured),
        };
        let handler = self.slot.handler();
        for pin in self.interrupts.host_pins.iter() {
            if let Err(e) = self.host.attach(*pin, handler, sense) {
                warn!("host pin {} attach failed: {:?}", pin, e);
                return Err(Error::OperationFailed);
            }
        }
        Ok(())
    }
}
