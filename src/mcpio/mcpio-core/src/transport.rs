use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use heapless::Vec;

use crate::constants::REGISTER_COUNT;

/// Longest frame ever written: register pointer followed by a full bank
const FRAME_LEN: usize = REGISTER_COUNT + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    Bus(ErrorKind), // The bus reported a NACK or arbitration fault
    Overflow,       // Payload does not fit in a single frame
}

/// Addressed byte access to the expander's register file.
///
/// Implementations carry no register semantics: `addr` is the raw device
/// address after any layout translation.
pub trait RegisterTransport {
    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), TransportError>;
    fn write_bytes(&mut self, addr: u8, bytes: &[u8]) -> Result<(), TransportError>;
    /// Addresses the device without a payload; Ok means it acknowledged
    fn probe(&mut self) -> Result<(), TransportError>;
}

/// `RegisterTransport` over an `embedded_hal::i2c::I2c` bus
pub struct I2cTransport<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cTransport<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        I2cTransport { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Hands the bus back to the caller
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> RegisterTransport for I2cTransport<I2C> {
    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        self.i2c
            .write_read(self.address, &[addr], buf)
            .map_err(|e| TransportError::Bus(e.kind()))
    }

    fn write_bytes(&mut self, addr: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let mut frame: Vec<u8, FRAME_LEN> = Vec::new();
        frame.push(addr).map_err(|_| TransportError::Overflow)?;
        frame
            .extend_from_slice(bytes)
            .map_err(|_| TransportError::Overflow)?;
        self.i2c
            .write(self.address, &frame)
            .map_err(|e| TransportError::Bus(e.kind()))
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.i2c
            .write(self.address, &[])
            .map_err(|e| TransportError::Bus(e.kind()))
    }
}

/// Sticky transport failure flags. Set by any failed transfer and cleared
/// only when read through `take_read` / `take_write`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorLatch {
    read: bool,
    write: bool,
}

impl ErrorLatch {
    pub const fn new() -> Self {
        ErrorLatch {
            read: false,
            write: false,
        }
    }

    pub fn raise_read(&mut self) {
        self.read = true;
    }

    pub fn raise_write(&mut self) {
        self.write = true;
    }

    pub fn take_read(&mut self) -> bool {
        core::mem::replace(&mut self.read, false)
    }

    pub fn take_write(&mut self) -> bool {
        core::mem::replace(&mut self.write, false)
    }
}
