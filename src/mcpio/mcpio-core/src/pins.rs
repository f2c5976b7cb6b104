use embedded_hal::digital::{OutputPin, PinState};

use crate::constants::registers::*;
use crate::device::Expander;
use crate::error::Error;
use crate::host::HostVector;
use crate::transport::RegisterTransport;
use crate::utils::{bit_is_set, bit_of, check_pin, check_port, pin_register, port_of, set_bit};

/// Direction and pull-up configuration of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    Input,
    Output,
    InputPullUp,
}

fn level_of(byte: u8, pin: u8) -> PinState {
    PinState::from(bit_is_set(byte, bit_of(pin)))
}

fn fill(level: bool) -> u8 {
    if level {
        0xFF
    } else {
        0x00
    }
}

/// Pin and port level configuration and digital I/O.
///
/// Pins 0-7 are GPA0-7, pins 8-15 GPB0-7. Every call that changes part of
/// a register first reads it back from the device, then commits the new
/// value; the mirror only follows acknowledged writes.
pub trait PinControl {
    fn set_pin_direction(&mut self, pin: u8, mode: PinMode) -> Result<(), Error>;
    fn set_port_direction(&mut self, port: u8, mode: PinMode) -> Result<(), Error>;
    fn read_pin_direction(&mut self, pin: u8) -> Result<PinMode, Error>;
    /// Fresh read of a pin's bit in any register pair, given its port A register
    fn read_pin_bit(&mut self, pin: u8, base: u8) -> Result<bool, Error>;
    fn set_pin_polarity(&mut self, pin: u8, invert: bool) -> Result<(), Error>;
    fn set_port_polarity(&mut self, port: u8, invert: bool) -> Result<(), Error>;
    fn digital_write(&mut self, pin: u8, level: PinState) -> Result<(), Error>;
    fn digital_read(&mut self, pin: u8) -> Result<PinState, Error>;
    fn toggle_pin(&mut self, pin: u8) -> Result<(), Error>;
    fn toggle_port(&mut self, port: u8) -> Result<(), Error>;
    fn port_write(&mut self, port: u8, level: PinState) -> Result<(), Error>;
    fn port_read(&mut self, port: u8) -> Result<u8, Error>;
}

impl<T, RST, H> PinControl for Expander<T, RST, H>
where
    T: RegisterTransport,
    RST: OutputPin,
    H: HostVector,
{
    fn set_pin_direction(&mut self, pin: u8, mode: PinMode) -> Result<(), Error> {
        check_pin(pin)?;
        let port = port_of(pin) as usize;
        let iodir = self.bank.sync_pair(IODIRA)?;
        let gppu = self.bank.sync_pair(GPPUA)?;

        let direction = set_bit(iodir[port], bit_of(pin), mode != PinMode::Output);
        self.bank.commit_one(pin_register(IODIRA, pin), direction)?;
        if mode != PinMode::Output {
            let pull_up = set_bit(gppu[port], bit_of(pin), mode == PinMode::InputPullUp);
            self.bank.commit_one(pin_register(GPPUA, pin), pull_up)?;
        }
        Ok(())
    }

    fn set_port_direction(&mut self, port: u8, mode: PinMode) -> Result<(), Error> {
        check_port(port)?;
        self.bank
            .commit_one(IODIRA + port, fill(mode != PinMode::Output))?;
        if mode != PinMode::Output {
            self.bank
                .commit_one(GPPUA + port, fill(mode == PinMode::InputPullUp))?;
        }
        Ok(())
    }

    fn read_pin_direction(&mut self, pin: u8) -> Result<PinMode, Error> {
        if !self.read_pin_bit(pin, IODIRA)? {
            return Ok(PinMode::Output);
        }
        if self.read_pin_bit(pin, GPPUA)? {
            Ok(PinMode::InputPullUp)
        } else {
            Ok(PinMode::Input)
        }
    }

    fn read_pin_bit(&mut self, pin: u8, base: u8) -> Result<bool, Error> {
        check_pin(pin)?;
        if base & 0x1 != 0 || base > OLATA {
            return Err(Error::OutOfRange);
        }
        let value = self.bank.sync_one(pin_register(base, pin))?;
        Ok(bit_is_set(value, bit_of(pin)))
    }

    fn set_pin_polarity(&mut self, pin: u8, invert: bool) -> Result<(), Error> {
        check_pin(pin)?;
        let reg = pin_register(IPOLA, pin);
        let ipol = self.bank.sync_one(reg)?;
        self.bank.commit_one(reg, set_bit(ipol, bit_of(pin), invert))
    }

    fn set_port_polarity(&mut self, port: u8, invert: bool) -> Result<(), Error> {
        check_port(port)?;
        self.bank.commit_one(IPOLA + port, fill(invert))
    }

    fn digital_write(&mut self, pin: u8, level: PinState) -> Result<(), Error> {
        check_pin(pin)?;
        let reg = pin_register(OLATA, pin);
        let latch = self.bank.sync_one(reg)?;
        self.bank
            .commit_one(reg, set_bit(latch, bit_of(pin), level == PinState::High))
    }

    fn digital_read(&mut self, pin: u8) -> Result<PinState, Error> {
        check_pin(pin)?;
        let value = self.bank.sync_one(pin_register(GPIOA, pin))?;
        Ok(level_of(value, pin))
    }

    fn toggle_pin(&mut self, pin: u8) -> Result<(), Error> {
        check_pin(pin)?;
        let reg = pin_register(OLATA, pin);
        let latch = self.bank.sync_one(reg)?;
        self.bank.commit_one(reg, latch ^ (1 << bit_of(pin)))
    }

    fn toggle_port(&mut self, port: u8) -> Result<(), Error> {
        check_port(port)?;
        let latch = self.bank.sync_one(OLATA + port)?;
        self.bank.commit_one(OLATA + port, !latch)
    }

    fn port_write(&mut self, port: u8, level: PinState) -> Result<(), Error> {
        check_port(port)?;
        self.bank
            .commit_one(OLATA + port, fill(level == PinState::High))
    }

    fn port_read(&mut self, port: u8) -> Result<u8, Error> {
        check_port(port)?;
        self.bank.sync_one(GPIOA + port)
    }
}
