use crate::constants::{registers, PIN_COUNT, PORT_COUNT};
use crate::error::Error;

// Port index of a pin: 0 for pins 0-7, 1 for pins 8-15
pub fn port_of(pin: u8) -> u8 {
    pin >> 3
}

// Bit position of a pin inside its port byte
pub fn bit_of(pin: u8) -> u8 {
    pin & 0x7
}

// Single-bit mask of a pin inside its port byte
pub fn mask_of(pin: u8) -> u8 {
    1 << bit_of(pin)
}

// Register holding a pin, given the port-A register of a pair
pub fn pin_register(base: u8, pin: u8) -> u8 {
    base + port_of(pin)
}

// Set or clear one bit, leaving the others untouched
pub fn set_bit(byte: u8, bit: u8, value: bool) -> u8 {
    if value {
        byte | (1 << bit)
    } else {
        byte & !(1 << bit)
    }
}

pub fn bit_is_set(byte: u8, bit: u8) -> bool {
    (byte >> bit) & 0x1 == 0x1
}

/// Canonical offset to grouped-layout device address.
///
/// Port A registers (even offsets) land in the block at 0x00, port B
/// registers (odd offsets) in the block at 0x10. `untranslate` is the exact
/// inverse over 0..=0x15.
pub fn translate(offset: u8) -> u8 {
    if offset & 0x1 == 0 {
        registers::GROUPED_PORT_A_BASE + (offset >> 1)
    } else {
        registers::GROUPED_PORT_B_BASE + (offset >> 1)
    }
}

/// Grouped-layout device address back to the canonical offset
pub fn untranslate(addr: u8) -> u8 {
    if addr >= registers::GROUPED_PORT_B_BASE {
        ((addr - registers::GROUPED_PORT_B_BASE) << 1) | 0x1
    } else {
        addr << 1
    }
}

// Lowest pin whose flag bit is set, scanning port A before port B
pub fn first_set_pin(flags: [u8; 2]) -> Option<u8> {
    for (port, byte) in flags.iter().enumerate() {
        for bit in 0..8 {
            if bit_is_set(*byte, bit) {
                return Some(port as u8 * 8 + bit);
            }
        }
    }
    None
}

// Number of flag bits set beyond the first one
pub fn extra_flags(flags: [u8; 2]) -> u32 {
    (flags[0].count_ones() + flags[1].count_ones()).saturating_sub(1)
}

pub fn check_pin(pin: u8) -> Result<u8, Error> {
    if pin < PIN_COUNT {
        Ok(pin)
    } else {
        Err(Error::OutOfRange)
    }
}

pub fn check_port(port: u8) -> Result<u8, Error> {
    if port < PORT_COUNT {
        Ok(port)
    } else {
        Err(Error::OutOfRange)
    }
}
