use core::fmt;

use super::AddressMode;
use crate::constants::registers::NAMES;
use crate::constants::REGISTER_COUNT;

/// Point-in-time copy of the register mirror, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDump {
    values: [u8; REGISTER_COUNT],
    synced: u32,
    mode: AddressMode,
}

impl RegisterDump {
    pub(crate) fn new(values: [u8; REGISTER_COUNT], synced: u32, mode: AddressMode) -> Self {
        RegisterDump {
            values,
            synced,
            mode,
        }
    }

    pub fn values(&self) -> &[u8; REGISTER_COUNT] {
        &self.values
    }

    pub fn value(&self, offset: u8) -> Option<u8> {
        self.values.get(offset as usize).copied()
    }

    pub fn is_synced(&self, offset: u8) -> bool {
        (offset as usize) < REGISTER_COUNT && self.synced & (1 << offset) != 0
    }

    pub fn mode(&self) -> AddressMode {
        self.mode
    }
}

impl fmt::Display for RegisterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "layout: {:?}", self.mode)?;
        for (offset, value) in self.values.iter().enumerate() {
            // Slots never read or written are shown but flagged
            let marker = if self.is_synced(offset as u8) { ' ' } else { '?' };
            writeln!(
                f,
                "0x{:02X} {:<8} 0x{:02X} 0b{:08b} {}",
                offset, NAMES[offset], value, value, marker
            )?;
        }
        Ok(())
    }
}
