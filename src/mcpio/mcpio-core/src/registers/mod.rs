mod dump;

pub use dump::RegisterDump;

use crate::constants::registers::*;
use crate::constants::{REGISTER_COUNT, REGISTER_MAX};
use crate::error::Error;
use crate::transport::{ErrorLatch, RegisterTransport};
use crate::utils;
use log::{debug, error};

/// Register layout selected by IOCON.BANK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressMode {
    Paired,  // BANK = 0, A/B registers interleaved
    Grouped, // BANK = 1, all port A registers then all port B registers
}

impl AddressMode {
    /// Device address of a canonical offset in this layout
    pub fn device_address(self, offset: u8) -> u8 {
        match self {
            AddressMode::Paired => offset,
            AddressMode::Grouped => utils::translate(offset),
        }
    }
}

// Power-on state: every pin an input, everything else cleared
const RESET_VALUES: [u8; REGISTER_COUNT] = [
    0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

const ALL_SYNCED: u32 = (1 << REGISTER_COUNT) - 1;

pub fn is_read_only(offset: u8) -> bool {
    matches!(offset, INTFA | INTFB | INTCAPA | INTCAPB)
}

fn check_offset(offset: u8) -> Result<usize, Error> {
    if offset <= REGISTER_MAX {
        Ok(offset as usize)
    } else {
        Err(Error::OutOfRange)
    }
}

/// Shadow copy of the 22 expander registers, addressed by canonical offset.
///
/// A slot is trusted only once a transfer of that exact slot succeeded; the
/// `synced` bitmask tracks which ones are. Every bus path applies the layout
/// translation of the current `AddressMode` and raises the error latch on
/// failure, leaving the mirror untouched.
pub struct RegisterBank<T> {
    transport: T,
    mirror: [u8; REGISTER_COUNT],
    synced: u32,         // One bit per canonical offset
    mode: AddressMode,   // Layout the device is currently in
    latch: ErrorLatch,   // Sticky read/write failure flags
}

impl<T: RegisterTransport> RegisterBank<T> {
    pub fn new(transport: T) -> Self {
        RegisterBank {
            transport,
            mirror: RESET_VALUES,
            synced: 0,
            mode: AddressMode::Paired,
            latch: ErrorLatch::new(),
        }
    }

    /// Power-on defaults, nothing synchronized, paired layout
    pub fn reset_mirror(&mut self) {
        self.mirror = RESET_VALUES;
        self.synced = 0;
        self.mode = AddressMode::Paired;
    }

    pub fn mode(&self) -> AddressMode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: AddressMode) {
        self.mode = mode;
    }

    pub fn get(&self, offset: u8) -> Result<u8, Error> {
        Ok(self.mirror[check_offset(offset)?])
    }

    pub fn is_synced(&self, offset: u8) -> bool {
        offset <= REGISTER_MAX && self.synced & (1 << offset) != 0
    }

    pub fn take_read_error(&mut self) -> bool {
        self.latch.take_read()
    }

    pub fn take_write_error(&mut self) -> bool {
        self.latch.take_write()
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn release(self) -> T {
        self.transport
    }

    pub fn snapshot(&self) -> RegisterDump {
        RegisterDump::new(self.mirror, self.synced, self.mode)
    }

    /// Empty addressed write; latches a write error if nobody answers
    pub fn probe(&mut self) -> Result<(), Error> {
        self.transport.probe().map_err(|e| {
            self.latch.raise_write();
            error!("probe not acknowledged: {:?}", e);
            Error::WriteFailure
        })
    }

    fn read_device(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), Error> {
        match self.transport.read_bytes(addr, buf) {
            Ok(()) => {
                debug!("read  0x{:02x} <- {:02x?}", addr, buf);
                Ok(())
            }
            Err(e) => {
                self.latch.raise_read();
                error!("read of 0x{:02x} failed: {:?}", addr, e);
                Err(Error::ReadFailure)
            }
        }
    }

    fn write_device(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Error> {
        match self.transport.write_bytes(addr, bytes) {
            Ok(()) => {
                debug!("write 0x{:02x} -> {:02x?}", addr, bytes);
                Ok(())
            }
            Err(e) => {
                self.latch.raise_write();
                error!("write of 0x{:02x} failed: {:?}", addr, e);
                Err(Error::WriteFailure)
            }
        }
    }

    fn store(&mut self, offset: u8, value: u8) {
        self.mirror[offset as usize] = value;
        self.synced |= 1 << offset;
        // IOCON is one physical register visible at two offsets
        if offset == IOCON || offset == IOCON_ALIAS {
            self.mirror[IOCON as usize] = value;
            self.mirror[IOCON_ALIAS as usize] = value;
            self.synced |= (1 << IOCON) | (1 << IOCON_ALIAS);
        }
    }

    /// Read-through of a single register
    pub fn sync_one(&mut self, offset: u8) -> Result<u8, Error> {
        check_offset(offset)?;
        let mut buf = [0u8; 1];
        self.read_device(self.mode.device_address(offset), &mut buf)?;
        self.store(offset, buf[0]);
        Ok(buf[0])
    }

    /// Read-through of both ports of a register pair; `offset` may name
    /// either member of the pair. Returns `[port A, port B]`.
    pub fn sync_pair(&mut self, offset: u8) -> Result<[u8; 2], Error> {
        check_offset(offset)?;
        let base = offset & !0x1;
        match self.mode {
            AddressMode::Paired => {
                let mut buf = [0u8; 2];
                self.read_device(base, &mut buf)?;
                self.store(base, buf[0]);
                self.store(base + 1, buf[1]);
                Ok(buf)
            }
            AddressMode::Grouped => {
                let a = self.sync_one(base)?;
                let b = self.sync_one(base + 1)?;
                Ok([a, b])
            }
        }
    }

    /// Refreshes the whole mirror from the device
    pub fn sync_all(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; REGISTER_COUNT];
        match self.mode {
            AddressMode::Paired => {
                self.read_device(0x00, &mut buf)?;
            }
            AddressMode::Grouped => {
                let mut block = [0u8; GROUPED_BLOCK_LEN];
                self.read_device(GROUPED_PORT_A_BASE, &mut block)?;
                for (i, value) in block.iter().enumerate() {
                    buf[utils::untranslate(GROUPED_PORT_A_BASE + i as u8) as usize] = *value;
                }
                self.read_device(GROUPED_PORT_B_BASE, &mut block)?;
                for (i, value) in block.iter().enumerate() {
                    buf[utils::untranslate(GROUPED_PORT_B_BASE + i as u8) as usize] = *value;
                }
            }
        }
        self.mirror = buf;
        self.synced = ALL_SYNCED;
        Ok(())
    }

    /// Write-through of a single register; the mirror only changes once the
    /// device acknowledged
    pub fn commit_one(&mut self, offset: u8, value: u8) -> Result<(), Error> {
        check_offset(offset)?;
        if is_read_only(offset) {
            return Err(Error::OutOfRange);
        }
        self.write_device(self.mode.device_address(offset), &[value])?;
        self.store(offset, value);
        // Writing GPIO lands in the output latch
        if offset == GPIOA || offset == GPIOB {
            self.store(offset + 2, value);
        }
        Ok(())
    }

    /// Writes the whole mirror back in one pass. GPIO slots carry the latch
    /// values and the read-only registers are ignored by the device.
    pub fn commit_all(&mut self) -> Result<(), Error> {
        let mut frame = self.mirror;
        frame[GPIOA as usize] = self.mirror[OLATA as usize];
        frame[GPIOB as usize] = self.mirror[OLATB as usize];

        match self.mode {
            AddressMode::Paired => {
                self.write_device(0x00, &frame)?;
            }
            AddressMode::Grouped => {
                let mut block = [0u8; GROUPED_BLOCK_LEN];
                for (i, slot) in block.iter_mut().enumerate() {
                    *slot = frame[utils::untranslate(GROUPED_PORT_A_BASE + i as u8) as usize];
                }
                self.write_device(GROUPED_PORT_A_BASE, &block)?;
                for (i, slot) in block.iter_mut().enumerate() {
                    *slot = frame[utils::untranslate(GROUPED_PORT_B_BASE + i as u8) as usize];
                }
                self.write_device(GROUPED_PORT_B_BASE, &block)?;
            }
        }

        self.mirror[GPIOA as usize] = frame[GPIOA as usize];
        self.mirror[GPIOB as usize] = frame[GPIOB as usize];
        for offset in 0..=REGISTER_MAX {
            if !is_read_only(offset) {
                self.synced |= 1 << offset;
            }
        }
        Ok(())
    }
}
