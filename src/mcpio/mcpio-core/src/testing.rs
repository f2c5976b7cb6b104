//! Scripted stand-ins for the bus, reset line and host vectors

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorKind as PinErrorKind, ErrorType, OutputPin};
use embedded_hal::i2c::ErrorKind;

use crate::constants::registers::*;
use crate::constants::{iocon, REGISTER_COUNT};
use crate::host::{HostVector, Sense};
use crate::transport::{RegisterTransport, TransportError};
use crate::utils::{bit_is_set, untranslate};

static LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that claim callback registry slots
pub fn lock() -> MutexGuard<'static, ()> {
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Probe,
    Read(u8, usize),  // Raw device address, length
    Write(u8, usize), // Raw device address, length
}

#[derive(Default)]
struct DeviceState {
    regs: [u8; REGISTER_COUNT],
    inputs: [u8; 2],
    gpio_script: [VecDeque<u8>; 2],
    fail_reads: Vec<u8>,
    fail_writes: Vec<u8>,
    fail_probe: bool,
    ops: Vec<Op>,
}

impl DeviceState {
    fn grouped(&self) -> bool {
        bit_is_set(self.regs[IOCON as usize], iocon::BIT_BANK)
    }

    fn offset_of(&self, addr: u8) -> usize {
        if self.grouped() {
            untranslate(addr) as usize
        } else {
            addr as usize
        }
    }

    fn gpio(&self, port: usize) -> u8 {
        let iodir = self.regs[IODIRA as usize + port];
        let olat = self.regs[OLATA as usize + port];
        let ipol = self.regs[IPOLA as usize + port];
        (olat & !iodir) | ((self.inputs[port] ^ ipol) & iodir)
    }

    fn value(&self, offset: usize) -> u8 {
        match offset as u8 {
            GPIOA | GPIOB => self.gpio(offset - GPIOA as usize),
            _ => self.regs[offset],
        }
    }

    fn store(&mut self, offset: usize, value: u8) {
        match offset as u8 {
            IOCON | IOCON_ALIAS => {
                self.regs[IOCON as usize] = value;
                self.regs[IOCON_ALIAS as usize] = value;
            }
            GPIOA | GPIOB => self.regs[offset + 2] = value,
            INTFA | INTFB | INTCAPA | INTCAPB => {}
            _ => self.regs[offset] = value,
        }
    }
}

/// Register-level model of an MCP23017 with fault injection and an
/// operation log. Clones share the same device.
#[derive(Clone, Default)]
pub struct FakeDevice(Rc<RefCell<DeviceState>>);

impl FakeDevice {
    pub fn new() -> Self {
        let device = FakeDevice::default();
        device.0.borrow_mut().regs[IODIRA as usize] = 0xFF;
        device.0.borrow_mut().regs[IODIRB as usize] = 0xFF;
        device
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport(self.clone())
    }

    /// Sets a register by canonical offset; GPIO sets the driven input levels
    pub fn poke(&self, offset: u8, value: u8) {
        let mut state = self.0.borrow_mut();
        match offset {
            GPIOA | GPIOB => state.inputs[(offset - GPIOA) as usize] = value,
            IOCON | IOCON_ALIAS => state.store(offset as usize, value),
            _ => state.regs[offset as usize] = value,
        }
    }

    pub fn peek(&self, offset: u8) -> u8 {
        self.0.borrow().value(offset as usize)
    }

    /// Drives an input pin from outside
    pub fn drive(&self, pin: u8, level: bool) {
        let mut state = self.0.borrow_mut();
        let port = (pin >> 3) as usize;
        let mask = 1 << (pin & 0x7);
        if level {
            state.inputs[port] |= mask;
        } else {
            state.inputs[port] &= !mask;
        }
    }

    /// Queues GPIO values returned by the next reads of a port
    pub fn script_gpio(&self, port: usize, values: &[u8]) {
        self.0.borrow_mut().gpio_script[port].extend(values.iter().copied());
    }

    pub fn set_grouped(&self, grouped: bool) {
        let mut state = self.0.borrow_mut();
        let value = if grouped {
            state.regs[IOCON as usize] | 0x80
        } else {
            state.regs[IOCON as usize] & !0x80
        };
        state.store(IOCON as usize, value);
    }

    pub fn is_grouped(&self) -> bool {
        self.0.borrow().grouped()
    }

    pub fn fail_read_at(&self, offset: u8) {
        self.0.borrow_mut().fail_reads.push(offset);
    }

    pub fn fail_write_at(&self, offset: u8) {
        self.0.borrow_mut().fail_writes.push(offset);
    }

    pub fn fail_probe(&self) {
        self.0.borrow_mut().fail_probe = true;
    }

    pub fn clear_failures(&self) {
        let mut state = self.0.borrow_mut();
        state.fail_reads.clear();
        state.fail_writes.clear();
        state.fail_probe = false;
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.0.borrow_mut().ops.clear();
    }
}

pub struct FakeTransport(FakeDevice);

const NACK: TransportError = TransportError::Bus(ErrorKind::Other);

impl RegisterTransport for FakeTransport {
    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut state = (self.0).0.borrow_mut();
        state.ops.push(Op::Read(addr, buf.len()));
        let offsets: Vec<usize> = (0..buf.len())
            .map(|i| state.offset_of(addr + i as u8))
            .collect();
        if offsets
            .iter()
            .any(|o| state.fail_reads.contains(&(*o as u8)))
        {
            return Err(NACK);
        }
        for (slot, offset) in buf.iter_mut().zip(offsets) {
            *slot = match offset as u8 {
                GPIOA | GPIOB => {
                    let port = offset - GPIOA as usize;
                    let scripted = state.gpio_script[port].pop_front();
                    scripted.unwrap_or_else(|| state.gpio(port))
                }
                _ => state.value(offset),
            };
        }
        Ok(())
    }

    fn write_bytes(&mut self, addr: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = (self.0).0.borrow_mut();
        state.ops.push(Op::Write(addr, bytes.len()));
        let offsets: Vec<usize> = (0..bytes.len())
            .map(|i| state.offset_of(addr + i as u8))
            .collect();
        if offsets
            .iter()
            .any(|o| state.fail_writes.contains(&(*o as u8)))
        {
            return Err(NACK);
        }
        for (value, offset) in bytes.iter().zip(offsets) {
            state.store(offset, *value);
        }
        Ok(())
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        let mut state = (self.0).0.borrow_mut();
        state.ops.push(Op::Probe);
        if state.fail_probe {
            Err(NACK)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Attach(u8, Sense),
    Detach(u8),
}

#[derive(Default)]
struct HostState {
    vectors: Vec<(u8, fn(), Sense)>,
    log: Vec<HostEvent>,
    fail_attach: bool,
}

/// Host vector table; `fire` plays the role of the pin-change hardware
#[derive(Clone, Default)]
pub struct FakeHost(Rc<RefCell<HostState>>);

#[derive(Debug)]
pub struct Refused;

impl FakeHost {
    pub fn new() -> Self {
        FakeHost::default()
    }

    pub fn fail_attach(&self, fail: bool) {
        self.0.borrow_mut().fail_attach = fail;
    }

    pub fn attached(&self, pin: u8) -> Option<Sense> {
        self.0
            .borrow()
            .vectors
            .iter()
            .find(|(p, _, _)| *p == pin)
            .map(|(_, _, sense)| *sense)
    }

    pub fn fire(&self, pin: u8) {
        let handler = self
            .0
            .borrow()
            .vectors
            .iter()
            .find(|(p, _, _)| *p == pin)
            .map(|(_, handler, _)| *handler);
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn log(&self) -> Vec<HostEvent> {
        self.0.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.0.borrow_mut().log.clear();
    }
}

impl HostVector for FakeHost {
    type Error = Refused;

    fn attach(&mut self, host_pin: u8, handler: fn(), sense: Sense) -> Result<(), Refused> {
        let mut state = self.0.borrow_mut();
        if state.fail_attach {
            return Err(Refused);
        }
        state.vectors.retain(|(p, _, _)| *p != host_pin);
        state.vectors.push((host_pin, handler, sense));
        state.log.push(HostEvent::Attach(host_pin, sense));
        Ok(())
    }

    fn detach(&mut self, host_pin: u8) -> Result<(), Refused> {
        let mut state = self.0.borrow_mut();
        state.vectors.retain(|(p, _, _)| *p != host_pin);
        state.log.push(HostEvent::Detach(host_pin));
        Ok(())
    }
}

#[derive(Default)]
struct LineState {
    history: Vec<bool>,
    fail: bool,
}

/// Reset line that records every level it is driven to
#[derive(Clone, Default)]
pub struct FakePin(Rc<RefCell<LineState>>);

impl FakePin {
    pub fn new() -> Self {
        FakePin::default()
    }

    pub fn fail(&self) {
        self.0.borrow_mut().fail = true;
    }

    pub fn history(&self) -> Vec<bool> {
        self.0.borrow().history.clone()
    }

    fn drive(&mut self, level: bool) -> Result<(), PinErrorKind> {
        let mut state = self.0.borrow_mut();
        if state.fail {
            return Err(PinErrorKind::Other);
        }
        state.history.push(level);
        Ok(())
    }
}

impl ErrorType for FakePin {
    type Error = PinErrorKind;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
