use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation};
use log::{debug, trace};

use mcpio_core::constants::registers::*;
use mcpio_core::constants::{iocon, DEFAULT_ADDRESS, REGISTER_COUNT, REGISTER_MAX};
use mcpio_core::utils::{bit_is_set, translate, untranslate};

use super::host::SimHost;

const POWER_ON: [u8; REGISTER_COUNT] = [
    0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

struct SimState {
    regs: [u8; REGISTER_COUNT],
    inputs: [u8; 2],       // Levels driven onto the pins from outside
    reference: [u8; 2],    // Last sampled port levels, for change detection
    pointer: u8,           // Register address pointer, raw device address
    lines: [bool; 2],      // Electrical level of INTA/INTB
    wiring: [Option<u8>; 2], // Host pins INTA/INTB are connected to
    host: Option<SimHost>,
}

impl SimState {
    fn power_on() -> Self {
        let mut state = SimState {
            regs: POWER_ON,
            inputs: [0xFF, 0xFF],
            reference: [0xFF, 0xFF],
            pointer: 0,
            lines: [true, true],
            wiring: [None, None],
            host: None,
        };
        state.reference = [state.gpio(0), state.gpio(1)];
        state
    }

    fn grouped(&self) -> bool {
        bit_is_set(self.regs[IOCON as usize], iocon::BIT_BANK)
    }

    // Canonical offset addressed by the pointer, None past the register file
    fn offset(&self) -> Option<usize> {
        let offset = if self.grouped() {
            if (self.pointer & 0x0F) > 0x0A || self.pointer > 0x1A {
                return None;
            }
            untranslate(self.pointer)
        } else {
            self.pointer
        };
        (offset <= REGISTER_MAX).then(|| offset as usize)
    }

    fn advance(&mut self) {
        self.pointer = self.pointer.wrapping_add(1);
        let wrapped = if self.grouped() {
            // Sequential access stays inside the port's block
            match self.pointer {
                0x0B => Some(0x00),
                0x1B => Some(0x10),
                _ => None,
            }
        } else if self.pointer > REGISTER_MAX {
            Some(0x00)
        } else {
            None
        };
        if let Some(p) = wrapped {
            self.pointer = p;
        }
    }

    fn gpio(&self, port: usize) -> u8 {
        let iodir = self.regs[IODIRA as usize + port];
        let olat = self.regs[OLATA as usize + port];
        let ipol = self.regs[IPOLA as usize + port];
        (olat & !iodir) | ((self.inputs[port] ^ ipol) & iodir)
    }

    fn read(&mut self, offset: usize) -> u8 {
        match offset as u8 {
            GPIOA | GPIOB | INTCAPA | INTCAPB => {
                let port = offset & 0x1;
                let value = if offset as u8 >= GPIOA {
                    self.gpio(port)
                } else {
                    self.regs[offset]
                };
                // Reading the port or its capture clears the latched condition
                self.regs[INTFA as usize + port] = 0;
                value
            }
            _ => self.regs[offset],
        }
    }

    fn write(&mut self, offset: usize, value: u8) {
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

    /// Latches pending conditions, then returns INT line changes as
    /// `(host pin, level)` pairs
    fn evaluate(&mut self) -> Vec<(u8, bool)> {
        for port in 0..2 {
            let level = self.gpio(port);
            let enable = self.regs[GPINTENA as usize + port];
            let control = self.regs[INTCONA as usize + port];
            let compare = self.regs[DEFVALA as usize + port];
            let firing = enable
                & ((control & (level ^ compare)) | (!control & (level ^ self.reference[port])));
            let flags = self.regs[INTFA as usize + port];
            if firing & !flags != 0 {
                // Capture only records the first cause
                if flags == 0 {
                    self.regs[INTCAPA as usize + port] = level;
                }
                self.regs[INTFA as usize + port] = flags | firing;
                trace!("port {} latched {:08b}", port, firing);
            }
            self.reference[port] = level;
        }

        let iocon = self.regs[IOCON as usize];
        let mut asserted = [self.regs[INTFA as usize] != 0, self.regs[INTFB as usize] != 0];
        if bit_is_set(iocon, iocon::BIT_MIRROR) {
            let any = asserted[0] || asserted[1];
            asserted = [any, any];
        }
        let active_high =
            !bit_is_set(iocon, iocon::BIT_ODR) && bit_is_set(iocon, iocon::BIT_INTPOL);

        let mut changes = Vec::new();
        for (line, on) in asserted.iter().enumerate() {
            let level = *on == active_high;
            if level != self.lines[line] {
                self.lines[line] = level;
                if let Some(pin) = self.wiring[line] {
                    changes.push((pin, level));
                }
            }
        }
        changes
    }
}

/// A simulated MCP23017 on an I2C bus.
///
/// Models both register layouts, sequential addressing, input polarity,
/// change and compare interrupts with INTF/INTCAP latching, and the
/// INTA/INTB output shape. Clones share the same chip, so one handle can be
/// given to the driver while another drives pins from a test or a
/// stimulus thread.
#[derive(Clone)]
pub struct SimExpander {
    state: Arc<Mutex<SimState>>,
    address: u8,
}

impl Default for SimExpander {
    fn default() -> Self {
        SimExpander::new(DEFAULT_ADDRESS)
    }
}

impl SimExpander {
    pub fn new(address: u8) -> Self {
        SimExpander {
            state: Arc::new(Mutex::new(SimState::power_on())),
            address,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Runs `f` against the chip and forwards INT line edges to the host
    // once the chip lock is released
    fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let (result, changes, host) = {
            let mut state = self.lock();
            let result = f(&mut state);
            let changes = state.evaluate();
            (result, changes, state.host.clone())
        };
        if let Some(host) = host {
            for (pin, level) in changes {
                host.line_changed(pin, level);
            }
        }
        result
    }

    /// Connects INTA/INTB to host pins
    pub fn wire(&self, int_a: Option<u8>, int_b: Option<u8>, host: SimHost) {
        let mut state = self.lock();
        state.wiring = [int_a, int_b];
        state.host = Some(host);
        for (line, pin) in state.wiring.iter().enumerate() {
            if let (Some(pin), Some(host)) = (pin, state.host.as_ref()) {
                host.line_changed(*pin, state.lines[line]);
            }
        }
    }

    /// Drives an expander pin from outside the chip
    pub fn drive(&self, pin: u8, level: bool) {
        self.with_state(|state| {
            let port = (pin >> 3) as usize & 0x1;
            let mask = 1 << (pin & 0x7);
            if level {
                state.inputs[port] |= mask;
            } else {
                state.inputs[port] &= !mask;
            }
        });
    }

    /// Level of a pin as seen on the GPIO register
    pub fn level(&self, pin: u8) -> bool {
        let state = self.lock();
        bit_is_set(state.gpio((pin >> 3) as usize & 0x1), pin & 0x7)
    }

    /// Register contents by canonical offset, without read side effects
    pub fn register(&self, offset: u8) -> u8 {
        let state = self.lock();
        match offset {
            GPIOA | GPIOB => state.gpio((offset - GPIOA) as usize),
            _ => state.regs.get(offset as usize).copied().unwrap_or(0),
        }
    }

    /// Electrical level of INTA (0) or INTB (1)
    pub fn int_line(&self, line: usize) -> bool {
        self.lock().lines.get(line).copied().unwrap_or(true)
    }

    /// Power-on reset, as done by the RESET pin
    pub fn power_on_reset(&self) {
        self.with_state(|state| {
            let inputs = state.inputs;
            let wiring = state.wiring;
            let host = state.host.take();
            let lines = state.lines;
            *state = SimState::power_on();
            state.inputs = inputs;
            state.reference = [state.gpio(0), state.gpio(1)];
            state.wiring = wiring;
            state.host = host;
            state.lines = lines;
        });
        debug!("sim 0x{:02x} reset", self.address);
    }

    /// Device address of a canonical offset in the current layout
    pub fn device_address(&self, offset: u8) -> u8 {
        if self.lock().grouped() {
            translate(offset)
        } else {
            offset
        }
    }
}

impl i2c::ErrorType for SimExpander {
    type Error = ErrorKind;
}

impl I2c for SimExpander {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        self.with_state(|state| -> Result<(), ErrorKind> {
            let mut pointer_set = false;
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => {
                        let mut bytes = bytes.iter();
                        if !pointer_set {
                            match bytes.next() {
                                Some(pointer) => {
                                    state.pointer = *pointer;
                                    pointer_set = true;
                                }
                                None => continue, // Address-only probe
                            }
                        }
                        for value in bytes {
                            let offset = state
                                .offset()
                                .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data))?;
                            state.write(offset, *value);
                            state.advance();
                        }
                    }
                    Operation::Read(buf) => {
                        for slot in buf.iter_mut() {
                            *slot = match state.offset() {
                                Some(offset) => state.read(offset),
                                None => 0,
                            };
                            state.advance();
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

/// Reset line wired to a `SimExpander`; driving it low resets the chip
pub struct SimResetLine {
    chip: SimExpander,
}

impl SimResetLine {
    pub fn new(chip: SimExpander) -> Self {
        SimResetLine { chip }
    }
}

impl digital::ErrorType for SimResetLine {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimResetLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.chip.power_on_reset();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// `DelayNs` backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}

#[cfg(test)]
mod sim_tests {
    use super::*;

    const ADDR: u8 = 0x20;

    fn write(sim: &mut SimExpander, reg: u8, value: u8) {
        sim.write(ADDR, &[reg, value]).unwrap();
    }

    fn read(sim: &mut SimExpander, reg: u8) -> u8 {
        let mut buf = [0u8; 1];
        sim.write_read(ADDR, &[reg], &mut buf).unwrap();
        buf[0]
    }

    #[test]
    fn wrong_address_is_not_acknowledged() {
        let mut sim = SimExpander::new(ADDR);
        assert_eq!(
            sim.write(0x21, &[]),
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        );
        assert!(sim.write(ADDR, &[]).is_ok());
    }

    #[test]
    fn outputs_follow_latch() {
        let mut sim = SimExpander::new(ADDR);
        write(&mut sim, IODIRA, 0x00);
        write(&mut sim, OLATA, 0b1010_0000);
        assert_eq!(read(&mut sim, GPIOA), 0b1010_0000);
        assert!(sim.level(7));
        assert!(!sim.level(6));
    }

    #[test]
    fn sequential_read_in_both_layouts() {
        let mut sim = SimExpander::new(ADDR);
        write(&mut sim, GPPUA, 0x11);
        write(&mut sim, GPPUB, 0x22);
        let mut buf = [0u8; 2];
        sim.write_read(ADDR, &[GPPUA], &mut buf).unwrap();
        assert_eq!(buf, [0x11, 0x22]);

        write(&mut sim, IOCON, 0x80);
        assert_eq!(read(&mut sim, translate(GPPUB)), 0x22);
        let mut block = [0u8; 11];
        sim.write_read(ADDR, &[0x10], &mut block).unwrap();
        assert_eq!(block[0], 0xFF); // IODIRB
        assert_eq!(block[6], 0x22); // GPPUB
    }

    #[test]
    fn compare_interrupt_latches_capture() {
        let mut sim = SimExpander::new(ADDR);
        write(&mut sim, INTCONA, 0b0000_0100);
        write(&mut sim, DEFVALA, 0b0000_0100);
        write(&mut sim, GPINTENA, 0b0000_0100);
        assert!(sim.int_line(0));

        sim.drive(2, false);
        assert!(!sim.int_line(0));
        assert_eq!(read(&mut sim, INTFA), 0b0000_0100);
        assert_eq!(read(&mut sim, INTCAPA) & 0b0000_0100, 0);

        // Condition still present: re-latched straight away
        assert_eq!(read(&mut sim, INTFA), 0b0000_0100);
        sim.drive(2, true);
        read(&mut sim, GPIOA);
        assert_eq!(read(&mut sim, INTFA), 0);
        assert!(sim.int_line(0));
    }

    #[test]
    fn change_interrupt_and_mirror() {
        let mut sim = SimExpander::new(ADDR);
        write(&mut sim, IOCON, 0b0100_0010); // MIRROR, active-high
        write(&mut sim, GPINTENB, 0b0000_0001);
        assert!(!sim.int_line(0));

        sim.drive(8, false);
        assert!(sim.int_line(0));
        assert!(sim.int_line(1));
        read(&mut sim, INTCAPB);
        assert!(!sim.int_line(0));
    }

    #[test]
    fn reset_line_restores_power_on_state() {
        let mut sim = SimExpander::new(ADDR);
        write(&mut sim, IODIRB, 0x00);
        let mut line = SimResetLine::new(sim.clone());
        line.set_low().unwrap();
        line.set_high().unwrap();
        assert_eq!(sim.register(IODIRB), 0xFF);
    }
}
