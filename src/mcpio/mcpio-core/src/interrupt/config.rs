use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use super::{Binding, OutputType, PinHandler, PollOutcome, SupervisorState, TriggerEncoding, TriggerMode};
use crate::constants::iocon;
use crate::constants::registers::*;
use crate::device::Expander;
use crate::error::Error;
use crate::host::HostVector;
use crate::transport::RegisterTransport;
use crate::utils::{bit_is_set, bit_of, check_pin, pin_register, set_bit};

/// New IOCON value for an output shape, other bits preserved. INTPOL is
/// meaningless in open-drain mode and is cleared there.
pub fn output_bits(current: u8, output: OutputType, mirror: bool) -> u8 {
    let (odr, intpol) = match output {
        OutputType::ActiveLow => (false, false),
        OutputType::ActiveHigh => (false, true),
        OutputType::OpenDrain => (true, false),
    };
    let value = set_bit(current, iocon::BIT_ODR, odr);
    let value = set_bit(value, iocon::BIT_INTPOL, intpol);
    set_bit(value, iocon::BIT_MIRROR, mirror)
}

/// Interrupt output setup, per-pin trigger binding and the cooperative
/// service entry point
pub trait InterruptControl {
    /// Programs IOCON and arms the host vectors wired to INTA/INTB. At least
    /// one host pin is required.
    fn configure_output(
        &mut self,
        pin_a: Option<u8>,
        pin_b: Option<u8>,
        output: OutputType,
        mirror: bool,
    ) -> Result<(), Error>;

    fn bind_trigger(&mut self, pin: u8, handler: PinHandler, mode: TriggerMode) -> Result<(), Error>;
    fn unbind_trigger(&mut self, pin: u8) -> Result<(), Error>;
    /// Trigger mode currently programmed into the device for `pin`
    fn read_trigger(&mut self, pin: u8) -> Result<TriggerMode, Error>;
    fn bound_mode(&self, pin: u8) -> Option<TriggerMode>;
    fn is_configured(&self) -> bool;

    /// Services one pending interrupt or advances revert tracking. Must be
    /// called from the regular program flow, never from interrupt context.
    fn poll_pending_interrupt(&mut self) -> Result<PollOutcome, Error>;
    fn interrupt_pending(&self) -> bool;
    fn supervisor_state(&self) -> SupervisorState;
}

impl<T, RST, H> InterruptControl for Expander<T, RST, H>
where
    T: RegisterTransport,
    RST: OutputPin,
    H: HostVector,
{
    fn configure_output(
        &mut self,
        pin_a: Option<u8>,
        pin_b: Option<u8>,
        output: OutputType,
        mirror: bool,
    ) -> Result<(), Error> {
        if pin_a.is_none() && pin_b.is_none() {
            return Err(Error::PinAssignment);
        }

        let current = self.bank.sync_one(IOCON)?;
        self.bank
            .commit_one(IOCON, output_bits(current, output, mirror))?;

        // Drop vectors armed by an earlier configuration
        if let Err(e) = self.detach_host() {
            warn!("releasing previous host pins failed: {}", e);
        }
        self.interrupts.configured = false;
        self.interrupts.output = Some(output);
        self.interrupts.host_pins.clear();
        for pin in [pin_a, pin_b].into_iter().flatten() {
            if !self.interrupts.host_pins.contains(&pin) {
                // Capacity is two and at most two pins are offered
                let _ = self.interrupts.host_pins.push(pin);
            }
        }

        self.attach_host()?;
        self.interrupts.configured = true;
        debug!(
            "interrupt output {:?} mirror={} on host pins {:?}",
            output, mirror, self.interrupts.host_pins
        );
        Ok(())
    }

    fn bind_trigger(&mut self, pin: u8, handler: PinHandler, mode: TriggerMode) -> Result<(), Error> {
        check_pin(pin)?;
        if mode == TriggerMode::None {
            return Err(Error::OutOfRange);
        }
        if !self.interrupts.configured {
            return Err(Error::NotConfigured);
        }
        let bit = bit_of(pin);
        if !bit_is_set(self.bank.sync_one(pin_register(IODIRA, pin))?, bit) {
            return Err(Error::OperationFailed);
        }

        let enable_reg = pin_register(GPINTENA, pin);
        let control_reg = pin_register(INTCONA, pin);
        let compare_reg = pin_register(DEFVALA, pin);
        let enable = self.bank.sync_one(enable_reg)?;
        let control = self.bank.sync_one(control_reg)?;
        let compare = self.bank.sync_one(compare_reg)?;

        let encoding = mode.encode();
        self.bank
            .commit_one(control_reg, set_bit(control, bit, encoding.control))?;
        if let Some(level) = encoding.default_compare {
            self.bank.commit_one(compare_reg, set_bit(compare, bit, level))?;
        }
        // Enable only once the trigger shape is in place
        self.bank.commit_one(enable_reg, set_bit(enable, bit, true))?;

        self.interrupts.bindings[pin as usize] = Some(Binding { handler, mode });
        debug!("pin {} bound as {:?}", pin, mode);
        Ok(())
    }

    fn unbind_trigger(&mut self, pin: u8) -> Result<(), Error> {
        check_pin(pin)?;
        let enable_reg = pin_register(GPINTENA, pin);
        let enable = self.bank.sync_one(enable_reg)?;
        self.bank
            .commit_one(enable_reg, set_bit(enable, bit_of(pin), false))?;
        self.interrupts.bindings[pin as usize] = None;
        Ok(())
    }

    fn read_trigger(&mut self, pin: u8) -> Result<TriggerMode, Error> {
        check_pin(pin)?;
        let bit = bit_of(pin);
        let enabled = bit_is_set(self.bank.sync_one(pin_register(GPINTENA, pin))?, bit);
        let control = bit_is_set(self.bank.sync_one(pin_register(INTCONA, pin))?, bit);
        let compare = bit_is_set(self.bank.sync_one(pin_register(DEFVALA, pin))?, bit);
        let sustained = self
            .interrupts
            .mode_of(pin)
            .map_or(false, TriggerMode::is_sustained);
        let encoding = TriggerEncoding {
            enabled,
            control,
            default_compare: Some(compare),
        };
        Ok(TriggerMode::decode(encoding, sustained))
    }

    fn bound_mode(&self, pin: u8) -> Option<TriggerMode> {
        self.interrupts.mode_of(pin)
    }

    fn is_configured(&self) -> bool {
        self.interrupts.configured
    }

    fn poll_pending_interrupt(&mut self) -> Result<PollOutcome, Error> {
        self.poll_supervisor()
    }

    fn interrupt_pending(&self) -> bool {
        self.slot.is_pending()
    }

    fn supervisor_state(&self) -> SupervisorState {
        if self.interrupts.serving {
            SupervisorState::Serving
        } else if !self.interrupts.reverted {
            SupervisorState::AwaitingRevert
        } else if self.slot.is_pending() {
            SupervisorState::Pending
        } else {
            SupervisorState::Idle
        }
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use crate::host::Sense;
    use crate::testing::{self, FakeDevice, FakeHost, FakePin, Op};
    use crate::pins::{PinControl, PinMode};

    type TestExpander = Expander<testing::FakeTransport, FakePin, FakeHost>;

    fn expander(device: &FakeDevice, host: FakeHost) -> TestExpander {
        Expander::with_transport(device.transport(), FakePin::new(), 0x20, host).unwrap()
    }

    fn ignore(_pin: u8) {}

    #[test]
    fn output_bit_table() {
        assert_eq!(output_bits(0x00, OutputType::ActiveLow, false), 0b0000_0000);
        assert_eq!(output_bits(0x00, OutputType::ActiveHigh, false), 0b0000_0010);
        assert_eq!(output_bits(0x00, OutputType::OpenDrain, true), 0b0100_0100);
        // Open-drain clears a previously set INTPOL; BANK is untouched
        assert_eq!(output_bits(0b1000_0010, OutputType::OpenDrain, false), 0b1000_0100);
    }

    #[test]
    fn configure_needs_a_host_pin() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        let mut exp = expander(&device, FakeHost::new());
        assert_eq!(
            exp.configure_output(None, None, OutputType::ActiveLow, false),
            Err(Error::PinAssignment)
        );
        assert!(device.ops().is_empty());
    }

    #[test]
    fn configure_programs_iocon_and_attaches() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        let host = FakeHost::new();
        let mut exp = expander(&device, host.clone());

        exp.configure_output(Some(2), Some(3), OutputType::ActiveHigh, true)
            .unwrap();
        assert_eq!(device.peek(IOCON), 0b0100_0010);
        assert!(exp.is_configured());
        assert_eq!(host.attached(2), Some(Sense::RisingEdge));
        assert_eq!(host.attached(3), Some(Sense::RisingEdge));

        // Reconfiguring moves the vectors
        exp.configure_output(Some(7), None, OutputType::OpenDrain, false)
            .unwrap();
        assert_eq!(device.peek(IOCON), 0b0000_0100);
        assert_eq!(host.attached(2), None);
        assert_eq!(host.attached(7), Some(Sense::FallingEdge));
    }

    #[test]
    fn attach_failure_leaves_unconfigured() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        let host = FakeHost::new();
        host.fail_attach(true);
        let mut exp = expander(&device, host);

        assert_eq!(
            exp.configure_output(Some(2), None, OutputType::ActiveLow, false),
            Err(Error::OperationFailed)
        );
        assert!(!exp.is_configured());
        assert_eq!(
            exp.bind_trigger(0, ignore, TriggerMode::Change),
            Err(Error::NotConfigured)
        );
    }

    #[test]
    fn bind_checks_preconditions() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        let mut exp = expander(&device, FakeHost::new());

        assert_eq!(exp.bind_trigger(16, ignore, TriggerMode::Change), Err(Error::OutOfRange));
        assert_eq!(exp.bind_trigger(1, ignore, TriggerMode::Change), Err(Error::NotConfigured));

        exp.configure_output(Some(2), None, OutputType::ActiveLow, false)
            .unwrap();
        assert_eq!(exp.bind_trigger(1, ignore, TriggerMode::None), Err(Error::OutOfRange));
        exp.set_pin_direction(1, PinMode::Output).unwrap();
        assert_eq!(
            exp.bind_trigger(1, ignore, TriggerMode::Change),
            Err(Error::OperationFailed)
        );
    }

    #[test]
    fn bind_writes_enable_last() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        let mut exp = expander(&device, FakeHost::new());
        exp.configure_output(Some(2), None, OutputType::ActiveLow, false)
            .unwrap();
        device.clear_ops();

        exp.bind_trigger(13, ignore, TriggerMode::Falling).unwrap();

        let writes: std::vec::Vec<Op> = device
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Write(..)))
            .collect();
        assert_eq!(
            writes,
            std::vec![Op::Write(INTCONB, 1), Op::Write(DEFVALB, 1), Op::Write(GPINTENB, 1)]
        );
        assert_eq!(device.peek(INTCONB), 0b0010_0000);
        assert_eq!(device.peek(DEFVALB), 0b0010_0000);
        assert_eq!(device.peek(GPINTENB), 0b0010_0000);
        assert_eq!(exp.bound_mode(13), Some(TriggerMode::Falling));
    }

    #[test]
    fn change_mode_leaves_default_compare() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        device.poke(DEFVALA, 0b0000_0001);
        let mut exp = expander(&device, FakeHost::new());
        exp.configure_output(Some(2), None, OutputType::ActiveLow, false)
            .unwrap();

        exp.bind_trigger(0, ignore, TriggerMode::Change).unwrap();
        assert_eq!(device.peek(DEFVALA), 0b0000_0001);
        assert_eq!(device.peek(INTCONA), 0);
        assert!(!device.ops().contains(&Op::Write(DEFVALA, 1)));
    }

    #[test]
    fn failed_bind_keeps_previous_binding() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        let mut exp = expander(&device, FakeHost::new());
        exp.configure_output(Some(2), None, OutputType::ActiveLow, false)
            .unwrap();
        exp.bind_trigger(4, ignore, TriggerMode::Falling).unwrap();

        device.fail_write_at(INTCONA);
        assert_eq!(
            exp.bind_trigger(4, ignore, TriggerMode::Rising),
            Err(Error::WriteFailure)
        );
        assert_eq!(exp.bound_mode(4), Some(TriggerMode::Falling));

        // A fresh pin never gets its enable bit
        assert_eq!(
            exp.bind_trigger(6, ignore, TriggerMode::Rising),
            Err(Error::WriteFailure)
        );
        assert_eq!(exp.bound_mode(6), None);
        assert_eq!(device.peek(GPINTENA) & 0b0100_0000, 0);
        assert!(exp.take_write_error());
    }

    #[test]
    fn trigger_read_back_matches_binding() {
        let _lock = testing::lock();
        let device = FakeDevice::new();
        let mut exp = expander(&device, FakeHost::new());
        exp.configure_output(Some(2), None, OutputType::ActiveLow, false)
            .unwrap();

        let modes = [
            TriggerMode::Change,
            TriggerMode::Rising,
            TriggerMode::Falling,
            TriggerMode::Low,
            TriggerMode::High,
        ];
        for (pin, mode) in modes.iter().enumerate() {
            exp.bind_trigger(pin as u8 + 8, ignore, *mode).unwrap();
        }
        for (pin, mode) in modes.iter().enumerate() {
            assert_eq!(exp.read_trigger(pin as u8 + 8), Ok(*mode));
        }
        assert_eq!(exp.read_trigger(0), Ok(TriggerMode::None));

        exp.unbind_trigger(9).unwrap();
        assert_eq!(exp.read_trigger(9), Ok(TriggerMode::None));
        assert_eq!(exp.bound_mode(9), None);
    }
}
