use embedded_hal::digital::OutputPin;
use log::{debug, error, warn};

use super::{InterruptSession, PollOutcome, ServiceReport};
use crate::constants::registers::*;
use crate::device::Expander;
use crate::error::Error;
use crate::host::HostVector;
use crate::registers::RegisterBank;
use crate::transport::RegisterTransport;
use crate::utils::{bit_is_set, bit_of, extra_flags, first_set_pin, pin_register, port_of};

/// Invokes `invoke`, then keeps re-invoking while `read_level` reports the
/// `active` level. A failed read (`None`) ends the loop. Returns the number
/// of invocations, which is always at least one.
///
/// There is no iteration cap: a level that never clears blocks the caller.
pub fn hold_while_asserted<R, F>(mut read_level: R, active: bool, mut invoke: F) -> u32
where
    R: FnMut() -> Option<bool>,
    F: FnMut(),
{
    let mut count = 0;
    loop {
        invoke();
        count += 1;
        match read_level() {
            Some(level) if level == active => continue,
            _ => break,
        }
    }
    count
}

// Live level of a pin from its GPIO register
fn live_level<T: RegisterTransport>(bank: &mut RegisterBank<T>, pin: u8) -> Option<bool> {
    bank.sync_one(pin_register(GPIOA, pin))
        .ok()
        .map(|value| bit_is_set(value, bit_of(pin)))
}

impl<T, RST, H> Expander<T, RST, H>
where
    T: RegisterTransport,
    RST: OutputPin,
    H: HostVector,
{
    pub(crate) fn poll_supervisor(&mut self) -> Result<PollOutcome, Error> {
        if !self.interrupts.reverted {
            return self.check_revert();
        }
        if !self.slot.is_pending() {
            return Ok(PollOutcome::Idle);
        }

        let session = self.service_pass();

        self.slot.clear_pending();
        // Drains whatever latched while the pass ran
        if self.bank.sync_pair(INTCAPA).is_err() {
            warn!("post-service capture read failed");
        }
        self.interrupts.reverted = false;
        self.interrupts.last_pin = session.pin;

        let pin = session.pin.ok_or(Error::UndeterminedPin)?;
        if !session.rearmed {
            return Err(Error::OperationFailed);
        }
        let captured = session
            .captured
            .map_or(false, |c| bit_is_set(c[port_of(pin) as usize], bit_of(pin)));
        Ok(PollOutcome::Served(ServiceReport {
            pin,
            captured,
            invocations: session.invocations,
        }))
    }

    /// One full service pass. Never aborts: every step after a failure still
    /// runs so the device and host vectors end up re-armed.
    fn service_pass(&mut self) -> InterruptSession {
        self.interrupts.serving = true;
        let mut session = InterruptSession::default();

        if let Err(e) = self.detach_host() {
            warn!("detach before service failed: {}", e);
        }

        session.flags = match self.bank.sync_pair(INTFA) {
            Ok(flags) => flags,
            Err(_) => [0, 0],
        };
        session.saved_enable = match self.bank.sync_pair(GPINTENA) {
            Ok(enable) => enable,
            // Best guess is whatever was last confirmed
            Err(_) => [
                self.bank.get(GPINTENA).unwrap_or(0),
                self.bank.get(GPINTENB).unwrap_or(0),
            ],
        };
        for reg in [GPINTENA, GPINTENB] {
            if self.bank.commit_one(reg, 0).is_err() {
                error!("could not mask {}", NAMES[reg as usize]);
            }
        }
        session.captured = self.bank.sync_pair(INTCAPA).ok();

        session.pin = first_set_pin(session.flags);
        let dropped = extra_flags(session.flags);
        if dropped > 0 {
            warn!(
                "{} simultaneous interrupt flag(s) dropped, flags {:02x?}",
                dropped, session.flags
            );
        }

        match (session.pin, session.captured) {
            (Some(pin), Some(captured)) => {
                session.invocations = self.dispatch(pin, captured);
            }
            (Some(pin), None) => warn!("capture unreadable, pin {} not dispatched", pin),
            (None, _) => warn!("interrupt source undetermined"),
        }

        for (reg, value) in [GPINTENA, GPINTENB].into_iter().zip(session.saved_enable) {
            if self.bank.commit_one(reg, value).is_err() {
                error!("could not restore {}", NAMES[reg as usize]);
            }
        }
        session.rearmed = match self.attach_host() {
            Ok(()) => true,
            Err(e) => {
                error!("host vector lost, interrupts disabled: {}", e);
                self.interrupts.configured = false;
                false
            }
        };

        self.interrupts.serving = false;
        session
    }

    fn dispatch(&mut self, pin: u8, captured: [u8; 2]) -> u32 {
        let binding = match self.interrupts.bindings[pin as usize] {
            Some(binding) => binding,
            None => {
                warn!("pin {} fired with no binding", pin);
                return 0;
            }
        };
        let level = bit_is_set(captured[port_of(pin) as usize], bit_of(pin));
        if !binding.mode.fires_on(level) {
            return 0;
        }

        let handler = binding.handler;
        let invocations = match binding.mode.active_level() {
            Some(active) => {
                let bank = &mut self.bank;
                hold_while_asserted(|| live_level(bank, pin), active, || handler(pin))
            }
            None => {
                handler(pin);
                1
            }
        };
        debug!("pin {} {:?} served {} time(s)", pin, binding.mode, invocations);
        invocations
    }

    /// Edge modes wait for their pin to go back to idle before the next
    /// pass; everything else reverts at once
    fn check_revert(&mut self) -> Result<PollOutcome, Error> {
        let idle = self
            .interrupts
            .last_pin
            .and_then(|pin| self.interrupts.mode_of(pin).map(|mode| (pin, mode)))
            .and_then(|(pin, mode)| mode.idle_level().map(|level| (pin, level)));

        if let Some((pin, level)) = idle {
            let value = self.bank.sync_one(pin_register(GPIOA, pin))?;
            if bit_is_set(value, bit_of(pin)) != level {
                return Ok(PollOutcome::AwaitingRevert);
            }
        }

        self.interrupts.reverted = true;
        Ok(PollOutcome::Reverted)
    }
}
