mod config;
pub mod registry;
mod supervisor;
mod trigger;

pub use config::{output_bits, InterruptControl};
pub use registry::{CallbackRegistry, SlotGuard, REGISTRY};
pub use supervisor::hold_while_asserted;
pub use trigger::{TriggerEncoding, TriggerMode};

use crate::constants::PIN_COUNT;
use crate::host::Sense;
use heapless::Vec;

/// Electrical shape of the INTA/INTB outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputType {
    ActiveLow,
    ActiveHigh,
    OpenDrain,
}

impl OutputType {
    /// Host edge that marks an asserted output
    pub fn sense(self) -> Sense {
        match self {
            OutputType::ActiveHigh => Sense::RisingEdge,
            OutputType::ActiveLow | OutputType::OpenDrain => Sense::FallingEdge,
        }
    }
}

/// User callback, handed the expander pin that fired
pub type PinHandler = fn(u8);

#[derive(Clone, Copy)]
pub(crate) struct Binding {
    pub handler: PinHandler,
    pub mode: TriggerMode,
}

/// Observable phase of the interrupt supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorState {
    Idle,
    Pending,
    Serving,
    AwaitingRevert,
}

/// Result of one `poll_pending_interrupt` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    Idle,
    Served(ServiceReport),
    AwaitingRevert,
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceReport {
    pub pin: u8,
    pub captured: bool, // Level of the pin in INTCAP
    pub invocations: u32,
}

/// Working record of one service pass, dropped when the pass ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptSession {
    pub pin: Option<u8>,
    pub flags: [u8; 2],
    pub saved_enable: [u8; 2],
    pub captured: Option<[u8; 2]>,
    pub invocations: u32,
    pub rearmed: bool,
}

/// Host-side interrupt bookkeeping of one expander
pub(crate) struct InterruptState {
    pub output: Option<OutputType>,
    pub configured: bool,
    pub host_pins: Vec<u8, 2>,
    pub bindings: [Option<Binding>; PIN_COUNT as usize],
    pub serving: bool,
    pub reverted: bool,
    pub last_pin: Option<u8>,
}

impl InterruptState {
    pub fn new() -> Self {
        InterruptState {
            output: None,
            configured: false,
            host_pins: Vec::new(),
            bindings: [None; PIN_COUNT as usize],
            serving: false,
            reverted: true,
            last_pin: None,
        }
    }

    pub fn reset(&mut self) {
        *self = InterruptState::new();
    }

    pub fn mode_of(&self, pin: u8) -> Option<TriggerMode> {
        self.bindings
            .get(pin as usize)
            .copied()
            .flatten()
            .map(|b| b.mode)
    }
}
