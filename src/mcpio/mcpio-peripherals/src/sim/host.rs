use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};
use mcpio_core::host::{HostVector, Sense};

#[derive(Default)]
struct HostState {
    vectors: HashMap<u8, (fn(), Sense)>,
    levels: HashMap<u8, bool>,
    fired: u32,
}

/// Simulated host MCU pin-change interrupts.
///
/// Pins are driven by whatever they are wired to (a `SimExpander` INT
/// output); a level change matching an attached vector's sense runs its
/// handler on the thread that caused the change.
#[derive(Clone, Default)]
pub struct SimHost {
    state: Arc<Mutex<HostState>>,
}

impl SimHost {
    pub fn new() -> Self {
        SimHost::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// New level on a host pin
    pub fn line_changed(&self, pin: u8, level: bool) {
        let handler = {
            let mut state = self.lock();
            let previous = state.levels.insert(pin, level);
            let edge = match (previous, level) {
                (Some(false), true) => Some(Sense::RisingEdge),
                (Some(true), false) => Some(Sense::FallingEdge),
                _ => None,
            };
            trace!("host pin {} -> {} ({:?})", pin, level, edge);
            let vector = state.vectors.get(&pin).copied();
            match (edge, vector) {
                (Some(edge), Some((handler, sense))) if edge == sense => {
                    state.fired += 1;
                    Some(handler)
                }
                _ => None,
            }
        };
        // Run outside the lock, as real interrupt hardware would
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn level(&self, pin: u8) -> Option<bool> {
        self.lock().levels.get(&pin).copied()
    }

    pub fn is_attached(&self, pin: u8) -> bool {
        self.lock().vectors.contains_key(&pin)
    }

    /// Number of handler invocations so far
    pub fn fired(&self) -> u32 {
        self.lock().fired
    }
}

impl HostVector for SimHost {
    type Error = Infallible;

    fn attach(&mut self, host_pin: u8, handler: fn(), sense: Sense) -> Result<(), Infallible> {
        debug!("host pin {} armed on {:?}", host_pin, sense);
        self.lock().vectors.insert(host_pin, (handler, sense));
        Ok(())
    }

    fn detach(&mut self, host_pin: u8) -> Result<(), Infallible> {
        self.lock().vectors.remove(&host_pin);
        Ok(())
    }
}
