use portable_atomic::{AtomicBool, Ordering};

use crate::constants::MAX_INSTANCES;
use crate::error::Error;

/// Process-wide slot table shared by every expander instance
pub static REGISTRY: CallbackRegistry = CallbackRegistry::new();

/// Host-vector handlers, one per slot. The host only accepts argument-less
/// functions, so each one is monomorphized over its slot index.
pub static TRAMPOLINES: [fn(); MAX_INSTANCES] = [
    trampoline::<0>,
    trampoline::<1>,
    trampoline::<2>,
    trampoline::<3>,
    trampoline::<4>,
    trampoline::<5>,
];

fn trampoline<const SLOT: usize>() {
    REGISTRY.signal(SLOT);
}

struct Slot {
    claimed: AtomicBool,
    pending: AtomicBool,
}

impl Slot {
    const fn new() -> Self {
        Slot {
            claimed: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        }
    }
}

pub struct CallbackRegistry {
    slots: [Slot; MAX_INSTANCES],
}

impl CallbackRegistry {
    const fn new() -> Self {
        const EMPTY: Slot = Slot::new();
        CallbackRegistry {
            slots: [EMPTY; MAX_INSTANCES],
        }
    }

    /// Takes the first free slot
    pub fn claim(&'static self) -> Result<SlotGuard, Error> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                slot.pending.store(false, Ordering::Release);
                return Ok(SlotGuard {
                    registry: self,
                    index,
                });
            }
        }
        Err(Error::RegistryFull)
    }

    /// Interrupt-context entry: marks the slot pending once. A signal that
    /// arrives while one is still unserved is absorbed, not queued.
    pub fn signal(&self, index: usize) {
        if let Some(slot) = self.slots.get(index) {
            if slot.claimed.load(Ordering::Acquire) && !slot.pending.load(Ordering::Acquire) {
                slot.pending.store(true, Ordering::Release);
            }
        }
    }

    pub fn claimed(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.claimed.load(Ordering::Acquire))
            .count()
    }
}

/// Ownership of one registry slot; released on drop
#[derive(Debug)]
pub struct SlotGuard {
    registry: &'static CallbackRegistry,
    index: usize,
}

impl core::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CallbackRegistry({}/{})", self.claimed(), MAX_INSTANCES)
    }
}

impl SlotGuard {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Trampoline routed to this slot
    pub fn handler(&self) -> fn() {
        TRAMPOLINES[self.index]
    }

    pub fn is_pending(&self) -> bool {
        self.registry.slots[self.index].pending.load(Ordering::Acquire)
    }

    pub fn clear_pending(&self) {
        self.registry.slots[self.index]
            .pending
            .store(false, Ordering::Release);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let slot = &self.registry.slots[self.index];
        slot.pending.store(false, Ordering::Release);
        slot.claimed.store(false, Ordering::Release);
    }
}
