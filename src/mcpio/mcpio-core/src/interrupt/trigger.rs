/// Condition under which a pin's callback runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerMode {
    None,
    Change,  // Any transition
    Rising,  // Captured level high
    Falling, // Captured level low
    Low,     // Falling, re-invoked while the pin stays low
    High,    // Rising, re-invoked while the pin stays high
}

/// Device-side bits of a trigger: GPINTEN, INTCON and DEFVAL at the pin's
/// position. `default_compare` is `None` when the mode leaves DEFVAL alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEncoding {
    pub enabled: bool,
    pub control: bool,
    pub default_compare: Option<bool>,
}

impl TriggerMode {
    pub fn encode(self) -> TriggerEncoding {
        let (enabled, control, default_compare) = match self {
            TriggerMode::None => (false, false, None),
            TriggerMode::Change => (true, false, None),
            TriggerMode::Rising | TriggerMode::High => (true, true, Some(false)),
            TriggerMode::Falling | TriggerMode::Low => (true, true, Some(true)),
        };
        TriggerEncoding {
            enabled,
            control,
            default_compare,
        }
    }

    /// Falling/Low and Rising/High share device bits, so the host-side
    /// `sustained` flag picks between them
    pub fn decode(encoding: TriggerEncoding, sustained: bool) -> TriggerMode {
        if !encoding.enabled {
            return TriggerMode::None;
        }
        if !encoding.control {
            return TriggerMode::Change;
        }
        match (encoding.default_compare.unwrap_or(false), sustained) {
            (false, false) => TriggerMode::Rising,
            (false, true) => TriggerMode::High,
            (true, false) => TriggerMode::Falling,
            (true, true) => TriggerMode::Low,
        }
    }

    /// Level modes keep invoking while the level persists
    pub fn is_sustained(self) -> bool {
        matches!(self, TriggerMode::Low | TriggerMode::High)
    }

    /// Whether a pass with this captured level invokes the callback
    pub fn fires_on(self, captured: bool) -> bool {
        match self {
            TriggerMode::None => false,
            TriggerMode::Change => true,
            TriggerMode::Rising | TriggerMode::High => captured,
            TriggerMode::Falling | TriggerMode::Low => !captured,
        }
    }

    /// Level held by a level mode while it keeps re-invoking
    pub fn active_level(self) -> Option<bool> {
        match self {
            TriggerMode::High => Some(true),
            TriggerMode::Low => Some(false),
            _ => None,
        }
    }

    /// Level an edge mode must return to before the next pass is served
    pub fn idle_level(self) -> Option<bool> {
        match self {
            TriggerMode::Falling => Some(true),
            TriggerMode::Rising => Some(false),
            _ => None,
        }
    }
}
