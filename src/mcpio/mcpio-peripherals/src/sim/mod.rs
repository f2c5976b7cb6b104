mod expander;
mod host;
mod stimulus;

pub use expander::{SimExpander, SimResetLine, StdDelay};
pub use host::SimHost;
pub use stimulus::{Stimulus, StimulusDriver};
