#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod constants;
pub mod device;
pub mod error;
pub mod host;
pub mod interrupt;
pub mod pins;
pub mod registers;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod testing;

pub use device::{DeviceIdentity, Expander};
pub use error::Error;
pub use host::{HostVector, Sense};
pub use interrupt::{InterruptControl, OutputType, PollOutcome, SupervisorState, TriggerMode};
pub use pins::{PinControl, PinMode};
pub use registers::AddressMode;
