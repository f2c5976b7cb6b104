use core::fmt::Debug;

/// Edge on which the host vector fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sense {
    RisingEdge,
    FallingEdge,
}

/// The host MCU's pin-change interrupt vectors.
///
/// `attach` must arrange for `handler` to run on every `sense` edge of
/// `host_pin` until `detach` is called. The handler only sets an atomic flag,
/// so it is safe to run from interrupt context.
pub trait HostVector {
    type Error: Debug;

    fn attach(&mut self, host_pin: u8, handler: fn(), sense: Sense) -> Result<(), Self::Error>;
    fn detach(&mut self, host_pin: u8) -> Result<(), Self::Error>;
}

/// Stand-in for hosts without pin-change interrupts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterrupts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsupported;

impl HostVector for NoInterrupts {
    type Error = Unsupported;

    fn attach(&mut self, _host_pin: u8, _handler: fn(), _sense: Sense) -> Result<(), Unsupported> {
        Err(Unsupported)
    }

    fn detach(&mut self, _host_pin: u8) -> Result<(), Unsupported> {
        Ok(())
    }
}

impl<H: HostVector> HostVector for &mut H {
    type Error = H::Error;

    fn attach(&mut self, host_pin: u8, handler: fn(), sense: Sense) -> Result<(), Self::Error> {
        H::attach(self, host_pin, handler, sense)
    }

    fn detach(&mut self, host_pin: u8) -> Result<(), Self::Error> {
        H::detach(self, host_pin)
    }
}
