//! GPIO lines used for the controller interrupt and supply

use std::time::Duration;

use embedded_hal::digital::{self, Error as _, ErrorType, InputPin};
use linux_embedded_hal::{
    sysfs_gpio::{Direction, Edge, Pin, PinPoller},
    SysfsPin, SysfsPinError,
};

/// Blocks until an input line sees the edge it was configured for
pub trait EdgeWait: ErrorType {
    /// Returns true if an edge was seen before the timeout expired
    fn poll_edge(&mut self, timeout: Option<Duration>) -> Result<bool, Self::Error>;
}

/// An active-low interrupt line driven by the controller. Implemented for
/// every input pin that can wait for edges.
pub trait InterruptLine: Send {
    /// Block until the line is asserted or the timeout expires. Returns true
    /// if an edge was seen.
    fn wait_for_edge(&mut self, timeout: Option<Duration>) -> Result<bool, digital::ErrorKind>;
    /// Returns true if the line is currently asserted
    fn is_asserted(&mut self) -> Result<bool, digital::ErrorKind>;
}

impl<P: InputPin + EdgeWait + Send> InterruptLine for P {
    fn wait_for_edge(&mut self, timeout: Option<Duration>) -> Result<bool, digital::ErrorKind> {
        self.poll_edge(timeout).map_err(|e| e.kind())
    }

    fn is_asserted(&mut self) -> Result<bool, digital::ErrorKind> {
        self.is_low().map_err(|e| e.kind())
    }
}

/// Export the given sysfs GPIO and drive it as an output starting low
pub fn open_output(number: u64) -> Result<SysfsPin, SysfsPinError> {
    let pin = Pin::new(number);
    pin.export()?;
    pin.set_direction(Direction::Low)?;
    log::debug!("Opened GPIO {number} as output");

    Ok(SysfsPin(pin))
}

/// Interrupt input on a sysfs GPIO, waiting for falling edges
pub struct InterruptPin {
    pin: SysfsPin,
    poller: PinPoller,
}

impl InterruptPin {
    /// Export the given sysfs GPIO as an input reporting falling edges
    pub fn open(number: u64) -> Result<Self, SysfsPinError> {
        let pin = Pin::new(number);
        pin.export()?;
        pin.set_direction(Direction::In)?;
        pin.set_edge(Edge::FallingEdge)?;
        let poller = pin.get_poller()?;
        log::debug!("Opened GPIO {number} as interrupt");

        Ok(Self {
            pin: SysfsPin(pin),
            poller,
        })
    }
}

impl ErrorType for InterruptPin {
    type Error = SysfsPinError;
}

impl InputPin for InterruptPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_low()
    }
}

impl EdgeWait for InterruptPin {
    fn poll_edge(&mut self, timeout: Option<Duration>) -> Result<bool, Self::Error> {
        let timeout = match timeout {
            Some(timeout) => isize::try_from(timeout.as_millis()).unwrap_or(isize::MAX),
            None => -1,
        };
        let value = self.poller.poll(timeout)?;
        Ok(value.is_some())
    }
}
