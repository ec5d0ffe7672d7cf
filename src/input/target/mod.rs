pub mod debug;
pub mod touchscreen;

use std::io;

use thiserror::Error;

use crate::drivers::penmount::event::Event;

/// Possible errors while writing to a target device
#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to write to virtual device: {0}")]
    Io(#[from] io::Error),
    #[error("target device was already closed")]
    Closed,
}

/// A [TargetInputDevice] receives the synthesized event stream and forwards
/// it to the host.
pub trait TargetInputDevice: Send {
    /// Write the given events to the target device. Events are written in
    /// order and a report is completed by [Event::Sync].
    fn write_events(&mut self, events: &[Event]) -> Result<(), InputError>;

    /// Stop the target device
    fn stop(&mut self) -> Result<(), InputError> {
        Ok(())
    }
}

impl<T: TargetInputDevice + ?Sized> TargetInputDevice for Box<T> {
    fn write_events(&mut self, events: &[Event]) -> Result<(), InputError> {
        (**self).write_events(events)
    }

    fn stop(&mut self) -> Result<(), InputError> {
        (**self).stop()
    }
}
