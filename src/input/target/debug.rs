use crate::drivers::penmount::event::Event;

use super::{InputError, TargetInputDevice};

/// A [DebugDevice] logs every report instead of writing it to a virtual
/// device. Useful for testing a controller without uinput access.
#[derive(Debug, Default)]
pub struct DebugDevice {
    report: Vec<Event>,
    reports: usize,
}

impl DebugDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete reports received so far
    pub fn reports(&self) -> usize {
        self.reports
    }
}

impl TargetInputDevice for DebugDevice {
    fn write_events(&mut self, events: &[Event]) -> Result<(), InputError> {
        for event in events {
            if *event != Event::Sync {
                self.report.push(*event);
                continue;
            }
            self.reports += 1;
            log::info!("Report {}: {:?}", self.reports, self.report);
            self.report.clear();
        }
        Ok(())
    }
}
