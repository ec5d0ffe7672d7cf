/// Axis of an absolute position event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Events produced by the synthesizer, in the order they must reach the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Single-touch button state
    Touch(bool),
    /// Single-touch absolute position
    Position { axis: Axis, value: u16 },
    /// Select the slot the following type B events apply to
    MtSlot(u8),
    /// Whether the selected slot has an active contact
    MtSlotState(bool),
    MtTrackingId(i32),
    MtTouchMajor(i32),
    MtPosition { axis: Axis, value: u16 },
    /// End of one type A contact
    MtSync,
    /// End of a complete report
    Sync,
}

impl Event {
    pub fn position(axis: Axis, value: u16) -> Self {
        Event::Position { axis, value }
    }

    pub fn mt_position(axis: Axis, value: u16) -> Self {
        Event::MtPosition { axis, value }
    }
}
