use super::{hid_report::TouchSample, Error, MAX_TOUCH};

/// State of a single contact slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSlot {
    /// Contact id reported by the controller, -1 when unassigned
    pub id: i32,
    /// Tracking id for parallel type A reports, -1 when inactive
    pub track_id: i32,
    pub x: u16,
    pub y: u16,
    /// Last position sent to the host
    pub last_x: u16,
    pub last_y: u16,
    pub touching: bool,
    /// Last touch state sent to the host
    pub last_state: bool,
    /// Raw touch flag written by the decoder, consumed by [TouchTable::latch]
    pub touch: bool,
    /// Set when the slot was decoded since the last synthesis pass
    pub updated: bool,
}

impl Default for TouchSlot {
    fn default() -> Self {
        Self {
            id: -1,
            track_id: -1,
            x: 0,
            y: 0,
            last_x: 0,
            last_y: 0,
            touching: false,
            last_state: false,
            touch: false,
            updated: false,
        }
    }
}

impl TouchSlot {
    /// Returns true if position or touch state differ from what was last
    /// sent to the host.
    pub fn has_changed(&self) -> bool {
        self.x != self.last_x || self.y != self.last_y || self.touching != self.last_state
    }

    /// Returns true if the slot moved less than `offset` in both axes and kept
    /// its touch state.
    pub fn is_within(&self, offset: u16) -> bool {
        self.x.abs_diff(self.last_x) <= offset
            && self.y.abs_diff(self.last_y) <= offset
            && self.touching == self.last_state
    }
}

/// Fixed table of contact slots, indexed by slot number
#[derive(Debug, Clone)]
pub struct TouchTable {
    slots: [TouchSlot; MAX_TOUCH],
    /// Slot used for single-touch emulation
    main_touch: Option<usize>,
}

impl Default for TouchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TouchTable {
    pub fn new() -> Self {
        Self {
            slots: [TouchSlot::default(); MAX_TOUCH],
            main_touch: None,
        }
    }

    pub fn get(&self, slot: usize) -> Option<&TouchSlot> {
        self.slots.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut TouchSlot> {
        self.slots.get_mut(slot)
    }

    /// Iterate over the first `count` slots
    pub fn iter(&self, count: usize) -> impl Iterator<Item = (usize, &TouchSlot)> {
        self.slots.iter().take(count).enumerate()
    }

    /// Store a decoded sample in its slot and mark the slot as updated
    pub fn apply(&mut self, sample: &TouchSample) -> Result<(), Error> {
        let Some(slot) = self.slots.get_mut(sample.slot as usize) else {
            return Err(Error::InvalidSlotId(sample.slot));
        };
        slot.id = sample.slot as i32;
        slot.touch = sample.touch;
        slot.x = sample.x;
        slot.y = sample.y;
        slot.updated = true;

        Ok(())
    }

    /// Move the raw touch flag of the slot into its touch state. Returns the
    /// new touch state if it changed.
    pub fn latch(&mut self, slot: usize) -> Option<bool> {
        let slot = self.slots.get_mut(slot)?;
        let changed = slot.touch != slot.touching;
        slot.touching = slot.touch;
        slot.touch = false;
        changed.then_some(slot.touching)
    }

    /// Returns true if any of the first `count` slots was decoded this cycle
    /// and is still touching.
    pub fn has_pending_contact(&self, count: usize) -> bool {
        self.iter(count).any(|(_, slot)| slot.updated && slot.touching)
    }

    /// Returns true if every one of the first `count` slots stayed within
    /// `offset` of its last reported position and state.
    pub fn is_within(&self, count: usize, offset: u16) -> bool {
        self.iter(count).all(|(_, slot)| slot.is_within(offset))
    }

    pub fn clear_updated(&mut self, count: usize) {
        for slot in self.slots.iter_mut().take(count) {
            slot.updated = false;
        }
    }

    /// Record the current state of the first `count` slots as the state last
    /// sent to the host.
    pub fn rollover(&mut self, count: usize) {
        for slot in self.slots.iter_mut().take(count) {
            slot.updated = false;
            slot.last_state = slot.touching;
            slot.last_x = slot.x;
            slot.last_y = slot.y;
        }
    }

    /// Returns the slot used for single-touch emulation
    pub fn main_touch(&self) -> Option<(usize, &TouchSlot)> {
        let index = self.main_touch?;
        self.slots.get(index).map(|slot| (index, slot))
    }

    /// Select the main touch if none is set and the given slot is touching
    pub fn claim_main_touch(&mut self, index: usize) {
        if self.main_touch.is_some() {
            return;
        }
        if self.slots.get(index).is_some_and(|slot| slot.touching) {
            self.main_touch = Some(index);
        }
    }

    pub fn release_main_touch(&mut self) {
        self.main_touch = None;
    }
}
