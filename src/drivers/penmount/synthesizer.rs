use super::{
    event::{Axis, Event},
    state::TouchTable,
    DeviceProfile, MtProtocol, MIN_OFFSET,
};

/// Touch major reported for an active type A contact
const TOUCH_MAJOR_ACTIVE: i32 = 2;

/// Single-touch state last emitted through type B pointer emulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EmulatedPointer {
    touching: bool,
    x: Option<u16>,
    y: Option<u16>,
}

/// Turns changes in the [TouchTable] into host input events
#[derive(Debug, Clone)]
pub struct Synthesizer {
    profile: DeviceProfile,
    pointer: EmulatedPointer,
}

impl Synthesizer {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            pointer: EmulatedPointer::default(),
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Latch the raw touch flag of the given slot. Single-touch devices
    /// report the slot right away.
    pub fn latch(&self, table: &mut TouchTable, slot: usize, events: &mut Vec<Event>) {
        let transition = table.latch(slot);
        if !self.profile.is_single_touch() {
            return;
        }
        let Some(touch) = table.get(slot) else {
            return;
        };

        if let Some(touching) = transition {
            events.push(Event::Touch(touching));
        }
        events.push(Event::position(Axis::X, touch.x));
        events.push(Event::position(Axis::Y, touch.y));
        events.push(Event::Sync);
    }

    /// Returns true if the pending batch only contains jitter and should be
    /// dropped. Dropped batches keep their last reported state.
    pub fn suppress(&self, table: &mut TouchTable) -> bool {
        let profile = &self.profile;
        if profile.protocol != MtProtocol::TypeA
            || !profile.parallel_report
            || profile.is_single_touch()
        {
            return false;
        }
        if !table.is_within(profile.max_touch, MIN_OFFSET) {
            return false;
        }

        log::trace!("Suppressing batch within jitter threshold");
        table.clear_updated(profile.max_touch);
        true
    }

    /// Emit the multi-touch events for the pending batch and roll the table
    /// over.
    pub fn synthesize(&mut self, table: &mut TouchTable, events: &mut Vec<Event>) {
        if !self.profile.is_single_touch() {
            match self.profile.protocol {
                MtProtocol::TypeA => self.synthesize_type_a(table, events),
                MtProtocol::TypeB => self.synthesize_type_b(table, events),
            }
        }
        table.rollover(self.profile.max_touch);
    }

    /// Run suppression then synthesis on the pending batch
    pub fn flush(&mut self, table: &mut TouchTable, events: &mut Vec<Event>) {
        if self.suppress(table) {
            return;
        }
        self.synthesize(table, events);
    }

    fn synthesize_type_a(&mut self, table: &mut TouchTable, events: &mut Vec<Event>) {
        let count = self.profile.max_touch;
        let parallel = self.profile.parallel_report;

        let touching = table.iter(count).filter(|(_, slot)| slot.touching).count();
        if touching == 0 {
            events.push(Event::MtSync);
        } else {
            for index in 0..count {
                let Some(slot) = table.get_mut(index) else {
                    break;
                };
                if parallel {
                    if slot.touching {
                        slot.track_id = index as i32;
                    }
                    if slot.track_id == -1 {
                        continue;
                    }
                    events.push(Event::MtTrackingId(slot.track_id));
                }

                let major = if slot.touching { TOUCH_MAJOR_ACTIVE } else { 0 };
                events.push(Event::MtTouchMajor(major));
                events.push(Event::mt_position(Axis::X, slot.x));
                events.push(Event::mt_position(Axis::Y, slot.y));
                events.push(Event::MtSync);

                if parallel && !slot.touching {
                    slot.track_id = -1;
                }
                table.claim_main_touch(index);
            }
        }

        // Single-touch emulation
        let main = table
            .main_touch()
            .map(|(_, slot)| (slot.touching, slot.x, slot.y));
        match main {
            Some((true, x, y)) => {
                events.push(Event::Touch(true));
                events.push(Event::position(Axis::X, x));
                events.push(Event::position(Axis::Y, y));
            }
            Some((false, _, _)) => {
                events.push(Event::Touch(false));
                table.release_main_touch();
            }
            None => (),
        }

        events.push(Event::Sync);
    }

    fn synthesize_type_b(&mut self, table: &mut TouchTable, events: &mut Vec<Event>) {
        let count = self.profile.max_touch;
        let mut changed = false;

        for (index, slot) in table.iter(count) {
            if !slot.has_changed() {
                continue;
            }
            changed = true;
            events.push(Event::MtSlot(index as u8));
            events.push(Event::MtSlotState(slot.touching));
            if slot.touching {
                if slot.x != slot.last_x {
                    events.push(Event::mt_position(Axis::X, slot.x));
                }
                if slot.y != slot.last_y {
                    events.push(Event::mt_position(Axis::Y, slot.y));
                }
            }
        }
        if !changed {
            return;
        }

        // Pointer emulation follows the main touch until it lifts
        if table.main_touch().is_some_and(|(_, main)| !main.touching) {
            table.release_main_touch();
        }
        for index in 0..count {
            table.claim_main_touch(index);
        }

        let main = table.main_touch().map(|(_, slot)| (slot.x, slot.y));
        let touching = main.is_some();
        if touching != self.pointer.touching {
            events.push(Event::Touch(touching));
            self.pointer.touching = touching;
        }
        if let Some((x, y)) = main {
            if self.pointer.x != Some(x) {
                events.push(Event::position(Axis::X, x));
                self.pointer.x = Some(x);
            }
            if self.pointer.y != Some(y) {
                events.push(Event::position(Axis::Y, y));
                self.pointer.y = Some(y);
            }
        }

        events.push(Event::Sync);
    }
}
