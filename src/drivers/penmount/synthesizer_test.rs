use crate::drivers::penmount::{
    event::{Axis, Event},
    hid_report::TouchSample,
    state::TouchTable,
    synthesizer::Synthesizer,
    DeviceModel, DeviceProfile, MtProtocol, MAX_TOUCH,
};

fn profile(protocol: MtProtocol, max_touch: usize, parallel_report: bool) -> DeviceProfile {
    DeviceProfile {
        model: DeviceModel::P2,
        protocol,
        max_touch,
        parallel_report,
        resolution: 0x7FF,
    }
}

fn apply(table: &mut TouchTable, slot: u8, touch: bool, x: u16, y: u16) {
    let sample = TouchSample { slot, touch, x, y };
    table.apply(&sample).unwrap();
}

/// Latch every slot and flush, the way a P3 cycle does
fn cycle(synthesizer: &mut Synthesizer, table: &mut TouchTable) -> Vec<Event> {
    let mut events = Vec::new();
    for slot in 0..MAX_TOUCH {
        synthesizer.latch(table, slot, &mut events);
    }
    synthesizer.flush(table, &mut events);
    events
}

#[test]
fn test_type_a_touch_and_release() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeA, 2, true));
    let mut table = TouchTable::new();

    apply(&mut table, 0, true, 100, 200);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events,
        vec![
            Event::MtTrackingId(0),
            Event::MtTouchMajor(2),
            Event::mt_position(Axis::X, 100),
            Event::mt_position(Axis::Y, 200),
            Event::MtSync,
            Event::Touch(true),
            Event::position(Axis::X, 100),
            Event::position(Axis::Y, 200),
            Event::Sync,
        ]
    );
    assert_eq!(table.main_touch().map(|(index, _)| index), Some(0));

    apply(&mut table, 0, false, 100, 200);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(events, vec![Event::MtSync, Event::Touch(false), Event::Sync]);
    assert!(table.main_touch().is_none());
}

#[test]
fn test_type_a_second_contact() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeA, 2, true));
    let mut table = TouchTable::new();

    apply(&mut table, 0, true, 100, 200);
    cycle(&mut synthesizer, &mut table);

    apply(&mut table, 0, true, 100, 200);
    apply(&mut table, 1, true, 900, 800);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events,
        vec![
            Event::MtTrackingId(0),
            Event::MtTouchMajor(2),
            Event::mt_position(Axis::X, 100),
            Event::mt_position(Axis::Y, 200),
            Event::MtSync,
            Event::MtTrackingId(1),
            Event::MtTouchMajor(2),
            Event::mt_position(Axis::X, 900),
            Event::mt_position(Axis::Y, 800),
            Event::MtSync,
            Event::Touch(true),
            Event::position(Axis::X, 100),
            Event::position(Axis::Y, 200),
            Event::Sync,
        ]
    );

    // The lifted contact is reported once more, then its tracking id is freed
    apply(&mut table, 0, true, 100, 200);
    apply(&mut table, 1, false, 900, 800);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events[5..10],
        [
            Event::MtTrackingId(1),
            Event::MtTouchMajor(0),
            Event::mt_position(Axis::X, 900),
            Event::mt_position(Axis::Y, 800),
            Event::MtSync,
        ]
    );
    assert_eq!(table.get(1).map(|slot| slot.track_id), Some(-1));
}

#[test]
fn test_type_a_without_parallel_report() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeA, 2, false));
    let mut table = TouchTable::new();

    apply(&mut table, 1, true, 30, 40);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events,
        vec![
            Event::MtTouchMajor(0),
            Event::mt_position(Axis::X, 0),
            Event::mt_position(Axis::Y, 0),
            Event::MtSync,
            Event::MtTouchMajor(2),
            Event::mt_position(Axis::X, 30),
            Event::mt_position(Axis::Y, 40),
            Event::MtSync,
            Event::Touch(true),
            Event::position(Axis::X, 30),
            Event::position(Axis::Y, 40),
            Event::Sync,
        ]
    );
}

#[test]
fn test_suppression_is_idempotent() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeA, 2, true));
    let mut table = TouchTable::new();

    apply(&mut table, 0, true, 100, 200);
    assert!(!cycle(&mut synthesizer, &mut table).is_empty());

    // Movement within the jitter threshold is dropped
    apply(&mut table, 0, true, 130, 170);
    assert!(cycle(&mut synthesizer, &mut table).is_empty());
    let slot = table.get(0).copied().unwrap();
    assert!(!slot.updated);
    assert_eq!((slot.last_x, slot.last_y), (100, 200));
    assert_eq!((slot.x, slot.y), (130, 170));

    // Flushing the same state again changes nothing
    let mut events = Vec::new();
    assert!(synthesizer.suppress(&mut table));
    synthesizer.flush(&mut table, &mut events);
    assert!(events.is_empty());
    assert_eq!(table.get(0).copied().unwrap(), slot);

    // Moving past the threshold is reported
    apply(&mut table, 0, true, 131, 200);
    let events = cycle(&mut synthesizer, &mut table);
    assert!(events.contains(&Event::mt_position(Axis::X, 131)));
}

#[test]
fn test_rollover_after_synthesis() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeA, 2, true));
    let mut table = TouchTable::new();

    apply(&mut table, 0, true, 500, 600);
    apply(&mut table, 1, true, 700, 800);
    cycle(&mut synthesizer, &mut table);

    for (_, slot) in table.iter(2) {
        assert!(!slot.updated);
        assert!(slot.last_state);
        assert_eq!((slot.last_x, slot.last_y), (slot.x, slot.y));
    }
}

#[test]
fn test_type_b_delta_minimality() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeB, MAX_TOUCH, true));
    let mut table = TouchTable::new();

    apply(&mut table, 0, true, 10, 10);
    apply(&mut table, 3, true, 50, 60);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events,
        vec![
            Event::MtSlot(0),
            Event::MtSlotState(true),
            Event::mt_position(Axis::X, 10),
            Event::mt_position(Axis::Y, 10),
            Event::MtSlot(3),
            Event::MtSlotState(true),
            Event::mt_position(Axis::X, 50),
            Event::mt_position(Axis::Y, 60),
            Event::Touch(true),
            Event::position(Axis::X, 10),
            Event::position(Axis::Y, 10),
            Event::Sync,
        ]
    );

    // Only the Y coordinate of slot 3 changed
    apply(&mut table, 0, true, 10, 10);
    apply(&mut table, 3, true, 50, 70);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events,
        vec![
            Event::MtSlot(3),
            Event::MtSlotState(true),
            Event::mt_position(Axis::Y, 70),
            Event::Sync,
        ]
    );

    // Nothing changed at all
    apply(&mut table, 0, true, 10, 10);
    apply(&mut table, 3, true, 50, 70);
    assert!(cycle(&mut synthesizer, &mut table).is_empty());
}

#[test]
fn test_type_b_pointer_follows_remaining_contact() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeB, MAX_TOUCH, true));
    let mut table = TouchTable::new();

    apply(&mut table, 0, true, 10, 10);
    apply(&mut table, 3, true, 50, 60);
    cycle(&mut synthesizer, &mut table);

    // Slot 0 is absent from the next frame and gets released
    apply(&mut table, 3, true, 50, 60);
    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events,
        vec![
            Event::MtSlot(0),
            Event::MtSlotState(false),
            Event::position(Axis::X, 50),
            Event::position(Axis::Y, 60),
            Event::Sync,
        ]
    );

    let events = cycle(&mut synthesizer, &mut table);
    assert_eq!(
        events,
        vec![
            Event::MtSlot(3),
            Event::MtSlotState(false),
            Event::Touch(false),
            Event::Sync,
        ]
    );
}

#[test]
fn test_single_touch() {
    let mut synthesizer = Synthesizer::new(profile(MtProtocol::TypeA, 1, true));
    let mut table = TouchTable::new();
    let mut events = Vec::new();

    apply(&mut table, 0, true, 16, 32);
    synthesizer.latch(&mut table, 0, &mut events);
    synthesizer.flush(&mut table, &mut events);
    assert_eq!(
        events,
        vec![
            Event::Touch(true),
            Event::position(Axis::X, 16),
            Event::position(Axis::Y, 32),
            Event::Sync,
        ]
    );

    // No key event without a transition, and jitter is not suppressed
    events.clear();
    apply(&mut table, 0, true, 17, 32);
    synthesizer.latch(&mut table, 0, &mut events);
    synthesizer.flush(&mut table, &mut events);
    assert_eq!(
        events,
        vec![
            Event::position(Axis::X, 17),
            Event::position(Axis::Y, 32),
            Event::Sync,
        ]
    );
    assert_eq!(table.get(0).map(|slot| slot.last_x), Some(17));
}
