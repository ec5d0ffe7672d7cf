use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventType, InputEvent, InputId, KeyCode,
    PropType, SynchronizationCode, UinputAbsSetup,
};

use crate::drivers::penmount::{
    event::{Axis, Event},
    DeviceProfile, MtProtocol, DRIVER_VERSION, MAX_TOUCH, MAX_TRACK_ID, VID,
};

use super::{InputError, TargetInputDevice};

/// Bus type reported for the virtual device (BUS_I2C)
const BUS_I2C: u16 = 0x18;
/// Largest touch major reported under type A
const TOUCH_MAJOR_MAX: i32 = 5;

/// Configuration of the target touchscreen device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchscreenConfig {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
    pub resolution: u16,
    pub protocol: MtProtocol,
    pub max_touch: usize,
    pub parallel_report: bool,
}

impl From<&DeviceProfile> for TouchscreenConfig {
    fn from(profile: &DeviceProfile) -> Self {
        Self {
            name: profile.model.device_name(),
            vendor_id: VID,
            product_id: profile.model.product_id(),
            version: DRIVER_VERSION,
            resolution: profile.resolution,
            protocol: profile.protocol,
            max_touch: profile.max_touch,
            parallel_report: profile.parallel_report,
        }
    }
}

/// Turns the synthesized event stream into evdev events. Events are buffered
/// until a [Event::Sync] completes the report.
#[derive(Debug)]
pub struct EvdevTranslator {
    slot: usize,
    active: [bool; MAX_TOUCH],
    tracking_id_next: i32,
    pending: Vec<InputEvent>,
}

impl Default for EvdevTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl EvdevTranslator {
    pub fn new() -> Self {
        Self {
            slot: 0,
            active: [false; MAX_TOUCH],
            tracking_id_next: 0,
            pending: Vec::new(),
        }
    }

    /// Translate the given event. Returns the buffered report once the event
    /// completes it. The trailing SYN_REPORT is left to the device.
    pub fn translate(&mut self, event: &Event) -> Option<Vec<InputEvent>> {
        match *event {
            Event::Touch(touching) => {
                self.push_key(KeyCode::BTN_TOUCH, touching as i32);
            }
            Event::Position { axis, value } => {
                let code = match axis {
                    Axis::X => AbsoluteAxisCode::ABS_X,
                    Axis::Y => AbsoluteAxisCode::ABS_Y,
                };
                self.push_abs(code, value as i32);
            }
            Event::MtSlot(slot) => {
                if slot as usize >= MAX_TOUCH {
                    log::warn!("Ignoring events for invalid slot {slot}");
                    return None;
                }
                self.slot = slot as usize;
                self.push_abs(AbsoluteAxisCode::ABS_MT_SLOT, slot as i32);
            }
            Event::MtSlotState(touching) => self.translate_slot_state(touching),
            Event::MtTrackingId(id) => {
                self.push_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, id);
            }
            Event::MtTouchMajor(major) => {
                self.push_abs(AbsoluteAxisCode::ABS_MT_TOUCH_MAJOR, major);
            }
            Event::MtPosition { axis, value } => {
                let code = match axis {
                    Axis::X => AbsoluteAxisCode::ABS_MT_POSITION_X,
                    Axis::Y => AbsoluteAxisCode::ABS_MT_POSITION_Y,
                };
                self.push_abs(code, value as i32);
            }
            Event::MtSync => {
                let event = InputEvent::new(
                    EventType::SYNCHRONIZATION.0,
                    SynchronizationCode::SYN_MT_REPORT.0,
                    0,
                );
                self.pending.push(event);
            }
            Event::Sync => return Some(std::mem::take(&mut self.pending)),
        }

        None
    }

    /// A slot only gets a new tracking id when its contact starts
    fn translate_slot_state(&mut self, touching: bool) {
        let slot = self.slot;
        if self.active[slot] == touching {
            return;
        }
        self.active[slot] = touching;

        let tracking_id = if touching {
            let id = self.tracking_id_next;
            self.tracking_id_next = (id + 1) % (MAX_TRACK_ID + 1);
            id
        } else {
            -1
        };
        self.push_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, tracking_id);
    }

    fn push_abs(&mut self, code: AbsoluteAxisCode, value: i32) {
        let event = InputEvent::new(EventType::ABSOLUTE.0, code.0, value);
        self.pending.push(event);
    }

    fn push_key(&mut self, code: KeyCode, value: i32) {
        let event = InputEvent::new(EventType::KEY.0, code.0, value);
        self.pending.push(event);
    }
}

/// Virtual touchscreen created through uinput. The device is configured from
/// a [TouchscreenConfig] derived from the detected controller.
#[derive(Debug)]
pub struct TouchscreenDevice {
    config: TouchscreenConfig,
    device: Option<VirtualDevice>,
    translator: EvdevTranslator,
}

impl TouchscreenDevice {
    /// Create a new emulated touchscreen device with the given configuration.
    pub fn new_with_config(config: TouchscreenConfig) -> Result<Self, InputError> {
        let device = TouchscreenDevice::create_virtual_device(&config)?;
        log::info!("Created virtual touchscreen: {}", config.name);
        Ok(Self {
            config,
            device: Some(device),
            translator: EvdevTranslator::new(),
        })
    }

    /// Create the virtual device to emulate
    fn create_virtual_device(config: &TouchscreenConfig) -> Result<VirtualDevice, InputError> {
        // Setup Key inputs
        let mut keys = AttributeSet::<KeyCode>::new();
        keys.insert(KeyCode::BTN_TOUCH);

        // Setup ABS inputs
        let resolution = config.resolution as i32;
        let position_setup = AbsInfo::new(0, 0, resolution, 0, 0, 0);
        let abs_x = UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, position_setup);
        let abs_y = UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, position_setup);
        let abs_mt_pos_x =
            UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_POSITION_X, position_setup);
        let abs_mt_pos_y =
            UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_POSITION_Y, position_setup);

        // Setup properties
        let mut properties = AttributeSet::<PropType>::new();
        properties.insert(PropType::DIRECT);

        // Identify to the kernel as an I2C touchscreen
        let id = InputId::new(
            BusType(BUS_I2C),
            config.vendor_id,
            config.product_id,
            config.version,
        );

        let mut builder = VirtualDeviceBuilder::new()?
            .name(config.name.as_str())
            .input_id(id)
            .with_properties(&properties)?
            .with_keys(&keys)?
            .with_absolute_axis(&abs_x)?
            .with_absolute_axis(&abs_y)?
            .with_absolute_axis(&abs_mt_pos_x)?
            .with_absolute_axis(&abs_mt_pos_y)?;

        match config.protocol {
            MtProtocol::TypeA => {
                log::debug!("Using MT protocol type A");
                let major_setup = AbsInfo::new(0, 0, TOUCH_MAJOR_MAX, 0, 0, 0);
                let abs_mt_touch_major =
                    UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_TOUCH_MAJOR, major_setup);
                builder = builder.with_absolute_axis(&abs_mt_touch_major)?;

                if config.parallel_report {
                    let max_id = MAX_TOUCH as i32 - 1;
                    let tracking_id_setup = AbsInfo::new(0, 0, max_id, 0, 0, 0);
                    let abs_mt_tracking_id =
                        UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_TRACKING_ID, tracking_id_setup);
                    builder = builder.with_absolute_axis(&abs_mt_tracking_id)?;
                }
            }
            MtProtocol::TypeB => {
                log::debug!("Using MT protocol type B");
                let max_slot = config.max_touch.saturating_sub(1) as i32;
                let slot_setup = AbsInfo::new(0, 0, max_slot, 0, 0, 0);
                let abs_mt_slot = UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_SLOT, slot_setup);

                let tracking_id_setup = AbsInfo::new(0, 0, MAX_TRACK_ID, 0, 0, 0);
                let abs_mt_tracking_id =
                    UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_TRACKING_ID, tracking_id_setup);

                builder = builder
                    .with_absolute_axis(&abs_mt_slot)?
                    .with_absolute_axis(&abs_mt_tracking_id)?;
            }
        }

        let device = builder.build()?;

        Ok(device)
    }
}

impl TargetInputDevice for TouchscreenDevice {
    fn write_events(&mut self, events: &[Event]) -> Result<(), InputError> {
        let Some(device) = self.device.as_mut() else {
            return Err(InputError::Closed);
        };
        for event in events {
            log::trace!("Received event: {event:?}");
            let Some(report) = self.translator.translate(event) else {
                continue;
            };
            // Emitting appends the SYN_REPORT
            device.emit(report.as_slice())?;
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<(), InputError> {
        if self.device.take().is_some() {
            log::debug!("Destroyed virtual touchscreen: {}", self.config.name);
        }
        Ok(())
    }
}
