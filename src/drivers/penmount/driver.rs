use std::{fmt, thread};

use embedded_hal::{
    digital::{self, Error as _, OutputPin, PinState},
    i2c::I2c,
};

use super::{
    command::{
        self, PowerMode, Timings, CMD_IDENTIFY, CMD_INDEX, GET_RESPONSE_SIZE, SET_RESPONSE_SIZE,
    },
    event::Event,
    hid_report::{
        decode_p3, is_p2_status, p2_checksum, PackedP2Report, TouchSample, P2_PACKET_SIZE,
        P2_PROBE, P2_PROBE_SYNC, P3_PACKET_SIZE,
    },
    state::TouchTable,
    synthesizer::Synthesizer,
    transport::{ReadMode, SyncPattern, Transport},
    DeviceModel, DeviceProfile, DriverOptions, Error, MAX_TOUCH,
};

/// Number of set/confirm attempts made when changing the power mode during
/// suspend and resume.
pub const POWER_RETRIES: usize = 5;

/// Switches the supply of the controller on and off. Implemented for every
/// output pin that drives the supply high when powered.
pub trait PowerSwitch: Send {
    fn set_powered(&mut self, on: bool) -> Result<(), digital::ErrorKind>;
}

impl<P: OutputPin + Send> PowerSwitch for P {
    fn set_powered(&mut self, on: bool) -> Result<(), digital::ErrorKind> {
        self.set_state(PinState::from(on)).map_err(|e| e.kind())
    }
}

/// Driver for a PenMount P2 or P3 touchscreen controller
pub struct Driver<I: I2c> {
    transport: Transport<I>,
    table: TouchTable,
    synthesizer: Synthesizer,
    power: Option<Box<dyn PowerSwitch>>,
    power_management: bool,
    timings: Timings,
}

impl<I: I2c> Driver<I> {
    /// Power on the controller, detect its model and prepare it for reading
    /// touch data.
    pub fn probe(
        i2c: I,
        options: &DriverOptions,
        mut power: Option<Box<dyn PowerSwitch>>,
    ) -> Result<Self, Error> {
        if let Some(power) = power.as_mut() {
            power.set_powered(true).map_err(Error::Power)?;
        }

        let mut transport = Transport::new(i2c, options.address);
        let model = match options.model {
            Some(model) => {
                log::debug!("Using configured model: {model}");
                model
            }
            None => detect_model(&mut transport, &options.timings)?,
        };
        log::info!(
            "Found PenMount {model} controller at {:#04x}",
            options.address
        );

        let profile = DeviceProfile::new(model, options);
        log::debug!("Using device profile: {profile:?}");

        let mut driver = Self {
            transport,
            table: TouchTable::new(),
            synthesizer: Synthesizer::new(profile),
            power,
            power_management: options.power_management,
            timings: options.timings,
        };

        if model == DeviceModel::P3 && driver.power_management {
            if let Err(e) = driver.set_power_mode(PowerMode::Active) {
                log::warn!("Failed to set controller to active mode: {e}");
            }
        }

        Ok(driver)
    }

    pub fn model(&self) -> DeviceModel {
        self.profile().model
    }

    pub fn profile(&self) -> &DeviceProfile {
        self.synthesizer.profile()
    }

    pub fn read_mode(&self) -> ReadMode {
        self.transport.mode()
    }

    pub fn table(&self) -> &TouchTable {
        &self.table
    }

    /// Run one read cycle and return the events it produced
    pub fn poll(&mut self) -> Result<Vec<Event>, Error> {
        match self.model() {
            DeviceModel::P2 => self.poll_p2(),
            DeviceModel::P3 => self.poll_p3(),
        }
    }

    fn poll_p2(&mut self) -> Result<Vec<Event>, Error> {
        let mut buf = [0u8; P2_PACKET_SIZE];
        self.transport.read(&mut buf, SyncPattern::Status)?;
        let report = PackedP2Report::decode(&buf)?;
        let sample = report.sample();

        let mut events = Vec::new();
        self.process_p2_sample(&sample, &mut events)?;

        Ok(events)
    }

    /// P2 controllers report one contact per packet. Samples are batched
    /// until a contact repeats or none of the batch is still touching.
    fn process_p2_sample(
        &mut self,
        sample: &TouchSample,
        events: &mut Vec<Event>,
    ) -> Result<(), Error> {
        let max_touch = self.profile().max_touch;
        let slot = sample.slot as usize;
        if slot >= max_touch {
            log::debug!("Dropping contact {slot} beyond max touch {max_touch}");
            return Ok(());
        }

        if self.table.get(slot).is_some_and(|touch| touch.updated) {
            self.synthesizer.flush(&mut self.table, events);
        }

        self.table.apply(sample)?;
        self.synthesizer.latch(&mut self.table, slot, events);

        if self.table.has_pending_contact(max_touch) {
            return Ok(());
        }
        self.synthesizer.flush(&mut self.table, events);

        Ok(())
    }

    fn poll_p3(&mut self) -> Result<Vec<Event>, Error> {
        let mut frame = [0u8; P3_PACKET_SIZE];
        self.transport.read(&mut frame, SyncPattern::Status)?;
        let samples = decode_p3(&frame)?;

        let max_touch = self.profile().max_touch;
        for sample in samples.iter() {
            if sample.slot as usize >= max_touch {
                log::debug!(
                    "Dropping contact {} beyond max touch {max_touch}",
                    sample.slot
                );
                continue;
            }
            self.table.apply(sample)?;
        }

        // Slots missing from the frame are released
        let mut events = Vec::new();
        for slot in 0..MAX_TOUCH {
            self.synthesizer.latch(&mut self.table, slot, &mut events);
        }
        self.synthesizer.flush(&mut self.table, &mut events);

        Ok(events)
    }

    fn ensure_p3(&self) -> Result<(), Error> {
        match self.model() {
            DeviceModel::P3 => Ok(()),
            model => Err(Error::Unsupported(model)),
        }
    }

    /// Write a command frame, wait for the controller to process it and read
    /// its response.
    fn send_command(&mut self, frame: &[u8], response: &mut [u8]) -> Result<(), Error> {
        log::debug!("Sending command {:#04x}", frame[CMD_INDEX]);
        self.transport.write(frame)?;
        thread::sleep(self.timings.command_response);
        self.transport.read(response, SyncPattern::Status)?;
        Ok(())
    }

    /// Switch the controller into the given power mode
    pub fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), Error> {
        self.ensure_p3()?;
        let frame = command::set_power_mode_frame(mode);
        let mut response = [0u8; SET_RESPONSE_SIZE];
        self.send_command(&frame, &mut response)?;
        command::check_ack(&response)?;
        log::debug!("Power mode set to {mode:?}");
        thread::sleep(self.timings.power_settle);
        Ok(())
    }

    /// Query the current power mode of the controller
    pub fn get_power_mode(&mut self) -> Result<PowerMode, Error> {
        self.ensure_p3()?;
        let frame = command::get_power_mode_frame();
        let mut response = [0u8; GET_RESPONSE_SIZE];
        self.send_command(&frame, &mut response)?;
        let mode = command::parse_power_mode(&response)?;
        log::debug!("Power mode is {mode:?}");
        Ok(mode)
    }

    /// Read the power mode, ignoring failures
    fn try_get_power_mode(&mut self) -> Option<PowerMode> {
        match self.get_power_mode() {
            Ok(mode) => Some(mode),
            Err(e) => {
                log::debug!("Failed to get power mode: {e}");
                None
            }
        }
    }

    /// Set the given mode until one of the accepted modes is read back.
    /// Returns true if the controller confirmed the change.
    fn change_power_mode(&mut self, mode: PowerMode, accepted: &[PowerMode]) -> bool {
        let mut current = self.try_get_power_mode();
        for attempt in 1..=POWER_RETRIES {
            if current.is_some_and(|mode| accepted.contains(&mode)) {
                return true;
            }
            log::debug!("Setting power mode to {mode:?} (attempt {attempt}/{POWER_RETRIES})");
            if let Err(e) = self.set_power_mode(mode) {
                log::debug!("Failed to set power mode: {e}");
            }
            thread::sleep(self.timings.power_retry);
            current = self.try_get_power_mode();
        }

        current.is_some_and(|mode| accepted.contains(&mode))
    }

    /// Returns true if the controller takes part in system suspend. Only P3
    /// controllers do.
    pub fn supports_suspend(&self) -> bool {
        self.model() == DeviceModel::P3
    }

    /// Put the controller to sleep and cut its power. Returns true if the
    /// controller confirmed the sleep mode. Failures are logged and never
    /// prevent the power switch from being turned off. P2 controllers are
    /// left alone.
    pub fn suspend(&mut self) -> Result<bool, Error> {
        if !self.supports_suspend() {
            log::debug!("Suspend is not supported by {} controllers", self.model());
            return Ok(false);
        }

        log::info!("Suspending device");
        let mut confirmed = false;
        if self.power_management {
            confirmed = self.change_power_mode(PowerMode::Sleep, &[PowerMode::Sleep]);
            if confirmed {
                log::info!("Device suspended");
            } else {
                log::error!("Failed to suspend device");
            }
        }

        if let Some(power) = self.power.as_mut() {
            if let Err(e) = power.set_powered(false) {
                log::error!("Failed to power off device: {e}");
            }
        }

        Ok(confirmed)
    }

    /// Power the controller back on and wake it up. Returns true if the
    /// controller confirmed an active mode. Contacts held at suspend stay in
    /// the table so the next frame releases them towards the host.
    pub fn resume(&mut self) -> Result<bool, Error> {
        if !self.supports_suspend() {
            log::debug!("Resume is not supported by {} controllers", self.model());
            return Ok(false);
        }

        log::info!("Resuming device");
        if let Some(power) = self.power.as_mut() {
            if let Err(e) = power.set_powered(true) {
                log::error!("Failed to power on device: {e}");
            }
        }

        let mut confirmed = false;
        if self.power_management {
            let accepted = [PowerMode::Active, PowerMode::FirmwareControl];
            confirmed = self.change_power_mode(PowerMode::Active, &accepted);
            if confirmed {
                log::info!("Device resumed");
            } else {
                log::error!("Failed to resume device");
            }
        }

        Ok(confirmed)
    }

    /// Sleep between opening or closing a raw channel session and the next
    /// bus transaction.
    pub fn raw_channel_settle(&self) {
        thread::sleep(self.timings.raw_channel_settle);
    }

    /// Forward a frame from a raw channel client to the controller
    pub fn raw_write(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.ensure_p3()?;
        if frame.len() > P3_PACKET_SIZE {
            return Err(Error::FrameTooLarge(frame.len()));
        }
        if let Some(command) = frame.get(CMD_INDEX) {
            log::debug!("Raw channel command {command:#04x}");
        }
        self.transport.write(frame)
    }

    /// Answer a raw channel read. The frame holds the client request and is
    /// overwritten with the response. Returns the length announced by the
    /// response.
    pub fn raw_read(&mut self, frame: &mut [u8; P3_PACKET_SIZE]) -> Result<usize, Error> {
        self.ensure_p3()?;
        if frame[CMD_INDEX] == CMD_IDENTIFY {
            return Ok(command::identification_reply(frame));
        }

        self.transport.read(frame, SyncPattern::Status)?;
        let length = u16::from_le_bytes([frame[0], frame[1]]);
        Ok(length as usize)
    }
}

/// Probe the controller with the P2 detection packet. P2 controllers echo the
/// packet, anything else that answers is treated as a P3.
pub fn detect_model<I: I2c>(
    transport: &mut Transport<I>,
    timings: &Timings,
) -> Result<DeviceModel, Error> {
    if let Err(e) = transport.write(&P2_PROBE) {
        log::debug!("Failed to write detection probe: {e}");
        return Err(Error::UnknownDevice);
    }
    thread::sleep(timings.probe_settle);

    let mut buf = [0u8; P2_PACKET_SIZE];
    if let Err(e) = transport.read(&mut buf, SyncPattern::Byte(P2_PROBE_SYNC)) {
        log::debug!("Failed to read detection probe: {e}");
        return Err(Error::UnknownDevice);
    }
    log::debug!("Detection probe response: {buf:02x?}");

    if buf[0] != P2_PROBE_SYNC && !is_p2_status(buf[0]) {
        transport.set_mode(ReadMode::Bulk);
        return Ok(DeviceModel::P3);
    }

    if buf[5] == p2_checksum(&buf[..5]) {
        transport.set_mode(ReadMode::Bulk);
        return Ok(DeviceModel::P2);
    }

    // The adapter mangled the block read, fall back to reading byte by byte
    // and drain the rest of the echo.
    transport.set_mode(ReadMode::Iterated);
    if let Err(e) = transport.read(&mut buf, SyncPattern::Byte(P2_PROBE_SYNC)) {
        log::debug!("Failed to drain detection probe: {e}");
    }

    Ok(DeviceModel::P2)
}

impl<I: I2c> fmt::Debug for Driver<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.transport.address())
            .field("mode", &self.transport.mode())
            .field("profile", self.profile())
            .finish()
    }
}

