pub mod command;
pub mod driver;
pub mod event;
pub mod hid_report;
#[cfg(test)]
pub mod hid_report_test;
pub mod state;
pub mod synthesizer;
#[cfg(test)]
pub mod synthesizer_test;
pub mod transport;
#[cfg(test)]
pub mod transport_test;

use std::fmt;

use embedded_hal::{digital, i2c};
use packed_struct::PackingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::command::Timings;

/// Vendor ID
pub const VID: u16 = 0x14E1;
/// Product ID of the P2 controller family
pub const PID_P2: u16 = 0x3500;
/// Product ID of the P3 controller family
pub const PID_P3: u16 = 0x1600;
/// Version advertised on the virtual input device (2.1.0)
pub const DRIVER_VERSION: u16 = (2 << 8) | (1 << 4);

/// Number of entries in the touch table
pub const MAX_TOUCH: usize = 16;
/// Largest tracking id the virtual device will advertise
pub const MAX_TRACK_ID: i32 = 0xFFFF;
/// Coordinate range of P2 controllers
pub const P2_RESOLUTION: u16 = 0x7FF;
/// Coordinate range of P3 controllers on the I2C bus
pub const P3_RESOLUTION: u16 = 0x7FF;
/// Minimum movement before a type A report is forwarded
pub const MIN_OFFSET: u16 = 30;

/// Possible errors while talking to a PenMount controller
#[derive(Error, Debug)]
pub enum Error {
    #[error("bus transaction failed: {0}")]
    Bus(i2c::ErrorKind),
    #[error("unable to switch controller power: {0}")]
    Power(digital::ErrorKind),
    #[error("driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("invalid checksum: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    #[error("invalid P2 touch status: {0:#04x}")]
    InvalidStatus(u8),
    #[error("invalid P3 report id: {0:#04x}")]
    InvalidReportId(u8),
    #[error("invalid P3 touch status: {0:#04x}")]
    InvalidTouchStatus(u8),
    #[error("invalid P3 byte count: {0}")]
    InvalidByteCount(u16),
    #[error("touch slot {0} is out of range")]
    InvalidSlotId(u8),
    #[error("timed out waiting for sync byte")]
    SyncTimeout,
    #[error("command was rejected by the device")]
    CommandRejected,
    #[error("unknown command acknowledgement: {0:02x?}")]
    UnknownAck([u8; 2]),
    #[error("unknown power mode: {0:#04x}")]
    UnknownPowerMode(u8),
    #[error("unknown device or device not found")]
    UnknownDevice,
    #[error("operation is not supported by {0} controllers")]
    Unsupported(DeviceModel),
    #[error("frame of {0} bytes exceeds the maximum packet size")]
    FrameTooLarge(usize),
    #[error("unable to unpack report: {0:?}")]
    Packing(#[from] PackingError),
}

impl Error {
    /// Returns true if the error was caused by a malformed packet. These are
    /// expected now and then and only end the current read cycle.
    pub fn is_malformed_packet(&self) -> bool {
        matches!(
            self,
            Error::Checksum { .. }
                | Error::InvalidStatus(_)
                | Error::InvalidReportId(_)
                | Error::InvalidTouchStatus(_)
                | Error::InvalidByteCount(_)
                | Error::InvalidSlotId(_)
                | Error::Packing(_)
        )
    }
}

/// Hardware generation of the controller. Fixed once the device is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceModel {
    P2,
    P3,
}

impl DeviceModel {
    pub fn product_id(&self) -> u16 {
        match self {
            DeviceModel::P2 => PID_P2,
            DeviceModel::P3 => PID_P3,
        }
    }

    pub fn resolution(&self) -> u16 {
        match self {
            DeviceModel::P2 => P2_RESOLUTION,
            DeviceModel::P3 => P3_RESOLUTION,
        }
    }

    pub fn default_protocol(&self) -> MtProtocol {
        match self {
            DeviceModel::P2 => MtProtocol::TypeA,
            DeviceModel::P3 => MtProtocol::TypeB,
        }
    }

    pub fn default_max_touch(&self) -> usize {
        match self {
            DeviceModel::P2 => 2,
            DeviceModel::P3 => MAX_TOUCH,
        }
    }

    /// P2 controllers report contacts one packet at a time and default to
    /// anonymous contacts.
    pub fn default_parallel_report(&self) -> bool {
        match self {
            DeviceModel::P2 => false,
            DeviceModel::P3 => true,
        }
    }

    /// Name of the input device registered for this model
    pub fn device_name(&self) -> String {
        format!("PenMount {self} I2C TouchScreen")
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceModel::P2 => write!(f, "P2"),
            DeviceModel::P3 => write!(f, "P3"),
        }
    }
}

/// Multi-touch event convention used towards the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MtProtocol {
    /// Anonymous contacts, re-reported every frame
    TypeA,
    /// Persistent slots, only changes are reported
    TypeB,
}

/// Options used when probing a controller
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// 7-bit bus address of the controller
    pub address: u8,
    /// Skip model detection and assume this model
    pub model: Option<DeviceModel>,
    pub protocol: Option<MtProtocol>,
    pub max_touch: Option<u8>,
    pub parallel_report: Option<bool>,
    /// Use P3 power-mode commands during probe, suspend and resume
    pub power_management: bool,
    pub timings: Timings,
}

impl DriverOptions {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            model: None,
            protocol: None,
            max_touch: None,
            parallel_report: None,
            power_management: true,
            timings: Timings::default(),
        }
    }
}

/// Reporting parameters derived from the detected model and any overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub model: DeviceModel,
    pub protocol: MtProtocol,
    pub max_touch: usize,
    pub parallel_report: bool,
    pub resolution: u16,
}

impl DeviceProfile {
    pub fn new(model: DeviceModel, options: &DriverOptions) -> Self {
        let max_touch = options
            .max_touch
            .map(|count| (count as usize).clamp(1, MAX_TOUCH))
            .unwrap_or_else(|| model.default_max_touch());

        Self {
            model,
            protocol: options.protocol.unwrap_or(model.default_protocol()),
            max_touch,
            parallel_report: options
                .parallel_report
                .unwrap_or(model.default_parallel_report()),
            resolution: model.resolution(),
        }
    }

    /// Returns true if only a single contact is reported
    pub fn is_single_touch(&self) -> bool {
        self.max_touch == 1
    }
}
