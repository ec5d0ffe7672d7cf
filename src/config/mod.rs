pub mod path;

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    drivers::penmount::{DeviceModel, DriverOptions, MtProtocol, MAX_TOUCH},
    input::source::penmount::AcquisitionConfig,
};

/// Represents all possible errors loading a [DeviceConfig]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
}

/// Describes a PenMount controller wired to the system and how it should be
/// driven.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DeviceConfig {
    pub version: u32,
    pub kind: String,
    pub name: String,
    pub bus: BusConfig,
    /// Sysfs GPIO number of the interrupt line. Without one the controller
    /// is polled.
    pub interrupt_gpio: Option<u32>,
    /// Sysfs GPIO number switching the controller supply
    pub power_gpio: Option<u32>,
    pub options: Option<DeviceConfigOptions>,
    pub target: Option<TargetKind>,
}

/// Location of the controller on the I2C bus
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct BusConfig {
    /// Path to the i2c-dev device node (e.g. "/dev/i2c-1")
    pub path: String,
    pub address: u8,
}

/// Overrides for the values derived from the detected model
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DeviceConfigOptions {
    /// Skip detection and assume this model
    pub model: Option<DeviceModel>,
    pub protocol: Option<MtProtocol>,
    pub max_touch: Option<u8>,
    pub parallel_report: Option<bool>,
    /// Use power-mode commands on P3 controllers (default: true)
    pub power_management: Option<bool>,
    /// Polling interval in milliseconds when no interrupt line is configured
    pub poll_interval_ms: Option<u64>,
}

/// Where synthesized events are delivered
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Virtual uinput touchscreen
    #[default]
    Touchscreen,
    /// Log events only
    Debug,
}

impl DeviceConfig {
    /// Load a [DeviceConfig] from the given YAML string
    pub fn from_yaml(content: &str) -> Result<DeviceConfig, LoadError> {
        let device: DeviceConfig = serde_yaml::from_str(content)?;
        Ok(device)
    }

    /// Load a [DeviceConfig] from the given YAML file
    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<DeviceConfig, LoadError> {
        let file = std::fs::File::open(path)?;
        let device: DeviceConfig = serde_yaml::from_reader(file)?;
        Ok(device)
    }

    fn options(&self) -> DeviceConfigOptions {
        self.options.clone().unwrap_or_default()
    }

    /// Returns the options used to probe the controller
    pub fn driver_options(&self) -> DriverOptions {
        let options = self.options();
        let mut driver_options = DriverOptions::new(self.bus.address);
        driver_options.model = options.model;
        driver_options.protocol = options.protocol;
        driver_options.parallel_report = options.parallel_report;
        driver_options.max_touch = options.max_touch;
        if let Some(max_touch) = options.max_touch {
            if max_touch == 0 || max_touch as usize > MAX_TOUCH {
                log::warn!("Clamping max_touch {max_touch} to 1..={MAX_TOUCH}");
            }
        }
        if let Some(power_management) = options.power_management {
            driver_options.power_management = power_management;
        }

        driver_options
    }

    /// Returns the timing of the acquisition loop
    pub fn acquisition_config(&self) -> AcquisitionConfig {
        let mut config = AcquisitionConfig::default();
        if let Some(interval) = self.options().poll_interval_ms {
            config.poll_interval = Duration::from_millis(interval.max(1));
        }
        config
    }

    pub fn target(&self) -> TargetKind {
        self.target.unwrap_or_default()
    }
}

/// Load every device config found in the search paths, in load order. Files
/// that fail to load are logged and skipped.
pub fn load_device_configs() -> Vec<(PathBuf, DeviceConfig)> {
    let paths = path::get_devices_paths();
    let files = path::get_multidir_sorted_files(paths.as_slice(), path::is_yaml_file);

    let mut configs = Vec::new();
    for file in files {
        match DeviceConfig::from_yaml_path(&file) {
            Ok(config) => {
                log::debug!("Loaded device config {:?} from {file:?}", config.name);
                configs.push((file, config));
            }
            Err(e) => log::warn!("Failed to load device config {file:?}: {e}"),
        }
    }

    configs
}
