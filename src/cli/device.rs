use std::{error::Error, fmt::Display};

use clap::{Subcommand, ValueEnum};
use tokio::task;

use crate::{
    config::DeviceConfig,
    drivers::penmount::command::PowerMode,
    input::manager::{probe_device, ManagerError},
};

#[derive(Subcommand, Debug, Clone)]
pub enum PowerModeCommand {
    /// Get the current power mode of the controller
    Get,
    /// Set the power mode of the controller
    Set { mode: PowerModeArg },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum PowerModeArg {
    FirmwareControl,
    Active,
    Sleep,
}

impl From<PowerModeArg> for PowerMode {
    fn from(value: PowerModeArg) -> Self {
        match value {
            PowerModeArg::FirmwareControl => PowerMode::FirmwareControl,
            PowerModeArg::Active => PowerMode::Active,
            PowerModeArg::Sleep => PowerMode::Sleep,
        }
    }
}

/// Human readable name of a power mode
struct PowerModeName(PowerMode);

impl Display for PowerModeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            PowerMode::FirmwareControl => "firmware-control",
            PowerMode::Active => "active",
            PowerMode::Sleep => "sleep",
        };
        write!(f, "{name}")
    }
}

pub async fn handle_detect(config: DeviceConfig) -> Result<(), Box<dyn Error>> {
    let bus_path = config.bus.path.clone();
    let address = config.bus.address;
    let driver = task::spawn_blocking(move || probe_device(&config)).await??;
    let profile = driver.profile();

    println!("Bus:          {bus_path}");
    println!("Address:      {address:#04x}");
    println!("Model:        {}", profile.model);
    println!("Read mode:    {:?}", driver.read_mode());
    println!("Protocol:     {:?}", profile.protocol);
    println!("Max touch:    {}", profile.max_touch);
    println!("Resolution:   {}", profile.resolution);

    Ok(())
}

pub async fn handle_power_mode(
    config: DeviceConfig,
    cmd: PowerModeCommand,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        PowerModeCommand::Get => {
            let mode = task::spawn_blocking(move || -> Result<PowerMode, ManagerError> {
                let mut driver = probe_device(&config)?;
                Ok(driver.get_power_mode()?)
            })
            .await??;
            println!("{}", PowerModeName(mode));
        }
        PowerModeCommand::Set { mode } => {
            let mode = PowerMode::from(mode);
            task::spawn_blocking(move || -> Result<(), ManagerError> {
                let mut driver = probe_device(&config)?;
                Ok(driver.set_power_mode(mode)?)
            })
            .await??;
            println!("Power mode set to {}", PowerModeName(mode));
        }
    }

    Ok(())
}
