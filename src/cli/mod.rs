pub mod device;

use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand};
use device::{handle_detect, handle_power_mode, PowerModeCommand};

use crate::config::{load_device_configs, DeviceConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Device config to use instead of searching the config directories
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the PenMount driver daemon (default)
    Run,
    /// Probe the controller and display its model
    Detect,
    /// Manage the power mode of a P3 controller
    PowerMode {
        #[command(subcommand)]
        cmd: PowerModeCommand,
    },
}

/// Handle the commands that talk to the controller directly. These must not
/// be used while the daemon is running.
pub async fn main_cli(args: Args) -> Result<(), Box<dyn Error>> {
    let Some(cmd) = args.cmd else {
        return Ok(());
    };
    let config = find_config(args.config.as_ref())?;

    match cmd {
        Commands::Run => (),
        Commands::Detect => handle_detect(config).await?,
        Commands::PowerMode { cmd } => handle_power_mode(config, cmd).await?,
    }

    Ok(())
}

/// Returns the device config at the given path, or the first device config
/// found in the search paths.
pub fn find_config(path: Option<&PathBuf>) -> Result<DeviceConfig, Box<dyn Error>> {
    if let Some(path) = path {
        log::debug!("Loading device config from {path:?}");
        return Ok(DeviceConfig::from_yaml_path(path)?);
    }

    let Some((path, config)) = load_device_configs().into_iter().next() else {
        return Err("No device config found".into());
    };
    log::info!("Using device config {path:?}");

    Ok(config)
}
