use std::{error::Error, io};

use linux_embedded_hal::{i2cdev::linux::LinuxI2CError, I2cdev, SysfsPinError};
use thiserror::Error;
use tokio::{
    signal::unix::{signal, SignalKind},
    task,
};

use crate::{
    config::{DeviceConfig, TargetKind},
    drivers::penmount::{
        driver::{Driver, PowerSwitch},
        DeviceProfile, Error as DriverError,
    },
    gpio::{self, InterruptLine, InterruptPin},
    input::{
        source::{client::SourceDeviceClient, penmount::PenmountTouchscreen},
        target::{
            debug::DebugDevice,
            touchscreen::{TouchscreenConfig, TouchscreenDevice},
            InputError, TargetInputDevice,
        },
    },
};

/// Possible errors while setting up a device
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("failed to open I2C bus: {0}")]
    Bus(#[from] LinuxI2CError),
    #[error("failed to open GPIO: {0}")]
    Gpio(#[from] SysfsPinError),
    #[error("failed to probe controller: {0}")]
    Driver(#[from] DriverError),
    #[error("failed to create target device: {0}")]
    Target(#[from] InputError),
}

/// Open the bus and power switch described by the given config and probe
/// the controller. Blocks for as long as the controller needs to answer.
pub fn probe_device(config: &DeviceConfig) -> Result<Driver<I2cdev>, ManagerError> {
    log::debug!("Opening I2C bus: {}", config.bus.path);
    let i2c = I2cdev::new(&config.bus.path)?;
    let power = match config.power_gpio {
        Some(number) => {
            let pin = gpio::open_output(number.into())?;
            Some(Box::new(pin) as Box<dyn PowerSwitch>)
        }
        None => None,
    };

    let driver = Driver::probe(i2c, &config.driver_options(), power)?;
    Ok(driver)
}

/// Create the target device that receives the synthesized events
pub fn create_target(
    kind: TargetKind,
    profile: &DeviceProfile,
) -> Result<Box<dyn TargetInputDevice>, ManagerError> {
    let target: Box<dyn TargetInputDevice> = match kind {
        TargetKind::Touchscreen => {
            let config = TouchscreenConfig::from(profile);
            Box::new(TouchscreenDevice::new_with_config(config)?)
        }
        TargetKind::Debug => Box::new(DebugDevice::new()),
    };
    Ok(target)
}

/// Manages a single PenMount controller for the lifetime of the daemon
#[derive(Debug)]
pub struct Manager {
    config: DeviceConfig,
}

impl Manager {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    /// Probe the controller and run it until the daemon is asked to stop
    pub async fn run(&mut self) -> Result<(), Box<dyn Error>> {
        log::info!("Starting device: {}", self.config.name);
        let config = self.config.clone();
        let driver = task::spawn_blocking(move || probe_device(&config)).await??;
        log::debug!("Probed controller: {driver:?}");

        let target = create_target(self.config.target(), driver.profile())?;
        let interrupt = match self.config.interrupt_gpio {
            Some(number) => {
                let pin = InterruptPin::open(number.into())?;
                Some(Box::new(pin) as Box<dyn InterruptLine>)
            }
            None => None,
        };

        let mut source = PenmountTouchscreen::new(
            driver,
            target,
            interrupt,
            self.config.acquisition_config(),
        );

        // Forward system signals to the device
        let client = source.client();
        tokio::spawn(async move {
            if let Err(e) = handle_signals(client).await {
                log::error!("Unable to listen for signals: {e}");
            }
        });

        source.run().await?;
        log::info!("Device stopped: {}", self.config.name);

        Ok(())
    }
}

/// SIGUSR1 suspends the device, SIGUSR2 resumes it and CTRL+C stops it
async fn handle_signals(client: SourceDeviceClient) -> Result<(), io::Error> {
    let mut suspend = signal(SignalKind::user_defined1())?;
    let mut resume = signal(SignalKind::user_defined2())?;

    loop {
        tokio::select! {
            _ = suspend.recv() => {
                log::debug!("Received suspend signal");
                if let Err(e) = client.suspend().await {
                    log::error!("Failed to suspend device: {e}");
                }
            }
            _ = resume.recv() => {
                log::debug!("Received resume signal");
                if let Err(e) = client.resume().await {
                    log::error!("Failed to resume device: {e}");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                log::info!("Shutting down");
                if let Err(e) = client.stop().await {
                    log::error!("Failed to stop device: {e}");
                }
                break;
            }
        }
    }

    Ok(())
}
