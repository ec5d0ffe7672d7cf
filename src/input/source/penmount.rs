use std::{
    error::Error,
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::Duration,
};

use embedded_hal::i2c::I2c;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task,
    time::{self, Instant},
};

use crate::{
    drivers::penmount::{driver::Driver, Error as DriverError},
    gpio::InterruptLine,
    input::target::TargetInputDevice,
};

use super::{client::SourceDeviceClient, command::SourceCommand};

const BUFFER_SIZE: usize = 64;

/// How touch data is acquired from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// A cycle runs whenever the controller asserts its interrupt line
    Interrupt,
    /// A cycle runs on a recurring timer
    Polling,
}

/// Timing of the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Delay before the first cycle in polling mode
    pub poll_delay: Duration,
    /// Delay between cycles in polling mode
    pub poll_interval: Duration,
    /// Delay before another cycle while the interrupt line stays asserted
    pub retrigger_delay: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            retrigger_delay: Duration::from_millis(10),
        }
    }
}

/// Interrupt mask shared between the interrupt thread and the worker
#[derive(Debug, Clone, Default)]
struct IrqHandle {
    masked: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl IrqHandle {
    fn mask(&self) {
        self.masked.store(true, Ordering::SeqCst);
    }

    fn unmask(&self) {
        self.masked.store(false, Ordering::SeqCst);
    }

    fn is_masked(&self) -> bool {
        self.masked.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Wait for the interrupt line on a dedicated thread. The thread only masks
/// the line and signals the worker, it never touches the controller. While
/// unmasked, the line is sampled every `period` so a line that stays asserted
/// behaves like a level triggered interrupt.
fn spawn_interrupt_thread(
    mut line: Box<dyn InterruptLine>,
    irq: IrqHandle,
    tx: mpsc::Sender<()>,
    period: Duration,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("penmount-irq".to_string())
        .spawn(move || {
            log::debug!("Started interrupt thread");
            while !irq.is_stopped() {
                let edge = match line.wait_for_edge(Some(period)) {
                    Ok(edge) => edge,
                    Err(e) => {
                        log::error!("Failed to wait for interrupt: {e}");
                        thread::sleep(period);
                        continue;
                    }
                };
                if irq.is_masked() {
                    continue;
                }

                let asserted = edge
                    || line.is_asserted().unwrap_or_else(|e| {
                        log::warn!("Failed to read interrupt line: {e}");
                        false
                    });
                if !asserted {
                    continue;
                }

                irq.mask();
                match tx.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(_)) => (),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            log::debug!("Stopped interrupt thread");
        })
}

/// State of the acquisition source between cycles
#[derive(Debug)]
struct Acquisition {
    mode: AcquisitionMode,
    irq: Option<IrqHandle>,
    timer: Option<Instant>,
    suspended: bool,
    raw_session: bool,
}

impl Acquisition {
    fn is_paused(&self) -> bool {
        self.suspended || self.raw_session
    }

    /// Stop triggering cycles and drop any queued work
    fn quiesce(&mut self, irq_rx: &mut mpsc::Receiver<()>) {
        self.timer = None;
        if let Some(irq) = self.irq.as_ref() {
            irq.mask();
        }
        while irq_rx.try_recv().is_ok() {}
    }

    /// Allow the next cycle to be triggered. In polling mode the next cycle
    /// runs after `delay`.
    fn rearm(&mut self, delay: Duration) {
        if self.is_paused() {
            return;
        }
        match self.mode {
            AcquisitionMode::Polling => {
                self.timer = Some(Instant::now() + delay);
            }
            AcquisitionMode::Interrupt => {
                if let Some(irq) = self.irq.as_ref() {
                    irq.unmask();
                }
            }
        }
    }

    fn stop(&mut self) {
        self.timer = None;
        if let Some(irq) = self.irq.take() {
            irq.mask();
            irq.stop();
        }
    }
}

/// Answer a command, ignoring clients that stopped waiting
fn send_reply<T>(reply: oneshot::Sender<Result<T, DriverError>>, result: Result<T, DriverError>) {
    if let Err(result) = reply.send(result) {
        if let Err(e) = result {
            log::warn!("Client went away before receiving error: {e}");
        }
    }
}

/// Source device for a PenMount controller. Runs read cycles whenever the
/// controller has data and forwards the synthesized events to the target
/// device.
pub struct PenmountTouchscreen<I: I2c + Send + 'static> {
    driver: Arc<Mutex<Driver<I>>>,
    target: Box<dyn TargetInputDevice>,
    interrupt: Option<Box<dyn InterruptLine>>,
    mode: AcquisitionMode,
    /// Whether the controller takes part in suspend and resume
    suspendable: bool,
    config: AcquisitionConfig,
    tx: mpsc::Sender<SourceCommand>,
    rx: Option<mpsc::Receiver<SourceCommand>>,
}

impl<I: I2c + Send + 'static> PenmountTouchscreen<I> {
    /// Create a new source for the given driver. Without an interrupt line
    /// the controller is polled.
    pub fn new(
        driver: Driver<I>,
        target: Box<dyn TargetInputDevice>,
        interrupt: Option<Box<dyn InterruptLine>>,
        config: AcquisitionConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(BUFFER_SIZE);
        let mode = match interrupt {
            Some(_) => AcquisitionMode::Interrupt,
            None => AcquisitionMode::Polling,
        };
        let suspendable = driver.supports_suspend();
        Self {
            driver: Arc::new(Mutex::new(driver)),
            target,
            interrupt,
            mode,
            suspendable,
            config,
            tx,
            rx: Some(rx),
        }
    }

    /// Returns a client channel that can be used to send commands to this
    /// device
    pub fn client(&self) -> SourceDeviceClient {
        self.tx.clone().into()
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Run the acquisition loop until a stop command is received
    pub async fn run(&mut self) -> Result<(), Box<dyn Error>> {
        log::debug!("Starting PenMount touchscreen source");
        let Some(mut rx) = self.rx.take() else {
            return Err("source device is already running".into());
        };

        let mode = self.mode;
        let (irq_tx, mut irq_rx) = mpsc::channel(1);
        let mut acquisition = Acquisition {
            mode,
            irq: None,
            timer: None,
            suspended: false,
            raw_session: false,
        };
        match self.interrupt.take() {
            Some(line) => {
                let irq = IrqHandle::default();
                spawn_interrupt_thread(line, irq.clone(), irq_tx, self.config.retrigger_delay)?;
                acquisition.irq = Some(irq);
            }
            None => {
                drop(irq_tx);
                acquisition.timer = Some(Instant::now() + self.config.poll_delay);
            }
        }
        log::info!("Using {mode:?} acquisition");

        let result = loop {
            let deadline = acquisition.timer;
            tokio::select! {
                command = rx.recv() => {
                    let Some(command) = command else {
                        log::debug!("Command channel closed");
                        break Ok(());
                    };
                    if let SourceCommand::Stop = command {
                        log::debug!("Received stop command");
                        break Ok(());
                    }
                    self.handle_command(command, &mut acquisition, &mut irq_rx).await;
                }
                Some(()) = irq_rx.recv(), if !acquisition.is_paused() => {
                    if let Err(e) = self.cycle().await {
                        break Err(e);
                    }
                    acquisition.rearm(self.config.poll_interval);
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    acquisition.timer = None;
                    if let Err(e) = self.cycle().await {
                        break Err(e);
                    }
                    acquisition.rearm(self.config.poll_interval);
                }
            }
        };

        acquisition.stop();
        if let Err(e) = self.target.stop() {
            log::warn!("Failed to stop target device: {e}");
        }
        log::debug!("PenMount touchscreen source stopped");

        result
    }

    /// Run the given function with exclusive access to the driver on the
    /// blocking thread pool
    fn with_driver<T, F>(&self, f: F) -> impl Future<Output = Result<T, DriverError>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Driver<I>) -> Result<T, DriverError> + Send + 'static,
    {
        let driver = self.driver.clone();
        async move {
            let task = task::spawn_blocking(move || {
                let mut driver = driver.lock().unwrap_or_else(PoisonError::into_inner);
                f(&mut driver)
            });
            task.await?
        }
    }

    /// Read one report and forward the resulting events. Read errors end the
    /// cycle, only a failing target ends the loop.
    async fn cycle(&mut self) -> Result<(), Box<dyn Error>> {
        let events = match self.with_driver(|driver| driver.poll()).await {
            Ok(events) => events,
            Err(e) if e.is_malformed_packet() => {
                log::debug!("Dropping malformed packet: {e}");
                return Ok(());
            }
            Err(e) => {
                log::warn!("Failed to read touch data: {e}");
                return Ok(());
            }
        };
        if events.is_empty() {
            return Ok(());
        }

        log::trace!("Writing events: {events:?}");
        self.target.write_events(&events)?;

        Ok(())
    }

    async fn handle_command(
        &mut self,
        command: SourceCommand,
        acquisition: &mut Acquisition,
        irq_rx: &mut mpsc::Receiver<()>,
    ) {
        match command {
            SourceCommand::Suspend(reply) if !self.suspendable => {
                log::debug!("Ignoring suspend request");
                send_reply(reply, Ok(false));
            }
            SourceCommand::Resume(reply) if !self.suspendable => {
                log::debug!("Ignoring resume request");
                send_reply(reply, Ok(false));
            }
            SourceCommand::Suspend(reply) => {
                acquisition.quiesce(irq_rx);
                acquisition.suspended = true;
                let result = self.with_driver(|driver| driver.suspend()).await;
                send_reply(reply, result);
            }
            SourceCommand::Resume(reply) => {
                let result = self.with_driver(|driver| driver.resume()).await;
                acquisition.suspended = false;
                acquisition.rearm(self.config.poll_delay);
                send_reply(reply, result);
            }
            SourceCommand::GetPowerMode(reply) => {
                let result = self.with_driver(|driver| driver.get_power_mode()).await;
                send_reply(reply, result);
            }
            SourceCommand::SetPowerMode(mode, reply) => {
                let result = self
                    .with_driver(move |driver| driver.set_power_mode(mode))
                    .await;
                send_reply(reply, result);
            }
            SourceCommand::OpenRawChannel(reply) => {
                log::debug!("Opening raw channel");
                let result = self.open_raw_channel(acquisition, irq_rx).await;
                send_reply(reply, result);
            }
            SourceCommand::CloseRawChannel(reply) => {
                log::debug!("Closing raw channel");
                let result = self.settle_raw_channel().await;
                acquisition.raw_session = false;
                acquisition.rearm(self.config.poll_interval);
                send_reply(reply, result);
            }
            SourceCommand::RawWrite(frame, reply) => {
                let result = self
                    .with_driver(move |driver| driver.raw_write(&frame))
                    .await;
                send_reply(reply, result);
            }
            SourceCommand::RawRead(mut frame, reply) => {
                let result = self
                    .with_driver(move |driver| {
                        let length = driver.raw_read(&mut frame)?;
                        Ok((frame, length))
                    })
                    .await;
                send_reply(reply, result);
            }
            SourceCommand::Stop => (),
        }
    }

    /// Pause acquisition for the duration of a raw channel session
    async fn open_raw_channel(
        &mut self,
        acquisition: &mut Acquisition,
        irq_rx: &mut mpsc::Receiver<()>,
    ) -> Result<(), DriverError> {
        self.settle_raw_channel().await?;
        acquisition.quiesce(irq_rx);
        acquisition.raw_session = true;
        self.settle_raw_channel().await
    }

    fn settle_raw_channel(&self) -> impl Future<Output = Result<(), DriverError>> {
        self.with_driver(|driver| {
            driver.raw_channel_settle();
            Ok(())
        })
    }
}
