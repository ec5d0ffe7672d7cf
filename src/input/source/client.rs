use thiserror::Error;
use tokio::sync::{
    mpsc::{error::SendError, Sender},
    oneshot,
};

use crate::drivers::penmount::{
    command::PowerMode, hid_report::P3_PACKET_SIZE, Error as DriverError,
};

use super::command::SourceCommand;

/// Possible errors for a source device client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to send command to device")]
    SendError(SendError<SourceCommand>),
    #[error("device encountered an error processing the request: {0}")]
    ServiceError(DriverError),
    #[error("device no longer exists")]
    ChannelClosed,
}

impl From<SendError<SourceCommand>> for ClientError {
    fn from(err: SendError<SourceCommand>) -> Self {
        Self::SendError(err)
    }
}

/// A client for communicating with a running source device
#[derive(Debug, Clone)]
pub struct SourceDeviceClient {
    tx: Sender<SourceCommand>,
}

impl From<Sender<SourceCommand>> for SourceDeviceClient {
    fn from(tx: Sender<SourceCommand>) -> Self {
        SourceDeviceClient::new(tx)
    }
}

impl SourceDeviceClient {
    pub fn new(tx: Sender<SourceCommand>) -> Self {
        Self { tx }
    }

    /// Send the command built from a reply channel and wait for the answer
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, DriverError>>) -> SourceCommand,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(command(tx)).await?;
        match rx.await {
            Ok(result) => result.map_err(ClientError::ServiceError),
            Err(_) => Err(ClientError::ChannelClosed),
        }
    }

    /// Suspend the device. Returns true if the controller confirmed that it
    /// went to sleep.
    pub async fn suspend(&self) -> Result<bool, ClientError> {
        self.request(SourceCommand::Suspend).await
    }

    /// Resume the device. Returns true if the controller confirmed that it
    /// is active again.
    pub async fn resume(&self) -> Result<bool, ClientError> {
        self.request(SourceCommand::Resume).await
    }

    pub async fn get_power_mode(&self) -> Result<PowerMode, ClientError> {
        self.request(SourceCommand::GetPowerMode).await
    }

    pub async fn set_power_mode(&self, mode: PowerMode) -> Result<(), ClientError> {
        self.request(|tx| SourceCommand::SetPowerMode(mode, tx)).await
    }

    /// Open a raw channel session. Touch acquisition is paused until the
    /// session is closed.
    pub async fn open_raw_channel(&self) -> Result<(), ClientError> {
        self.request(SourceCommand::OpenRawChannel).await
    }

    pub async fn close_raw_channel(&self) -> Result<(), ClientError> {
        self.request(SourceCommand::CloseRawChannel).await
    }

    /// Forward the given frame to the controller
    pub async fn raw_write(&self, frame: &[u8]) -> Result<(), ClientError> {
        let frame = frame.to_vec();
        self.request(|tx| SourceCommand::RawWrite(frame, tx)).await
    }

    /// Answer the given request frame. Returns the response frame and the
    /// length it announces.
    pub async fn raw_read(
        &self,
        request: [u8; P3_PACKET_SIZE],
    ) -> Result<([u8; P3_PACKET_SIZE], usize), ClientError> {
        let request = Box::new(request);
        let (frame, length) = self
            .request(|tx| SourceCommand::RawRead(request, tx))
            .await?;
        Ok((*frame, length))
    }

    /// Stop the source device.
    pub async fn stop(&self) -> Result<(), ClientError> {
        self.tx.send(SourceCommand::Stop).await?;
        Ok(())
    }
}
