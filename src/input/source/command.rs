use tokio::sync::oneshot;

use crate::drivers::penmount::{command::PowerMode, hid_report::P3_PACKET_SIZE, Error};

/// Channel used to answer a [SourceCommand]
pub type Reply<T> = oneshot::Sender<Result<T, Error>>;

/// A [SourceCommand] is a message that can be sent to a running source device
/// over a channel.
#[derive(Debug)]
pub enum SourceCommand {
    /// Quiesce acquisition, put the controller to sleep and power it off.
    /// Replies with whether the controller confirmed the sleep mode.
    Suspend(Reply<bool>),
    /// Power the controller on and resume acquisition. Replies with whether
    /// the controller confirmed an active mode.
    Resume(Reply<bool>),
    GetPowerMode(Reply<PowerMode>),
    SetPowerMode(PowerMode, Reply<()>),
    /// Pause acquisition while a client talks to the controller directly
    OpenRawChannel(Reply<()>),
    CloseRawChannel(Reply<()>),
    RawWrite(Vec<u8>, Reply<()>),
    /// Read a raw frame. The request frame is answered with the response
    /// frame and its announced length.
    RawRead(
        Box<[u8; P3_PACKET_SIZE]>,
        Reply<(Box<[u8; P3_PACKET_SIZE]>, usize)>,
    ),
    Stop,
}
