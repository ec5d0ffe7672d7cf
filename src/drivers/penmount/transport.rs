use embedded_hal::i2c::{I2c, SevenBitAddress};

use super::{hid_report::is_p2_status, Error};

/// Number of single-byte reads attempted while waiting for the first byte of
/// a packet in iterated mode.
pub const SYNC_RETRIES: usize = 10;

/// How packets are read from the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// One transfer for the whole packet
    #[default]
    Bulk,
    /// One transfer per byte, for adapters that cannot do proper block reads
    Iterated,
}

/// Describes what the first byte of an iterated read must look like before
/// the rest of the packet is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPattern {
    /// The first byte must be exactly this value
    Byte(u8),
    /// The first byte must carry a P2 touch or release status
    Status,
}

impl SyncPattern {
    pub fn matches(&self, byte: u8) -> bool {
        match self {
            SyncPattern::Byte(sync) => byte == *sync,
            SyncPattern::Status => is_p2_status(byte),
        }
    }
}

/// Reads and writes raw packets to a controller at a fixed bus address. Every
/// call blocks for the duration of the bus transaction.
#[derive(Debug)]
pub struct Transport<I> {
    i2c: I,
    address: SevenBitAddress,
    mode: ReadMode,
}

impl<I: I2c> Transport<I> {
    pub fn new(i2c: I, address: SevenBitAddress) -> Self {
        Self {
            i2c,
            address,
            mode: ReadMode::default(),
        }
    }

    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub(super) fn set_mode(&mut self, mode: ReadMode) {
        log::debug!("Using {mode:?} read mode");
        self.mode = mode;
    }

    /// Write the given bytes to the device
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        log::trace!("Write: {bytes:02x?}");
        self.i2c.write(self.address, bytes).map_err(bus_error)
    }

    /// Read exactly `buf.len()` bytes from the device. The buffer is zeroed
    /// before reading, so a short iterated read never leaves stale data.
    pub fn read(&mut self, buf: &mut [u8], sync: SyncPattern) -> Result<(), Error> {
        buf.fill(0);
        match self.mode {
            ReadMode::Bulk => self.read_bytes(buf)?,
            ReadMode::Iterated => self.read_iterated(buf, sync)?,
        }
        log::trace!("Read: {buf:02x?}");

        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.i2c.read(self.address, buf).map_err(bus_error)
    }

    fn read_iterated(&mut self, buf: &mut [u8], sync: SyncPattern) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }

        let mut synced = false;
        for _ in 0..SYNC_RETRIES {
            self.read_bytes(&mut buf[..1])?;
            if sync.matches(buf[0]) {
                synced = true;
                break;
            }
        }
        if !synced {
            return Err(Error::SyncTimeout);
        }

        for i in 1..buf.len() {
            self.read_bytes(&mut buf[i..=i])?;
        }

        Ok(())
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(e: E) -> Error {
    log::trace!("Bus error: {e:?}");
    Error::Bus(e.kind())
}
