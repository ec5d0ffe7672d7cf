use std::{
    collections::VecDeque,
    error::Error,
    sync::{Arc, Mutex},
};

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::drivers::penmount::{
    transport::{ReadMode, SyncPattern, Transport, SYNC_RETRIES},
    Error as DriverError,
};

#[derive(Debug, Default)]
struct BusState {
    writes: Vec<Vec<u8>>,
    reads: VecDeque<Vec<u8>>,
    read_count: usize,
    fail_writes: bool,
}

/// Bus that answers reads from a queue of canned responses and records every
/// write. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBus {
    state: Arc<Mutex<BusState>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes returned by the next read
    pub fn push_read(&self, bytes: &[u8]) {
        self.state.lock().unwrap().reads.push_back(bytes.to_vec());
    }

    /// Queue one single-byte read per byte
    pub fn push_bytes(&self, bytes: &[u8]) {
        for byte in bytes {
            self.push_read(&[*byte]);
        }
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().read_count
    }

    pub fn pending_reads(&self) -> usize {
        self.state.lock().unwrap().reads.len()
    }
}

impl ErrorType for ScriptedBus {
    type Error = ErrorKind;
}

impl I2c for ScriptedBus {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    if state.fail_writes {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
                    }
                    state.writes.push(bytes.to_vec());
                }
                Operation::Read(buf) => {
                    state.read_count += 1;
                    let Some(bytes) = state.reads.pop_front() else {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    };
                    let len = bytes.len().min(buf.len());
                    buf[..len].copy_from_slice(&bytes[..len]);
                }
            }
        }
        Ok(())
    }
}

#[test]
fn test_bulk_read() -> Result<(), Box<dyn Error>> {
    let bus = ScriptedBus::new();
    bus.push_read(&[0x70, 0x10, 0x00, 0x20, 0x00, 0x5f]);
    let mut transport = Transport::new(bus.clone(), 0x38);

    let mut buf = [0xFFu8; 6];
    transport.read(&mut buf, SyncPattern::Status)?;

    assert_eq!(buf, [0x70, 0x10, 0x00, 0x20, 0x00, 0x5f]);
    assert_eq!(bus.read_count(), 1);

    Ok(())
}

#[test]
fn test_bulk_read_zeroes_buffer() -> Result<(), Box<dyn Error>> {
    let bus = ScriptedBus::new();
    bus.push_read(&[0x03, 0x00]);
    let mut transport = Transport::new(bus, 0x38);

    let mut buf = [0xFFu8; 8];
    transport.read(&mut buf, SyncPattern::Status)?;

    assert_eq!(buf, [0x03, 0x00, 0, 0, 0, 0, 0, 0]);

    Ok(())
}

#[test]
fn test_iterated_read_skips_until_sync() -> Result<(), Box<dyn Error>> {
    let bus = ScriptedBus::new();
    bus.push_bytes(&[0x00, 0xFF, 0x41, 0x10, 0x00, 0x20, 0x00, 0x8e]);
    let mut transport = Transport::new(bus.clone(), 0x38);
    transport.set_mode(ReadMode::Iterated);

    let mut buf = [0u8; 6];
    transport.read(&mut buf, SyncPattern::Status)?;

    assert_eq!(buf, [0x41, 0x10, 0x00, 0x20, 0x00, 0x8e]);
    assert_eq!(bus.read_count(), 8);

    Ok(())
}

#[test]
fn test_iterated_read_explicit_sync() -> Result<(), Box<dyn Error>> {
    let bus = ScriptedBus::new();
    // 0x70 carries a touch status but is not the requested sync byte
    bus.push_bytes(&[0x70, 0xEE, 0x00, 0x00, 0x00, 0x00, 0x11]);
    let mut transport = Transport::new(bus, 0x38);
    transport.set_mode(ReadMode::Iterated);

    let mut buf = [0u8; 6];
    transport.read(&mut buf, SyncPattern::Byte(0xEE))?;

    assert_eq!(buf, [0xEE, 0x00, 0x00, 0x00, 0x00, 0x11]);

    Ok(())
}

#[test]
fn test_iterated_read_sync_timeout() {
    let bus = ScriptedBus::new();
    bus.push_bytes(&[0x00; SYNC_RETRIES]);
    bus.push_bytes(&[0x70, 0x00, 0x00, 0x00, 0x00, 0x8f]);
    let mut transport = Transport::new(bus.clone(), 0x38);
    transport.set_mode(ReadMode::Iterated);

    let mut buf = [0u8; 6];
    let result = transport.read(&mut buf, SyncPattern::Status);

    assert!(matches!(result, Err(DriverError::SyncTimeout)));
    assert_eq!(bus.read_count(), SYNC_RETRIES);
    assert_eq!(buf, [0u8; 6]);
}

#[test]
fn test_bus_error_surfaces() {
    let bus = ScriptedBus::new();
    let mut transport = Transport::new(bus.clone(), 0x38);

    let mut buf = [0u8; 6];
    let result = transport.read(&mut buf, SyncPattern::Status);
    assert!(matches!(
        result,
        Err(DriverError::Bus(ErrorKind::NoAcknowledge(
            NoAcknowledgeSource::Data
        )))
    ));

    bus.fail_writes();
    let result = transport.write(&[0x00]);
    assert!(matches!(result, Err(DriverError::Bus(_))));
}
