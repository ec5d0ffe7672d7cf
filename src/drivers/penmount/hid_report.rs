use packed_struct::prelude::*;

use super::{Error, MAX_TOUCH};

/// Size of a P2 touch packet
pub const P2_PACKET_SIZE: usize = 6;
/// Size of a P3 frame
pub const P3_PACKET_SIZE: usize = 64;

pub const P2_STATUS_MASK: u8 = 0xF0;
pub const P2_STATUS_TOUCH: u8 = 0x70;
pub const P2_STATUS_RELEASE: u8 = 0x40;
pub const P2_ID_MASK: u8 = 0x0F;

/// Packet written during model detection. P2 controllers echo it back.
pub const P2_PROBE: [u8; P2_PACKET_SIZE] = [0xEE, 0x00, 0x00, 0x00, 0x00, 0x11];
/// First byte of the P2 probe echo
pub const P2_PROBE_SYNC: u8 = 0xEE;

pub const P3_REPORT_ID: u8 = 0x10;
/// Byte count of a frame that carries no touch records
pub const P3_BYTE_COUNT_NO_TOUCH: u16 = 3;
pub const P3_HEADER_SIZE: usize = 3;
pub const P3_RECORD_SIZE: usize = 6;
/// Number of touch records that fit in one frame
pub const P3_MAX_RECORDS: usize = (P3_PACKET_SIZE - P3_HEADER_SIZE) / P3_RECORD_SIZE;
pub const P3_STATUS_TOUCH: u8 = 0x03;
pub const P3_STATUS_RELEASE: u8 = 0x00;

/// A single decoded contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSample {
    pub slot: u8,
    pub touch: bool,
    pub x: u16,
    pub y: u16,
}

/// Returns the P2 checksum for the given bytes: the one's complement of the
/// low byte of their sum.
pub fn p2_checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Returns true if the byte carries a P2 touch or release status
pub fn is_p2_status(byte: u8) -> bool {
    let status = byte & P2_STATUS_MASK;
    status == P2_STATUS_TOUCH || status == P2_STATUS_RELEASE
}

// Touch on contact 0 at (16, 32)
// 70 10 00 20 00 5f
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "6")]
pub struct PackedP2Report {
    /// High nibble is the touch status, low nibble the contact id
    #[packed_field(bytes = "0")]
    pub status: u8,
    #[packed_field(bytes = "1..=2", endian = "lsb")]
    pub x: u16,
    #[packed_field(bytes = "3..=4", endian = "lsb")]
    pub y: u16,
    #[packed_field(bytes = "5")]
    pub checksum: u8,
}

impl PackedP2Report {
    /// Build a report with a valid checksum
    pub fn new(touch_id: u8, touch: bool, x: u16, y: u16) -> Self {
        let state = match touch {
            true => P2_STATUS_TOUCH,
            false => P2_STATUS_RELEASE,
        };
        let mut report = Self {
            status: state | (touch_id & P2_ID_MASK),
            x,
            y,
            checksum: 0,
        };
        report.update_checksum();
        report
    }

    /// Validate and unpack a P2 packet. The checksum is verified before the
    /// status nibble.
    pub fn decode(buf: &[u8; P2_PACKET_SIZE]) -> Result<Self, Error> {
        let expected = p2_checksum(&buf[..5]);
        if buf[5] != expected {
            return Err(Error::Checksum {
                expected,
                actual: buf[5],
            });
        }
        if !is_p2_status(buf[0]) {
            return Err(Error::InvalidStatus(buf[0]));
        }

        Ok(Self::unpack(buf)?)
    }

    pub fn update_checksum(&mut self) {
        let bytes = [
            self.status,
            (self.x & 0xFF) as u8,
            (self.x >> 8) as u8,
            (self.y & 0xFF) as u8,
            (self.y >> 8) as u8,
        ];
        self.checksum = p2_checksum(&bytes);
    }

    pub fn touch_id(&self) -> u8 {
        self.status & P2_ID_MASK
    }

    pub fn is_touching(&self) -> bool {
        self.status & P2_STATUS_MASK == P2_STATUS_TOUCH
    }

    pub fn sample(&self) -> TouchSample {
        TouchSample {
            slot: self.touch_id(),
            touch: self.is_touching(),
            x: self.x,
            y: self.y,
        }
    }
}

// 0e 00 10 03 00 d2 04 2e 16 ...
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "3")]
pub struct PackedP3Header {
    #[packed_field(bytes = "0..=1", endian = "lsb")]
    pub byte_count: u16,
    #[packed_field(bytes = "2")]
    pub report_id: u8,
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "6")]
pub struct PackedP3TouchRecord {
    #[packed_field(bytes = "0")]
    pub status: u8,
    #[packed_field(bytes = "1")]
    pub slot_id: u8,
    #[packed_field(bytes = "2..=3", endian = "lsb")]
    pub x: u16,
    #[packed_field(bytes = "4..=5", endian = "lsb")]
    pub y: u16,
}

impl PackedP3TouchRecord {
    pub fn sample(&self) -> Result<TouchSample, Error> {
        let touch = match self.status {
            P3_STATUS_TOUCH => true,
            P3_STATUS_RELEASE => false,
            status => return Err(Error::InvalidTouchStatus(status)),
        };
        if self.slot_id as usize >= MAX_TOUCH {
            return Err(Error::InvalidSlotId(self.slot_id));
        }

        Ok(TouchSample {
            slot: self.slot_id,
            touch,
            x: self.x,
            y: self.y,
        })
    }
}

/// Decode all touch records in a P3 frame. Any invalid record discards the
/// whole frame.
pub fn decode_p3(frame: &[u8; P3_PACKET_SIZE]) -> Result<Vec<TouchSample>, Error> {
    let mut raw = [0u8; P3_HEADER_SIZE];
    raw.copy_from_slice(&frame[..P3_HEADER_SIZE]);
    let header = PackedP3Header::unpack(&raw)?;

    let byte_count = header.byte_count;
    if byte_count == P3_BYTE_COUNT_NO_TOUCH {
        return Ok(Vec::new());
    }
    if byte_count < P3_BYTE_COUNT_NO_TOUCH || byte_count as usize > P3_PACKET_SIZE {
        return Err(Error::InvalidByteCount(byte_count));
    }
    if header.report_id != P3_REPORT_ID {
        return Err(Error::InvalidReportId(header.report_id));
    }

    // The contact count is the last byte of the declared region
    let declared = frame[byte_count as usize - 1] as usize;
    let count = declared.min(MAX_TOUCH).min(P3_MAX_RECORDS);
    if count != declared {
        log::debug!("Clamping contact count {declared} to {count}");
    }

    let mut samples = Vec::with_capacity(count);
    for i in 0..count {
        let offset = P3_HEADER_SIZE + i * P3_RECORD_SIZE;
        let mut raw = [0u8; P3_RECORD_SIZE];
        raw.copy_from_slice(&frame[offset..offset + P3_RECORD_SIZE]);
        let record = PackedP3TouchRecord::unpack(&raw)?;
        samples.push(record.sample()?);
    }

    Ok(samples)
}
