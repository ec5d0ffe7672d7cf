//! P3 control command framing and the power-mode protocol constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{hid_report::P3_PACKET_SIZE, Error};

pub const CMD_SET_POWER_MODE: u8 = 0x85;
pub const CMD_GET_POWER_MODE: u8 = 0x86;
/// Command byte of a raw-channel identification request
pub const CMD_IDENTIFY: u8 = 0xA2;

/// Offset of the command byte in a command frame
pub const CMD_INDEX: usize = 6;
/// Offset of the CRC low byte in a command frame
pub const CRC_INDEX: usize = 7;
/// Offset of the two acknowledgement bytes in a response
pub const ACK_INDEX: usize = 4;
/// Offset of the power mode in a get power mode response
pub const MODE_INDEX: usize = 10;

pub const ACK: [u8; 2] = [0xEF, 0xBE];
pub const NACK: [u8; 2] = [0xAD, 0xDE];

pub const SET_RESPONSE_SIZE: usize = P3_PACKET_SIZE;
pub const GET_RESPONSE_SIZE: usize = 14;

const CRC16_TABLE: [u16; 256] = crc16_table();

// CRC-16/CCITT, polynomial 0x1021
const fn crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the command CRC over the command byte followed by the payload
pub fn crc16(command: u8, payload: &[u8]) -> u16 {
    let step = |crc: u16, byte: u8| (crc << 8) ^ CRC16_TABLE[((crc >> 8) as u8 ^ byte) as usize];
    payload.iter().fold(step(0, command), |crc, byte| step(crc, *byte))
}

/// Power modes of a P3 controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    /// The firmware decides when to idle
    FirmwareControl = 0x50,
    Active = 0x51,
    Sleep = 0x52,
}

impl TryFrom<u8> for PowerMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x50 => Ok(PowerMode::FirmwareControl),
            0x51 => Ok(PowerMode::Active),
            0x52 => Ok(PowerMode::Sleep),
            _ => Err(Error::UnknownPowerMode(value)),
        }
    }
}

/// Build the frame that switches the controller into the given mode
pub fn set_power_mode_frame(mode: PowerMode) -> [u8; 10] {
    let mut frame = [
        0x04,
        0x00,
        0x08,
        0x00,
        0x09,
        0x00,
        CMD_SET_POWER_MODE,
        0x00,
        mode as u8,
        0x09,
    ];
    frame[CRC_INDEX] = (crc16(CMD_SET_POWER_MODE, &frame[8..=9]) & 0xFF) as u8;
    frame
}

/// Build the frame that queries the current power mode
pub fn get_power_mode_frame() -> [u8; 14] {
    let mut frame = [
        0x04,
        0x00,
        0x0c,
        0x00,
        0x09,
        0x00,
        CMD_GET_POWER_MODE,
        0x00,
        0x00,
        0x00,
        0x00,
        0x50,
        0x34,
        0x00,
    ];
    frame[CRC_INDEX] = (crc16(CMD_GET_POWER_MODE, &frame[8..=13]) & 0xFF) as u8;
    frame
}

/// Check the acknowledgement bytes of a command response
pub fn check_ack(response: &[u8]) -> Result<(), Error> {
    let ack = [response[ACK_INDEX], response[ACK_INDEX + 1]];
    match ack {
        ACK => Ok(()),
        NACK => Err(Error::CommandRejected),
        other => Err(Error::UnknownAck(other)),
    }
}

/// Parse a get power mode response
pub fn parse_power_mode(response: &[u8; GET_RESPONSE_SIZE]) -> Result<PowerMode, Error> {
    check_ack(response)?;
    PowerMode::try_from(response[MODE_INDEX])
}

/// Fill in the reply to a raw-channel identification request and return its
/// length.
pub fn identification_reply(frame: &mut [u8; P3_PACKET_SIZE]) -> usize {
    frame[0] = 5;
    frame[1] = 0;
    frame[3..6].copy_from_slice(b"SiS");
    3
}

/// Blocking delays required by the controller firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Delay between writing the detection probe and reading its echo
    pub probe_settle: Duration,
    /// Delay between writing a command and reading its response
    pub command_response: Duration,
    /// Delay after a power mode was accepted
    pub power_settle: Duration,
    /// Delay between power mode retries
    pub power_retry: Duration,
    /// Delay around opening and closing a raw channel session
    pub raw_channel_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            probe_settle: Duration::from_millis(10),
            command_response: Duration::from_secs(3),
            power_settle: Duration::from_millis(100),
            power_retry: Duration::from_millis(50),
            raw_channel_settle: Duration::from_millis(200),
        }
    }
}

impl Timings {
    /// Timings without any delays
    pub fn immediate() -> Self {
        Self {
            probe_settle: Duration::ZERO,
            command_response: Duration::ZERO,
            power_settle: Duration::ZERO,
            power_retry: Duration::ZERO,
            raw_channel_settle: Duration::ZERO,
        }
    }
}
