//! Command and response types for the host control protocol
//!
//! # Protocol Format
//!
//! All frames use COBS encoding with a zero byte delimiter:
//! ```text
//! [COBS-encoded payload][0x00]
//! ```
//!
//! The payload format (before COBS encoding):
//! ```text
//! [version: u8][cmd_id: u8][length: u16 LE][payload: [u8; length]][crc16: u16 LE]
//! ```
//!
//! - `version`: Protocol version (currently 1)
//! - `cmd_id`: Command or response identifier
//! - `length`: Payload length in bytes (little-endian)
//! - `crc16`: CRC-16-XMODEM checksum over all preceding bytes

use crate::config::protocol::MAX_SEND_PAYLOAD;
use crate::selector::scoring::SLOTS;
use crate::transport::traits::{Priority, TransportInfo, TransportKind};
use heapless::Vec;

/// Command IDs for the binary protocol
///
/// Commands are sent from the host to the device. Each command has a specific
/// payload format and expected response.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    /// Get firmware version (0x01)
    ///
    /// - Payload: None
    /// - Response: [`Response::Version`]
    GetVersion = 0x01,

    /// Deliver data over the best transport (0x10)
    ///
    /// - Payload: `[priority: u8][data: 1-480 bytes]`
    /// - Response: [`Response::Delivered`] or [`Response::Deferred`]
    SendData = 0x10,

    /// Selector and satellite diagnostics (0x20)
    ///
    /// - Payload: None
    /// - Response: [`Response::Status`]
    GetStatus = 0x20,

    /// Clear today's satellite counters (0x21)
    ResetDailyUsage = 0x21,

    /// Report the battery level (0x22)
    ///
    /// - Payload: `[percent: u8]` (0-100)
    SetBattery = 0x22,

    /// Enter or leave satellite emergency mode (0x23)
    ///
    /// - Payload: `[on: u8]` (0 or 1)
    SetEmergency = 0x23,

    /// Probe every transport (0x24)
    ///
    /// - Payload: None
    /// - Response: [`Response::Networks`]
    ScanNetworks = 0x24,

    /// Set wall-clock time for day rollover (0x25)
    ///
    /// - Payload: `[unix_secs: u64 LE]`
    SetTime = 0x25,
}

impl CommandId {
    /// Try to convert a byte to a CommandId
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::GetVersion),
            0x10 => Some(Self::SendData),
            0x20 => Some(Self::GetStatus),
            0x21 => Some(Self::ResetDailyUsage),
            0x22 => Some(Self::SetBattery),
            0x23 => Some(Self::SetEmergency),
            0x24 => Some(Self::ScanNetworks),
            0x25 => Some(Self::SetTime),
            _ => None,
        }
    }
}

/// Parsed command with associated data
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetVersion,
    SendData {
        priority: Priority,
        data: Vec<u8, MAX_SEND_PAYLOAD>,
    },
    GetStatus,
    ResetDailyUsage,
    SetBattery { percent: u8 },
    SetEmergency { on: bool },
    ScanNetworks,
    SetTime { unix_secs: u64 },
}

impl Command {
    /// Get the command ID for this command
    pub fn id(&self) -> CommandId {
        match self {
            Command::GetVersion => CommandId::GetVersion,
            Command::SendData { .. } => CommandId::SendData,
            Command::GetStatus => CommandId::GetStatus,
            Command::ResetDailyUsage => CommandId::ResetDailyUsage,
            Command::SetBattery { .. } => CommandId::SetBattery,
            Command::SetEmergency { .. } => CommandId::SetEmergency,
            Command::ScanNetworks => CommandId::ScanNetworks,
            Command::SetTime { .. } => CommandId::SetTime,
        }
    }
}

/// Response status codes
///
/// Used in [`Response::Error`] to indicate why a command failed.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success = 0x00,

    /// Unknown or invalid command ID (0x01)
    InvalidCommand = 0x01,

    /// Payload length invalid for the command (0x02)
    InvalidLength = 0x02,

    /// CRC-16 checksum mismatch (0x03)
    CrcError = 0x03,

    /// Protocol version not supported (0x04)
    InvalidVersion = 0x04,

    /// Field out of range: unknown priority, battery above 100, flag not 0/1 (0x05)
    InvalidParameter = 0x05,

    /// Transport attempt failed (0x10)
    SendFailed = 0x10,

    /// Operation timed out (0x11)
    Timeout = 0x11,

    /// No transport reported available (0x12)
    NoTransport = 0x12,

    /// Satellite queue full of higher-priority messages (0x13)
    QueueFull = 0x13,

    /// Payload does not fit the satellite module (0x14)
    PayloadTooLarge = 0x14,

    /// Satellite disabled in configuration (0x15)
    SatelliteDisabled = 0x15,
}

/// Status snapshot carried by [`Response::Status`]
///
/// Payload (24 bytes):
/// `[flags][battery][sent_today u32][cost_today f32][pending][last_kind]`
/// `[delivered u32][deferred u32][failed u32]`, all little endian.
/// `flags`: bit 0 satellite fitted, bit 1 low power, bit 2 emergency mode.
/// `battery` is 0xFF when unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub satellite_fitted: bool,
    pub low_power: bool,
    pub emergency_mode: bool,
    pub battery: Option<u8>,
    pub messages_sent_today: u32,
    pub today_cost: f32,
    pub pending: u8,
    pub last_selected: TransportKind,
    pub delivered: u32,
    pub deferred: u32,
    pub failed: u32,
}

/// Response to a command
///
/// # Response IDs
///
/// | ID   | Response  | Description                        |
/// |------|-----------|------------------------------------|
/// | 0x01 | Version   | Firmware version                   |
/// | 0x02 | Ack       | Command applied                    |
/// | 0x10 | Delivered | Sent, `[transport kind]`           |
/// | 0x12 | Deferred  | Stored on satellite, `[pending]`   |
/// | 0x20 | Status    | [`StatusReport`]                   |
/// | 0x24 | Networks  | 4 x `[kind][avail][signal][power][cost f32]` |
/// | 0xFF | Error     | `[status][original cmd]`           |
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Version { major: u8, minor: u8, patch: u8 },
    Ack,
    Delivered { kind: TransportKind },
    Deferred { pending: u8 },
    Status(StatusReport),
    Networks([TransportInfo; SLOTS]),
    Error {
        status: ResponseStatus,
        original_command_id: u8,
    },
}

impl Response {
    /// Create an error response for a given command
    pub fn error(status: ResponseStatus, command_id: CommandId) -> Self {
        Self::Error {
            status,
            original_command_id: command_id as u8,
        }
    }

    /// Create an error response with raw command ID (for unknown commands)
    pub fn error_raw(status: ResponseStatus, original_command_id: u8) -> Self {
        Self::Error {
            status,
            original_command_id,
        }
    }
}
