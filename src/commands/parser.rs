//! Command parser for COBS-decoded frames
//!
//! Parses binary protocol frames into Command structs.

use crate::commands::types::{Command, CommandId, ResponseStatus};
use crate::config::protocol::{MAX_SEND_PAYLOAD, PROTOCOL_VERSION};
use crate::transport::traits::Priority;
use crc::{Crc, CRC_16_XMODEM};
use heapless::Vec;

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Parser for binary protocol commands
pub struct CommandParser;

impl CommandParser {
    /// Create a new command parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a COBS-decoded frame into a command
    ///
    /// Frame format: [version: u8][cmd_id: u8][length: u16 LE][payload][crc16: u16 LE]
    /// Minimum frame size: 1 (ver) + 1 (cmd) + 2 (length) + 0 (payload) + 2 (crc) = 6 bytes
    pub fn parse(&self, data: &[u8]) -> Result<Command, ResponseStatus> {
        if data.len() < 6 {
            return Err(ResponseStatus::InvalidLength);
        }

        let version = data[0];
        let command_id_byte = data[1];
        let length = u16::from_le_bytes([data[2], data[3]]) as usize;

        if version != PROTOCOL_VERSION {
            return Err(ResponseStatus::InvalidVersion);
        }

        // Check if we have enough bytes for payload + CRC
        let expected_len = 4 + length + 2;
        if data.len() < expected_len {
            return Err(ResponseStatus::InvalidLength);
        }

        let payload = &data[4..4 + length];
        let received_crc = u16::from_le_bytes([data[4 + length], data[5 + length]]);

        // Verify CRC over version + command_id + length + payload
        let calculated_crc = Self::calculate_crc(&data[..4 + length]);
        if calculated_crc != received_crc {
            return Err(ResponseStatus::CrcError);
        }

        let command_id = CommandId::from_byte(command_id_byte).ok_or(ResponseStatus::InvalidCommand)?;
        match command_id {
            CommandId::GetVersion => Self::expect_empty(payload, Command::GetVersion),
            CommandId::GetStatus => Self::expect_empty(payload, Command::GetStatus),
            CommandId::ResetDailyUsage => Self::expect_empty(payload, Command::ResetDailyUsage),
            CommandId::ScanNetworks => Self::expect_empty(payload, Command::ScanNetworks),
            CommandId::SendData => {
                // Priority byte plus at least one data byte
                if length < 2 || length > MAX_SEND_PAYLOAD + 1 {
                    return Err(ResponseStatus::InvalidLength);
                }
                let priority =
                    Priority::from_byte(payload[0]).ok_or(ResponseStatus::InvalidParameter)?;
                let mut data_vec = Vec::new();
                data_vec
                    .extend_from_slice(&payload[1..])
                    .map_err(|_| ResponseStatus::InvalidLength)?;
                Ok(Command::SendData {
                    priority,
                    data: data_vec,
                })
            }
            CommandId::SetBattery => match payload {
                [percent] if *percent <= 100 => Ok(Command::SetBattery { percent: *percent }),
                [_] => Err(ResponseStatus::InvalidParameter),
                _ => Err(ResponseStatus::InvalidLength),
            },
            CommandId::SetEmergency => match payload {
                [0] => Ok(Command::SetEmergency { on: false }),
                [1] => Ok(Command::SetEmergency { on: true }),
                [_] => Err(ResponseStatus::InvalidParameter),
                _ => Err(ResponseStatus::InvalidLength),
            },
            CommandId::SetTime => {
                let bytes: [u8; 8] = payload
                    .try_into()
                    .map_err(|_| ResponseStatus::InvalidLength)?;
                Ok(Command::SetTime {
                    unix_secs: u64::from_le_bytes(bytes),
                })
            }
        }
    }

    fn expect_empty(payload: &[u8], command: Command) -> Result<Command, ResponseStatus> {
        if payload.is_empty() {
            Ok(command)
        } else {
            Err(ResponseStatus::InvalidLength)
        }
    }

    /// Calculate CRC-16-XMODEM
    fn calculate_crc(data: &[u8]) -> u16 {
        CRC.checksum(data)
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate CRC-16-XMODEM for external use (e.g., building test frames)
pub fn calculate_crc(data: &[u8]) -> u16 {
    CommandParser::calculate_crc(data)
}
