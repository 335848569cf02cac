//! Protocol definitions matching the firmware.

#![allow(dead_code)]

use crc::{Crc, CRC_16_XMODEM};

/// Protocol version (must match firmware)
pub const PROTOCOL_VERSION: u8 = 1;

/// Command IDs matching the firmware protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    GetVersion = 0x01,
    SendData = 0x10,
    GetStatus = 0x20,
    ResetDailyUsage = 0x21,
    SetBattery = 0x22,
    SetEmergency = 0x23,
    ScanNetworks = 0x24,
    SetTime = 0x25,
}

/// Message priority byte for SendData.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Priority {
    Low = 0x00,
    Normal = 0x01,
    High = 0x02,
    Emergency = 0x03,
}

/// Response status codes matching the firmware protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    Success = 0x00,
    InvalidCommand = 0x01,
    InvalidLength = 0x02,
    CrcError = 0x03,
    InvalidVersion = 0x04,
    InvalidParameter = 0x05,
    SendFailed = 0x10,
    Timeout = 0x11,
    NoTransport = 0x12,
    QueueFull = 0x13,
    PayloadTooLarge = 0x14,
    SatelliteDisabled = 0x15,
}

impl TryFrom<u8> for ResponseStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ResponseStatus::Success),
            0x01 => Ok(ResponseStatus::InvalidCommand),
            0x02 => Ok(ResponseStatus::InvalidLength),
            0x03 => Ok(ResponseStatus::CrcError),
            0x04 => Ok(ResponseStatus::InvalidVersion),
            0x05 => Ok(ResponseStatus::InvalidParameter),
            0x10 => Ok(ResponseStatus::SendFailed),
            0x11 => Ok(ResponseStatus::Timeout),
            0x12 => Ok(ResponseStatus::NoTransport),
            0x13 => Ok(ResponseStatus::QueueFull),
            0x14 => Ok(ResponseStatus::PayloadTooLarge),
            0x15 => Ok(ResponseStatus::SatelliteDisabled),
            _ => Err(value),
        }
    }
}

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Build a command frame (without COBS encoding).
/// Format: [version: u8][cmd_id: u8][length: u16 LE][payload][crc16: u16 LE]
pub fn build_command_payload(cmd_id: u8, payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u16;
    let mut data = Vec::with_capacity(6 + payload.len());

    data.push(PROTOCOL_VERSION);
    data.push(cmd_id);
    data.extend_from_slice(&length.to_le_bytes());
    data.extend_from_slice(payload);

    let checksum = CRC.checksum(&data);
    data.extend_from_slice(&checksum.to_le_bytes());

    data
}

/// COBS encode (corncobs includes zero delimiter).
pub fn cobs_encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = vec![0u8; corncobs::max_encoded_len(data.len())];
    let len = corncobs::encode_buf(data, &mut encoded);
    encoded.truncate(len);
    encoded
}

/// Build a complete COBS-encoded command frame.
pub fn build_command(cmd_id: CommandId, payload: &[u8]) -> Vec<u8> {
    let raw = build_command_payload(cmd_id as u8, payload);
    cobs_encode(&raw)
}

/// Response IDs matching the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseId {
    Version = 0x01,
    Ack = 0x02,
    Delivered = 0x10,
    Deferred = 0x12,
    Status = 0x20,
    Networks = 0x24,
    Error = 0xFF,
}

impl TryFrom<u8> for ResponseId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(ResponseId::Version),
            0x02 => Ok(ResponseId::Ack),
            0x10 => Ok(ResponseId::Delivered),
            0x12 => Ok(ResponseId::Deferred),
            0x20 => Ok(ResponseId::Status),
            0x24 => Ok(ResponseId::Networks),
            0xFF => Ok(ResponseId::Error),
            _ => Err(value),
        }
    }
}

/// Parsed response from the device.
#[derive(Debug)]
pub struct Response {
    pub version: u8,
    pub resp_id: ResponseId,
    pub payload: Vec<u8>,
}

impl Response {
    /// Status byte of an Error response.
    pub fn error_status(&self) -> Option<ResponseStatus> {
        if self.resp_id != ResponseId::Error {
            return None;
        }
        self.payload
            .first()
            .and_then(|&b| ResponseStatus::try_from(b).ok())
    }
}

/// Decoded Status payload.
/// Layout: [flags][battery][sent_today u32][cost f32][pending][last][delivered u32][deferred u32][failed u32]
#[derive(Debug)]
pub struct StatusReport {
    pub satellite_fitted: bool,
    pub low_power: bool,
    pub emergency_mode: bool,
    pub battery: Option<u8>,
    pub messages_sent_today: u32,
    pub today_cost: f32,
    pub pending: u8,
    pub last_selected: u8,
    pub delivered: u32,
    pub deferred: u32,
    pub failed: u32,
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl StatusReport {
    pub const LEN: usize = 24;

    pub fn parse(payload: &[u8]) -> anyhow::Result<Self> {
        if payload.len() != Self::LEN {
            anyhow::bail!("Status payload is {} bytes, expected {}", payload.len(), Self::LEN);
        }
        let flags = payload[0];
        Ok(Self {
            satellite_fitted: flags & 0b001 != 0,
            low_power: flags & 0b010 != 0,
            emergency_mode: flags & 0b100 != 0,
            battery: (payload[1] != 0xFF).then_some(payload[1]),
            messages_sent_today: le_u32(&payload[2..6]),
            today_cost: f32::from_le_bytes([payload[6], payload[7], payload[8], payload[9]]),
            pending: payload[10],
            last_selected: payload[11],
            delivered: le_u32(&payload[12..16]),
            deferred: le_u32(&payload[16..20]),
            failed: le_u32(&payload[20..24]),
        })
    }
}

/// One network entry from a Networks response.
/// Layout: [kind][available][signal | 0xFF][power_class][cost f32]
#[derive(Debug)]
pub struct NetworkEntry {
    pub kind: u8,
    pub available: bool,
    pub signal: Option<u8>,
    pub power_class: u8,
    pub cost: f32,
}

pub const NETWORK_ENTRY_LEN: usize = 8;

pub fn parse_networks(payload: &[u8]) -> anyhow::Result<Vec<NetworkEntry>> {
    if payload.len() % NETWORK_ENTRY_LEN != 0 {
        anyhow::bail!("Networks payload length {} is not a multiple of {}", payload.len(), NETWORK_ENTRY_LEN);
    }
    Ok(payload
        .chunks(NETWORK_ENTRY_LEN)
        .map(|e| NetworkEntry {
            kind: e[0],
            available: e[1] != 0,
            signal: (e[2] != 0xFF).then_some(e[2]),
            power_class: e[3],
            cost: f32::from_le_bytes([e[4], e[5], e[6], e[7]]),
        })
        .collect())
}

/// Parse a COBS-decoded response.
/// Format: [version: u8][resp_id: u8][length: u16 LE][payload][crc: u16 LE]
pub fn parse_response(data: &[u8]) -> anyhow::Result<Response> {
    if data.len() < 6 {
        anyhow::bail!("Response too short: {} bytes", data.len());
    }

    let version = data[0];
    let resp_id_byte = data[1];
    let length = u16::from_le_bytes([data[2], data[3]]) as usize;

    if data.len() < 4 + length + 2 {
        anyhow::bail!(
            "Response payload incomplete: expected {}, got {}",
            4 + length + 2,
            data.len()
        );
    }

    let payload = data[4..4 + length].to_vec();
    let received_crc = u16::from_le_bytes([data[4 + length], data[4 + length + 1]]);

    let calculated_crc = CRC.checksum(&data[..4 + length]);
    if calculated_crc != received_crc {
        anyhow::bail!(
            "CRC mismatch: expected {:04x}, got {:04x}",
            calculated_crc,
            received_crc
        );
    }

    if version != PROTOCOL_VERSION {
        anyhow::bail!(
            "Protocol version mismatch: expected {}, got {}",
            PROTOCOL_VERSION,
            version
        );
    }

    let resp_id = ResponseId::try_from(resp_id_byte)
        .map_err(|v| anyhow::anyhow!("Unknown response ID: {:#04x}", v))?;

    Ok(Response {
        version,
        resp_id,
        payload,
    })
}

/// COBS decode a frame (with the zero delimiter).
pub fn cobs_decode(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut decoded = vec![0u8; data.len()];
    let len = corncobs::decode_buf(data, &mut decoded)
        .map_err(|e| anyhow::anyhow!("COBS decode error: {:?}", e))?;
    decoded.truncate(len);
    Ok(decoded)
}
