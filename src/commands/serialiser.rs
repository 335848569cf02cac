//! Response serialiser with COBS encoding
//!
//! Serialises Response structs into COBS-encoded frames for transmission.

use crate::commands::parser::calculate_crc;
use crate::commands::types::{Response, StatusReport};
#[cfg(test)]
use crate::config::protocol::FRAME_DELIMITER;
use crate::config::protocol::{MAX_FRAME_SIZE, PROTOCOL_VERSION};
use crate::transport::traits::TransportInfo;
use heapless::Vec;

/// Response IDs
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum ResponseId {
    Version = 0x01,
    Ack = 0x02,
    Delivered = 0x10,
    Deferred = 0x12,
    Status = 0x20,
    Networks = 0x24,
    Error = 0xFF,
}

/// Unknown signal or battery on the wire
const UNKNOWN: u8 = 0xFF;

/// Bytes per network entry in a Networks response
pub const NETWORK_ENTRY_LEN: usize = 8;
/// Status response payload length
pub const STATUS_LEN: usize = 24;

/// Serialiser for response frames
pub struct ResponseSerialiser;

impl ResponseSerialiser {
    /// Create a new response serialiser
    pub fn new() -> Self {
        Self
    }

    /// Serialise a response to a COBS-encoded frame
    ///
    /// Returns the complete frame including COBS encoding and zero delimiter.
    pub fn serialise(&self, response: &Response) -> Vec<u8, MAX_FRAME_SIZE> {
        let raw = self.build_raw_frame(response);

        // corncobs::encode_buf includes the trailing zero delimiter
        self.cobs_encode(&raw)
    }

    /// Build the raw (unencoded) frame with CRC
    ///
    /// Frame format: [version: u8][resp_id: u8][length: u16 LE][payload][crc16: u16 LE]
    fn build_raw_frame(&self, response: &Response) -> Vec<u8, MAX_FRAME_SIZE> {
        let mut payload: Vec<u8, MAX_FRAME_SIZE> = Vec::new();

        let id = match response {
            Response::Version {
                major,
                minor,
                patch,
            } => {
                let _ = payload.extend_from_slice(&[*major, *minor, *patch]);
                ResponseId::Version
            }
            Response::Ack => ResponseId::Ack,
            Response::Delivered { kind } => {
                let _ = payload.push(*kind as u8);
                ResponseId::Delivered
            }
            Response::Deferred { pending } => {
                let _ = payload.push(*pending);
                ResponseId::Deferred
            }
            Response::Status(report) => {
                write_status(&mut payload, report);
                ResponseId::Status
            }
            Response::Networks(networks) => {
                for info in networks {
                    write_network(&mut payload, info);
                }
                ResponseId::Networks
            }
            Response::Error {
                status,
                original_command_id,
            } => {
                let _ = payload.extend_from_slice(&[*status as u8, *original_command_id]);
                ResponseId::Error
            }
        };

        let mut frame: Vec<u8, MAX_FRAME_SIZE> = Vec::new();
        let _ = frame.push(PROTOCOL_VERSION);
        let _ = frame.push(id as u8);
        let _ = frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        let _ = frame.extend_from_slice(&payload);

        let crc = calculate_crc(&frame);
        let _ = frame.extend_from_slice(&crc.to_le_bytes());

        frame
    }

    /// COBS encode a buffer using corncobs
    fn cobs_encode(&self, data: &[u8]) -> Vec<u8, MAX_FRAME_SIZE> {
        let mut output: Vec<u8, MAX_FRAME_SIZE> = Vec::new();
        output.resize(corncobs::max_encoded_len(data.len()), 0).ok();
        let len = corncobs::encode_buf(data, &mut output);
        output.truncate(len);
        output
    }
}

impl Default for ResponseSerialiser {
    fn default() -> Self {
        Self::new()
    }
}

fn write_status(out: &mut Vec<u8, MAX_FRAME_SIZE>, report: &StatusReport) {
    let flags = report.satellite_fitted as u8
        | (report.low_power as u8) << 1
        | (report.emergency_mode as u8) << 2;

    let _ = out.push(flags);
    let _ = out.push(report.battery.unwrap_or(UNKNOWN));
    let _ = out.extend_from_slice(&report.messages_sent_today.to_le_bytes());
    let _ = out.extend_from_slice(&report.today_cost.to_le_bytes());
    let _ = out.push(report.pending);
    let _ = out.push(report.last_selected as u8);
    let _ = out.extend_from_slice(&report.delivered.to_le_bytes());
    let _ = out.extend_from_slice(&report.deferred.to_le_bytes());
    let _ = out.extend_from_slice(&report.failed.to_le_bytes());
}

fn write_network(out: &mut Vec<u8, MAX_FRAME_SIZE>, info: &TransportInfo) {
    let _ = out.push(info.kind as u8);
    let _ = out.push(info.available as u8);
    let _ = out.push(info.signal_strength.unwrap_or(UNKNOWN));
    let _ = out.push(info.power_class as u8);
    let _ = out.extend_from_slice(&info.estimated_cost.to_le_bytes());
}

/// COBS decode using corncobs (for testing/verification)
#[allow(clippy::result_unit_err)]
pub fn cobs_decode(encoded: &[u8]) -> Result<Vec<u8, MAX_FRAME_SIZE>, ()> {
    let mut output: Vec<u8, MAX_FRAME_SIZE> = Vec::new();
    output.resize(encoded.len(), 0).map_err(|_| ())?;
    let len = corncobs::decode_buf(encoded, &mut output).map_err(|_| ())?;
    output.truncate(len);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::{CommandId, ResponseStatus};
    use crate::transport::traits::{PowerClass, TransportKind};

    fn decode(response: &Response) -> Vec<u8, MAX_FRAME_SIZE> {
        let encoded = ResponseSerialiser::new().serialise(response);
        assert_eq!(encoded[encoded.len() - 1], FRAME_DELIMITER);
        let decoded = cobs_decode(&encoded).expect("Should decode");

        let len = decoded.len();
        let crc = u16::from_le_bytes([decoded[len - 2], decoded[len - 1]]);
        assert_eq!(crc, calculate_crc(&decoded[..len - 2]));
        decoded
    }

    #[test]
    fn test_serialise_version() {
        let decoded = decode(&Response::Version {
            major: 0,
            minor: 1,
            patch: 0,
        });

        // [version][resp_id][length LE][major][minor][patch][crc LE]
        assert_eq!(decoded[0], PROTOCOL_VERSION);
        assert_eq!(decoded[1], ResponseId::Version as u8);
        assert_eq!(&decoded[2..4], &[3, 0]);
        assert_eq!(&decoded[4..7], &[0, 1, 0]);
    }

    #[test]
    fn test_serialise_delivery() {
        let decoded = decode(&Response::Delivered {
            kind: TransportKind::Cellular,
        });
        assert_eq!(decoded[1], ResponseId::Delivered as u8);
        assert_eq!(&decoded[2..5], &[1, 0, TransportKind::Cellular as u8]);

        let decoded = decode(&Response::Deferred { pending: 3 });
        assert_eq!(decoded[1], ResponseId::Deferred as u8);
        assert_eq!(decoded[4], 3);

        let decoded = decode(&Response::Ack);
        assert_eq!(decoded.len(), 6);
    }

    #[test]
    fn test_serialise_status() {
        let report = StatusReport {
            satellite_fitted: true,
            low_power: false,
            emergency_mode: true,
            battery: None,
            messages_sent_today: 7,
            today_cost: 1.05,
            pending: 2,
            last_selected: TransportKind::Satellite,
            delivered: 11,
            deferred: 2,
            failed: 1,
        };
        let decoded = decode(&Response::Status(report));

        assert_eq!(
            u16::from_le_bytes([decoded[2], decoded[3]]) as usize,
            STATUS_LEN
        );
        let p = &decoded[4..4 + STATUS_LEN];
        assert_eq!(p[0], 0b101);
        assert_eq!(p[1], 0xFF);
        assert_eq!(u32::from_le_bytes([p[2], p[3], p[4], p[5]]), 7);
        assert_eq!(f32::from_le_bytes([p[6], p[7], p[8], p[9]]), 1.05);
        assert_eq!(p[10], 2);
        assert_eq!(p[11], TransportKind::Satellite as u8);
        assert_eq!(u32::from_le_bytes([p[20], p[21], p[22], p[23]]), 1);
    }

    #[test]
    fn test_serialise_networks() {
        let mut networks = [
            TransportInfo::absent(TransportKind::Wifi),
            TransportInfo::absent(TransportKind::LocalMesh),
            TransportInfo::absent(TransportKind::Cellular),
            TransportInfo::absent(TransportKind::Satellite),
        ];
        networks[2] = TransportInfo {
            kind: TransportKind::Cellular,
            signal_strength: Some(64),
            estimated_cost: 0.01,
            power_class: PowerClass::Medium,
            available: true,
        };

        let decoded = decode(&Response::Networks(networks));
        let length = u16::from_le_bytes([decoded[2], decoded[3]]) as usize;
        assert_eq!(length, 4 * NETWORK_ENTRY_LEN);

        let cell = &decoded[4 + 2 * NETWORK_ENTRY_LEN..4 + 3 * NETWORK_ENTRY_LEN];
        assert_eq!(&cell[..4], &[0x03, 1, 64, PowerClass::Medium as u8]);
        assert_eq!(f32::from_le_bytes([cell[4], cell[5], cell[6], cell[7]]), 0.01);

        let wifi = &decoded[4..4 + NETWORK_ENTRY_LEN];
        assert_eq!(&wifi[..3], &[0x01, 0, 0xFF]);
    }

    #[test]
    fn test_serialise_error() {
        let decoded = decode(&Response::error(
            ResponseStatus::NoTransport,
            CommandId::SendData,
        ));

        // [version][resp_id][length LE][status][cmd_id][crc LE]
        assert_eq!(decoded[1], ResponseId::Error as u8);
        assert_eq!(decoded[4], ResponseStatus::NoTransport as u8);
        assert_eq!(decoded[5], CommandId::SendData as u8);
    }

    #[test]
    fn test_cobs_roundtrip() {
        let serialiser = ResponseSerialiser::new();

        let data_with_zeros = [0x01, 0x00, 0x02, 0x00, 0x03];
        let encoded = serialiser.cobs_encode(&data_with_zeros);

        assert_eq!(encoded[encoded.len() - 1], 0x00, "Should end with zero");
        for &byte in &encoded[..encoded.len() - 1] {
            assert_ne!(byte, 0, "COBS encoded data should not contain zeros");
        }

        // Decode WITH the delimiter (corncobs expects it)
        let decoded = cobs_decode(&encoded).expect("Should decode");
        assert_eq!(decoded.as_slice(), &data_with_zeros);
    }
}
