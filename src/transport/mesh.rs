//! LoRa mesh transport
//!
//! Payloads larger than one LoRa frame are split into fragments, each
//! prefixed with `[msg_id u16 LE][index u8][count u8]`. The gateway drops a
//! message whose fragments do not all arrive, so a failed send leaves
//! nothing half-delivered upstream.

use crate::config::mesh::{
    BEACON_FRESH_MS, BEACON_LISTEN_MS, FRAGMENT_HEADER, MAX_FRAGMENTS, MAX_LORA_PAYLOAD,
};
use crate::lora::traits::{LoraConfig, LoraError, LoraRadio};
use crate::time::Timebase;
use crate::transport::traits::{PowerClass, Transport, TransportError, TransportKind};
use heapless::Vec;

/// Data bytes carried by one fragment
pub const FRAGMENT_DATA: usize = MAX_LORA_PAYLOAD - FRAGMENT_HEADER;

/// Largest payload the mesh can carry in one message
pub const MAX_MESSAGE: usize = FRAGMENT_DATA * MAX_FRAGMENTS;

impl From<LoraError> for TransportError {
    fn from(error: LoraError) -> Self {
        match error {
            LoraError::Timeout => TransportError::Timeout,
            LoraError::NotInitialised | LoraError::InvalidConfig => TransportError::NotInitialised,
            LoraError::CrcError | LoraError::TransmitFailed | LoraError::BusError => {
                TransportError::LinkError
            }
        }
    }
}

/// Fragment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub msg_id: u16,
    pub index: u8,
    pub count: u8,
}

impl FragmentHeader {
    pub fn to_bytes(self) -> [u8; FRAGMENT_HEADER] {
        let id = self.msg_id.to_le_bytes();
        [id[0], id[1], self.index, self.count]
    }

    pub fn parse(frame: &[u8]) -> Option<(Self, &[u8])> {
        if frame.len() < FRAGMENT_HEADER {
            return None;
        }
        let header = Self {
            msg_id: u16::from_le_bytes([frame[0], frame[1]]),
            index: frame[2],
            count: frame[3],
        };
        Some((header, &frame[FRAGMENT_HEADER..]))
    }
}

/// Map LoRa RSSI (-120 dBm floor, -30 dBm ceiling) to percent
pub fn lora_rssi_to_percent(rssi_dbm: i16) -> u8 {
    ((rssi_dbm as i32 + 120) * 100 / 90).clamp(0, 100) as u8
}

/// LoRa mesh transport
pub struct LoraMeshTransport<R, T> {
    radio: R,
    timebase: T,
    config: LoraConfig,
    initialised: bool,
    next_msg_id: u16,
    last_rssi: Option<i16>,
    last_heard_ms: Option<u64>,
}

impl<R: LoraRadio, T: Timebase> LoraMeshTransport<R, T> {
    pub fn new(radio: R, timebase: T, config: LoraConfig) -> Self {
        Self {
            radio,
            timebase,
            config,
            initialised: false,
            next_msg_id: 0,
            last_rssi: None,
            last_heard_ms: None,
        }
    }

    /// Initialise and configure the radio on first use
    async fn ensure_init(&mut self) -> Result<(), TransportError> {
        if self.initialised {
            return Ok(());
        }

        self.radio.init().await.map_err(|e| {
            log::warn!("mesh: radio init failed ({:?})", e);
            TransportError::NotInitialised
        })?;
        self.radio.configure(&self.config).await?;
        self.initialised = true;
        Ok(())
    }

    fn gateway_recently_heard(&self) -> bool {
        self.last_heard_ms
            .is_some_and(|at| self.timebase.now_ms().saturating_sub(at) < BEACON_FRESH_MS)
    }
}

impl<R: LoraRadio, T: Timebase> Transport for LoraMeshTransport<R, T> {
    fn kind(&self) -> TransportKind {
        TransportKind::LocalMesh
    }

    fn power_class(&self) -> PowerClass {
        PowerClass::Low
    }

    fn estimated_cost(&self, _payload_len: usize) -> f32 {
        0.0
    }

    async fn check_availability(&mut self) -> bool {
        if self.ensure_init().await.is_err() {
            return false;
        }
        if self.gateway_recently_heard() {
            return true;
        }

        match self.radio.receive(BEACON_LISTEN_MS).await {
            Ok(packet) => {
                self.last_rssi = Some(packet.rssi);
                self.last_heard_ms = Some(self.timebase.now_ms());
                true
            }
            Err(_) => false,
        }
    }

    async fn signal_quality(&mut self) -> Option<u8> {
        self.last_rssi.map(lora_rssi_to_percent)
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.is_empty() {
            return Err(TransportError::EmptyPayload);
        }
        if payload.len() > MAX_MESSAGE {
            return Err(TransportError::PayloadTooLarge);
        }
        self.ensure_init().await?;

        let msg_id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        let count = payload.len().div_ceil(FRAGMENT_DATA) as u8;

        for (index, chunk) in payload.chunks(FRAGMENT_DATA).enumerate() {
            let header = FragmentHeader {
                msg_id,
                index: index as u8,
                count,
            };

            let mut frame: Vec<u8, MAX_LORA_PAYLOAD> = Vec::new();
            // header + chunk is at most MAX_LORA_PAYLOAD by construction
            let _ = frame.extend_from_slice(&header.to_bytes());
            let _ = frame.extend_from_slice(chunk);

            if let Err(e) = self.radio.transmit(&frame).await {
                log::warn!(
                    "mesh: fragment {}/{} of msg {} failed ({:?})",
                    index + 1,
                    count,
                    msg_id,
                    e
                );
                return Err(e.into());
            }
        }

        log::debug!("mesh: msg {} sent in {} fragments", msg_id, count);
        Ok(())
    }

    async fn sleep(&mut self) -> Result<(), TransportError> {
        if !self.initialised {
            return Ok(());
        }
        self.radio.set_standby().await.map_err(TransportError::from)
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        self.ensure_init().await
    }
}
