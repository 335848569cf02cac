//! WiFi pass-through transport
//!
//! The station itself (association, TCP/HTTP upload) is owned by the
//! platform; this driver only adapts it to the [`Transport`] contract.

use crate::config::wifi::{WAKE_POLL_MS, WAKE_TIMEOUT_MS};
use crate::time::Timebase;
use crate::transport::traits::{PowerClass, Transport, TransportError, TransportKind};
use core::future::Future;

/// Platform WiFi station
pub trait WifiLink {
    /// Associated and holding an IP address
    fn is_connected(&mut self) -> impl Future<Output = bool>;

    /// RSSI of the current association in dBm
    fn rssi_dbm(&mut self) -> impl Future<Output = Option<i16>>;

    /// Deliver one payload to the collector
    fn upload(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), TransportError>>;

    fn set_power_save(&mut self, enabled: bool) -> impl Future<Output = Result<(), TransportError>>;
}

/// Map dBm to percent: -100 dBm and below is 0, -50 dBm and above is 100
pub fn rssi_to_percent(rssi_dbm: i16) -> u8 {
    (2 * (rssi_dbm as i32 + 100)).clamp(0, 100) as u8
}

/// WiFi transport
pub struct WifiTransport<L, T> {
    link: L,
    timebase: T,
}

impl<L: WifiLink, T: Timebase> WifiTransport<L, T> {
    pub fn new(link: L, timebase: T) -> Self {
        Self { link, timebase }
    }
}

impl<L: WifiLink, T: Timebase> Transport for WifiTransport<L, T> {
    fn kind(&self) -> TransportKind {
        TransportKind::Wifi
    }

    fn power_class(&self) -> PowerClass {
        PowerClass::High
    }

    fn estimated_cost(&self, _payload_len: usize) -> f32 {
        0.0
    }

    async fn check_availability(&mut self) -> bool {
        self.link.is_connected().await
    }

    async fn signal_quality(&mut self) -> Option<u8> {
        self.link.rssi_dbm().await.map(rssi_to_percent)
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.is_empty() {
            return Err(TransportError::EmptyPayload);
        }
        self.link.upload(payload).await
    }

    async fn sleep(&mut self) -> Result<(), TransportError> {
        self.link.set_power_save(true).await
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        self.link.set_power_save(false).await?;

        let deadline = self.timebase.now_ms() + WAKE_TIMEOUT_MS as u64;
        while !self.link.is_connected().await {
            if self.timebase.now_ms() >= deadline {
                return Err(TransportError::Timeout);
            }
            self.timebase.delay_ms(WAKE_POLL_MS).await;
        }
        Ok(())
    }
}
