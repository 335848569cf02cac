//! LoRa radio trait for abstraction and testability
//!
//! This trait defines the interface the mesh transport needs from a LoRa
//! radio, allowing the hardware driver to be swapped with a mock for testing.

use crate::config::mesh::MAX_LORA_PAYLOAD;
use core::future::Future;
use heapless::Vec;

/// Errors that can occur during LoRa operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoraError {
    /// Operation timed out
    Timeout,
    /// CRC error in received packet
    CrcError,
    /// Transmission failed
    TransmitFailed,
    /// Invalid configuration
    InvalidConfig,
    /// Bus communication error
    BusError,
    /// Radio not initialised
    NotInitialised,
}

/// Configuration for LoRa modulation
#[derive(Debug, Clone, PartialEq)]
pub struct LoraConfig {
    /// Centre frequency in Hz
    pub frequency_hz: u32,
    /// Spreading factor (7-12)
    pub spreading_factor: u8,
    /// Bandwidth in kHz
    pub bandwidth_khz: u32,
    /// Coding rate denominator (5-8 for 4/5 to 4/8)
    pub coding_rate: u8,
    /// Transmit power in dBm
    pub tx_power_dbm: i8,
}

impl Default for LoraConfig {
    fn default() -> Self {
        use crate::config::mesh;

        Self {
            frequency_hz: mesh::FREQUENCY_HZ,
            spreading_factor: mesh::SPREADING_FACTOR,
            bandwidth_khz: mesh::BANDWIDTH_KHZ,
            coding_rate: mesh::CODING_RATE,
            tx_power_dbm: mesh::TX_POWER_DBM,
        }
    }
}

/// Received packet with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RxPacket {
    pub data: Vec<u8, MAX_LORA_PAYLOAD>,
    /// Received Signal Strength Indicator in dBm
    pub rssi: i16,
    /// Signal-to-Noise Ratio in dB
    pub snr: i8,
}

/// Abstract LoRa radio interface
pub trait LoraRadio {
    /// Initialise the radio hardware
    fn init(&mut self) -> impl Future<Output = Result<(), LoraError>>;

    /// Transmit one frame, returning once it is on air
    fn transmit(&mut self, data: &[u8]) -> impl Future<Output = Result<(), LoraError>>;

    /// Listen for one packet until `timeout_ms` expires
    fn receive(&mut self, timeout_ms: u32) -> impl Future<Output = Result<RxPacket, LoraError>>;

    /// Configure the modulation parameters
    fn configure(&mut self, config: &LoraConfig) -> impl Future<Output = Result<(), LoraError>>;

    /// Put the radio into standby (lowest power state that keeps config)
    fn set_standby(&mut self) -> impl Future<Output = Result<(), LoraError>>;
}
