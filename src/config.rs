//! Hardware and uplink configuration constants for the ESP32-S3 trail camera

/// UART and control pins for the radio modems
pub mod pins {
    /// Satellite modem UART (UART1)
    pub const SAT_TX: u8 = 17;
    pub const SAT_RX: u8 = 18;
    /// Satellite modem sleep/enable line (high = on)
    pub const SAT_ENABLE: u8 = 16;

    /// Cellular modem UART (UART2)
    pub const CELL_TX: u8 = 43;
    pub const CELL_RX: u8 = 44;
    /// Cellular modem PWRKEY (high = on)
    pub const CELL_PWRKEY: u8 = 15;

    pub const MODEM_BAUD_RATE: u32 = 19200;
    pub const CELL_BAUD_RATE: u32 = 115200;
}

/// Satellite module family constants
pub mod satellite {
    pub const IRIDIUM_COST_PER_MESSAGE: f32 = 0.50;
    pub const ROCKBLOCK_COST_PER_MESSAGE: f32 = 0.15;
    pub const SWARM_COST_PER_MESSAGE: f32 = 0.05;

    /// SBD mobile-originated buffer size
    pub const IRIDIUM_MAX_PAYLOAD: usize = 340;
    pub const SWARM_MAX_PAYLOAD: usize = 192;

    /// Largest payload any supported module accepts
    pub const MAX_PAYLOAD: usize = IRIDIUM_MAX_PAYLOAD;

    pub const IRIDIUM_ORBITAL_PERIOD_MS: u64 = 100 * 60 * 1000;
    pub const SWARM_ORBITAL_PERIOD_MS: u64 = 95 * 60 * 1000;

    pub const IRIDIUM_PASS_DURATION_MS: u64 = 9 * 60 * 1000;
    pub const SWARM_PASS_DURATION_MS: u64 = 8 * 60 * 1000;

    /// Cached pass predictions older than this are recomputed
    pub const PREDICTION_VALIDITY_MS: u64 = 24 * 60 * 60 * 1000;

    pub const DEFAULT_TRANSMISSION_INTERVAL_SECS: u32 = 3600;
    pub const DEFAULT_MAX_DAILY_MESSAGES: u32 = 50;
    pub const DEFAULT_MAX_DAILY_COST: f32 = 25.0;

    /// SBD session (AT+SBDIX) can take tens of seconds
    pub const SESSION_TIMEOUT_MS: u32 = 60_000;
    pub const COMMAND_TIMEOUT_MS: u32 = 2_000;
    pub const WAKE_TIMEOUT_MS: u32 = 10_000;

    /// Fewest AT+CSQF bars (0-5) worth starting an SBD session on
    pub const IRIDIUM_MIN_BARS: u8 = 1;
    /// Swarm background noise above this means no usable sky view
    pub const SWARM_MAX_NOISE_DBM: i16 = -87;
}

/// Retry and backoff defaults
pub mod retry {
    pub const MAX_ATTEMPTS: u8 = 5;
    pub const BASE_DELAY_MS: u32 = 2_000;
    pub const MULTIPLIER: u32 = 2;
    pub const MAX_DELAY_MS: u32 = 60_000;
    /// Jitter applied to each delay, as +/- percent
    pub const JITTER_PERCENT: u8 = 25;
    pub const DEFAULT_JITTER_SEED: u64 = 0x5EED_CAFE_F00D_D00D;
}

/// Transport scoring weights
pub mod scoring {
    pub const BASE_LOCAL_MESH: i32 = 100;
    pub const BASE_CELLULAR: i32 = 80;
    pub const BASE_SATELLITE: i32 = 50;

    pub const SIGNAL_EXCELLENT_BONUS: i32 = 20;
    pub const SIGNAL_GOOD_BONUS: i32 = 10;
    pub const SIGNAL_POOR_PENALTY: i32 = -20;

    pub const FREE_BONUS: i32 = 15;
    pub const EXPENSIVE_PENALTY: i32 = -15;
    /// Costs above this are considered expensive
    pub const EXPENSIVE_COST: f32 = 10.0;

    pub const POWER_LOW_BONUS: i32 = 10;
    pub const POWER_MEDIUM_BONUS: i32 = 5;
    pub const POWER_HIGH_PENALTY: i32 = -5;

    pub const EMERGENCY_SATELLITE_BONUS: i32 = 50;
    pub const LOW_PRIORITY_MESH_BONUS: i32 = 20;

    pub const LARGE_MESSAGE_BYTES: usize = 1024 * 1024;
    pub const LARGE_MESSAGE_SATELLITE_PENALTY: i32 = -100;

    /// Delay between emergency fallback attempts
    pub const FALLBACK_DELAY_MS: u32 = 1_000;
}

/// Power management
pub mod power {
    pub const LOW_BATTERY_THRESHOLD: u8 = 15;
    /// Battery must rise this far above the threshold to leave low power mode
    pub const HYSTERESIS_BAND: u8 = 10;
}

/// Store-and-forward queue
pub mod queue {
    pub const CAPACITY: usize = 16;
    /// Stored messages sent per flush
    pub const MAX_FLUSH_PER_TICK: usize = 4;
}

/// Payload compression
pub mod compression {
    pub const MIN_SIZE: usize = 32;
    /// Compressed output must be at most this fraction of the input
    pub const RATIO_GATE: f32 = 0.9;
    /// Largest payload accepted for compression
    pub const MAX_INPUT: usize = 512;
}

/// Cellular defaults
pub mod cellular {
    /// Field deployment defaults, overridable at build time
    pub const APN: &str = match option_env!("TRAILCAM_APN") {
        Some(apn) => apn,
        None => "internet",
    };
    pub const SERVER_HOST: &str = match option_env!("TRAILCAM_SERVER_HOST") {
        Some(host) => host,
        None => "uplink.trailcam.local",
    };
    pub const SERVER_PORT: u16 = 7300;

    pub const COST_PER_KIB: f32 = 0.01;
    pub const COMMAND_TIMEOUT_MS: u32 = 5_000;
    pub const CONNECT_TIMEOUT_MS: u32 = 30_000;
    pub const SEND_TIMEOUT_MS: u32 = 30_000;
    pub const WAKE_TIMEOUT_MS: u32 = 10_000;
    /// Largest chunk handed to a single AT+CIPSEND
    pub const SEND_CHUNK: usize = 1024;
}

/// WiFi pass-through
pub mod wifi {
    /// Longest wait for the station to reassociate after power save
    pub const WAKE_TIMEOUT_MS: u32 = 5_000;
    pub const WAKE_POLL_MS: u32 = 100;
}

/// LoRa mesh defaults
pub mod mesh {
    /// Maximum payload of a single LoRa frame
    pub const MAX_LORA_PAYLOAD: usize = 256;
    /// Fragment header: msg_id (2) + index (1) + count (1)
    pub const FRAGMENT_HEADER: usize = 4;
    pub const MAX_FRAGMENTS: usize = 255;

    /// EU868 gateway channel
    pub const FREQUENCY_HZ: u32 = 868_100_000;
    pub const SPREADING_FACTOR: u8 = 9;
    pub const BANDWIDTH_KHZ: u32 = 125;
    /// 4/5
    pub const CODING_RATE: u8 = 5;
    pub const TX_POWER_DBM: i8 = 14;

    /// Window to hear the gateway beacon when probing availability
    pub const BEACON_LISTEN_MS: u32 = 1_500;
    /// A gateway heard within this long counts as reachable
    pub const BEACON_FRESH_MS: u64 = 10 * 60 * 1000;
}

/// Scheduler timing
pub mod timing {
    /// Uplink task tick period
    pub const TICK_INTERVAL_MS: u64 = 30_000;
    /// Poll period while waiting on a modem reply
    pub const MODEM_POLL_MS: u32 = 10;
}

/// Protocol constants
pub mod protocol {
    /// Frame delimiter for COBS encoding
    pub const FRAME_DELIMITER: u8 = 0x00;

    /// Maximum frame size
    pub const MAX_FRAME_SIZE: usize = 512;

    /// Maximum data carried by a SendData command (priority byte excluded)
    pub const MAX_SEND_PAYLOAD: usize = 480;

    /// Maximum AT response line length
    pub const MAX_AT_LINE: usize = 128;

    /// Protocol version (increment when message format changes)
    pub const PROTOCOL_VERSION: u8 = 1;

    /// Firmware version
    pub const VERSION_MAJOR: u8 = 0;
    pub const VERSION_MINOR: u8 = 1;
    pub const VERSION_PATCH: u8 = 0;
}

/// Rejected runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Retry policy with zero attempts, zero base delay or max < base
    InvalidRetryPolicy,
    /// Negative or non-finite daily cost cap
    InvalidCostLimit,
    /// Battery threshold outside 0..=100
    InvalidThreshold,
    /// Zero transmission interval
    InvalidInterval,
    /// Cellular APN or server endpoint missing
    MissingEndpoint,
}
