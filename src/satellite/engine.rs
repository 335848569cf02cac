//! Satellite store-and-forward engine
//!
//! Owns the satellite modem, the bounded message queue, the daily quota
//! counters, pass prediction and power mode. A send either goes out now
//! (with retry and backoff) or is stored for a later [`SatelliteEngine::tick`].

use crate::config::queue::MAX_FLUSH_PER_TICK;
use crate::config::satellite::{
    DEFAULT_MAX_DAILY_COST, DEFAULT_MAX_DAILY_MESSAGES, DEFAULT_TRANSMISSION_INTERVAL_SECS,
    MAX_PAYLOAD,
};
use crate::config::{power, retry, ConfigError};
use crate::satellite::backoff::{Backoff, RetryPolicy};
use crate::satellite::compress::{CompressError, CompressStats, Compressor};
use crate::satellite::pass::PassPredictor;
use crate::satellite::persist::{self, PersistError, StateStore, SNAPSHOT_MAX};
use crate::satellite::power::PowerMode;
use crate::satellite::queue::{MessageQueue, StoredPayload};
use crate::satellite::usage::DailyUsage;
use crate::time::Timebase;
use crate::transport::satellite::SatelliteModule;
use crate::transport::traits::{Priority, Transport, TransportError};

/// Runtime satellite configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteConfig {
    pub enabled: bool,
    pub module: SatelliteModule,
    pub transmission_interval_secs: u32,
    pub max_daily_messages: u32,
    pub max_daily_cost: f32,
    /// Hold Low priority traffic for a pass window
    pub cost_optimization: bool,
    /// Let the selector favour satellite for Emergency traffic
    pub prioritize_emergency: bool,
    pub auto_pass_prediction: bool,
    /// Hold all non-Emergency traffic for a pass window
    pub use_scheduled_transmission: bool,
    pub enable_message_compression: bool,
    pub low_battery_threshold: u8,
    pub retry: RetryPolicy,
    pub jitter_seed: u64,
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            module: SatelliteModule::RockBlock,
            transmission_interval_secs: DEFAULT_TRANSMISSION_INTERVAL_SECS,
            max_daily_messages: DEFAULT_MAX_DAILY_MESSAGES,
            max_daily_cost: DEFAULT_MAX_DAILY_COST,
            cost_optimization: true,
            prioritize_emergency: true,
            auto_pass_prediction: true,
            use_scheduled_transmission: false,
            enable_message_compression: true,
            low_battery_threshold: power::LOW_BATTERY_THRESHOLD,
            retry: RetryPolicy::default(),
            jitter_seed: retry::DEFAULT_JITTER_SEED,
        }
    }
}

impl SatelliteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        if !self.max_daily_cost.is_finite() || self.max_daily_cost < 0.0 {
            return Err(ConfigError::InvalidCostLimit);
        }
        if self.low_battery_threshold > 100 {
            return Err(ConfigError::InvalidThreshold);
        }
        if self.transmission_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(())
    }
}

/// Errors from the engine's admission checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatelliteError {
    /// Satellite disabled in configuration
    Disabled,
    EmptyPayload,
    /// Payload does not fit the module even after compression
    PayloadTooLarge,
    /// Queue full of higher-priority messages
    QueueFull,
    /// Battery percentage above 100
    InvalidBattery,
}

/// Why a message was stored instead of sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreReason {
    /// Daily message or cost cap reached
    QuotaExceeded,
    /// Waiting for a pass window or the transmission interval
    OutsideWindow,
    /// Every retry attempt failed
    RetriesExhausted,
}

/// Result of a send request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Confirmed by the modem after `attempts` tries
    Sent { attempts: u8 },
    /// Queued for a later flush
    Stored { reason: StoreReason, pending: usize },
}

/// Diagnostic snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteStatus {
    pub enabled: bool,
    pub module: SatelliteModule,
    pub messages_sent_today: u32,
    pub today_cost: f32,
    pub pending: usize,
    pub low_power: bool,
    pub emergency_mode: bool,
    pub battery: Option<u8>,
    pub next_pass_ms: Option<u64>,
    pub evicted: u32,
}

/// Satellite store-and-forward engine
pub struct SatelliteEngine<M, T> {
    modem: M,
    timebase: T,
    config: SatelliteConfig,
    usage: DailyUsage,
    queue: MessageQueue,
    pass: PassPredictor,
    power: PowerMode,
    backoff: Backoff,
    compressor: Compressor,
    emergency_mode: bool,
    last_transmission_ms: Option<u64>,
    evicted: u32,
    /// State changed since the last successful save
    dirty: bool,
}

impl<M: Transport, T: Timebase> SatelliteEngine<M, T> {
    pub fn new(modem: M, timebase: T, config: SatelliteConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let module = config.module;
        Ok(Self {
            modem,
            timebase,
            usage: DailyUsage::default(),
            queue: MessageQueue::new(),
            pass: PassPredictor::new(module.orbital_period_ms(), module.pass_duration_ms()),
            power: PowerMode::new(config.low_battery_threshold),
            backoff: Backoff::new(config.retry, config.jitter_seed),
            compressor: Compressor::new(),
            emergency_mode: false,
            last_transmission_ms: None,
            evicted: 0,
            dirty: false,
            config,
        })
    }

    pub fn config(&self) -> &SatelliteConfig {
        &self.config
    }

    pub fn modem_mut(&mut self) -> &mut M {
        &mut self.modem
    }

    pub fn usage(&self) -> &DailyUsage {
        &self.usage
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn compression_stats(&self) -> &CompressStats {
        self.compressor.stats()
    }

    /// Send now or store for later
    pub async fn send_message(
        &mut self,
        payload: &[u8],
        priority: Priority,
    ) -> Result<SendOutcome, SatelliteError> {
        if !self.config.enabled {
            return Err(SatelliteError::Disabled);
        }
        if payload.is_empty() {
            return Err(SatelliteError::EmptyPayload);
        }

        let encoded = self.encode(payload)?;
        self.roll_day();

        if priority == Priority::Emergency {
            log::info!("satellite: emergency message, bypassing quota and window");
            return self.transmit_or_store(encoded, priority).await;
        }

        if !self.quota_allows(encoded.len()) {
            log::info!(
                "satellite: daily quota reached ({}/{} msgs, {} cost)",
                self.usage.messages_sent,
                self.config.max_daily_messages,
                self.usage.cost
            );
            return self.store(priority, encoded, StoreReason::QuotaExceeded);
        }

        let now = self.timebase.now_ms();
        if self.needs_window(priority) && !self.window_open(now) {
            return self.store(priority, encoded, StoreReason::OutsideWindow);
        }

        self.transmit_or_store(encoded, priority).await
    }

    /// Periodic work: day rollover, pass refresh and flushing stored messages
    ///
    /// Returns the number of stored messages delivered.
    pub async fn tick(&mut self) -> usize {
        self.roll_day();

        let now = self.timebase.now_ms();
        if self.config.auto_pass_prediction {
            self.pass.refresh(now);
        }

        if !self.config.enabled || self.queue.is_empty() || !self.flush_due(now) {
            return 0;
        }
        self.flush().await
    }

    /// Bypass window and interval gates for flushing until exited
    pub fn enter_emergency_mode(&mut self) {
        if !self.emergency_mode {
            log::warn!("satellite: emergency mode on");
        }
        self.emergency_mode = true;
    }

    pub fn exit_emergency_mode(&mut self) {
        if self.emergency_mode {
            log::info!("satellite: emergency mode off");
        }
        self.emergency_mode = false;
    }

    pub fn is_emergency_mode(&self) -> bool {
        self.emergency_mode
    }

    /// Apply an externally measured battery level
    pub async fn optimize_power_consumption(
        &mut self,
        battery_percent: u8,
    ) -> Result<(), SatelliteError> {
        if battery_percent > 100 {
            return Err(SatelliteError::InvalidBattery);
        }

        if self.power.update(battery_percent) {
            if self.power.is_low_power() {
                log::info!(
                    "satellite: low power at {}%, transmission interval doubled",
                    battery_percent
                );
                if let Err(e) = self.modem.sleep().await {
                    log::warn!("satellite: modem sleep failed ({:?})", e);
                }
            } else {
                log::info!("satellite: normal power at {}%", battery_percent);
            }
        }
        Ok(())
    }

    pub fn is_in_low_power_mode(&self) -> bool {
        self.power.is_low_power()
    }

    /// Clear today's counters
    pub fn reset_daily_usage(&mut self) {
        self.usage.reset();
        self.dirty = true;
        log::info!("satellite: daily usage reset");
    }

    /// Start of the current or next predicted pass
    pub fn next_pass_ms(&self) -> Option<u64> {
        if !self.config.auto_pass_prediction {
            return None;
        }
        self.pass.next_pass_ms(self.timebase.now_ms())
    }

    pub fn status(&self) -> SatelliteStatus {
        SatelliteStatus {
            enabled: self.config.enabled,
            module: self.config.module,
            messages_sent_today: self.usage.messages_sent,
            today_cost: self.usage.cost,
            pending: self.queue.len(),
            low_power: self.power.is_low_power(),
            emergency_mode: self.emergency_mode,
            battery: self.power.battery(),
            next_pass_ms: self.next_pass_ms(),
            evicted: self.evicted,
        }
    }

    /// Whether the queue or counters changed since the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn save_state<S: StateStore>(&mut self, store: &mut S) -> Result<(), PersistError> {
        let mut buf = [0u8; SNAPSHOT_MAX];
        let len = persist::encode(&self.usage, self.queue.iter(), &mut buf)?;
        store.save(&buf[..len])?;
        self.dirty = false;
        Ok(())
    }

    /// Load persisted counters and queue; returns the number of restored messages
    ///
    /// A missing or corrupt snapshot leaves the engine untouched.
    pub fn restore_state<S: StateStore>(&mut self, store: &mut S) -> Result<usize, PersistError> {
        let mut buf = [0u8; SNAPSHOT_MAX];
        let len = store.load(&mut buf)?;
        let snapshot = persist::decode(&buf[..len])?;

        let restored = snapshot.messages.len();
        self.usage = snapshot.usage;
        self.queue.restore(snapshot.messages);
        self.roll_day();

        log::info!(
            "satellite: restored {} messages, {} sent today",
            restored,
            self.usage.messages_sent
        );
        Ok(restored)
    }

    fn encode(&mut self, payload: &[u8]) -> Result<StoredPayload, SatelliteError> {
        let encoded = if self.config.enable_message_compression {
            self.compressor
                .encode::<MAX_PAYLOAD>(payload)
                .map_err(|e: CompressError| {
                    log::warn!("satellite: cannot encode payload ({:?})", e);
                    SatelliteError::PayloadTooLarge
                })?
        } else {
            StoredPayload::from_slice(payload).map_err(|_| SatelliteError::PayloadTooLarge)?
        };

        if encoded.len() > self.config.module.max_payload() {
            return Err(SatelliteError::PayloadTooLarge);
        }
        Ok(encoded)
    }

    fn roll_day(&mut self) {
        if self.usage.roll_over(self.timebase.calendar_day()) {
            log::info!("satellite: new day, usage counters reset");
            self.dirty = true;
        }
    }

    fn quota_allows(&self, payload_len: usize) -> bool {
        self.usage.allows(
            self.config.max_daily_messages,
            self.config.max_daily_cost,
            self.modem.estimated_cost(payload_len),
        )
    }

    fn needs_window(&self, priority: Priority) -> bool {
        self.config.use_scheduled_transmission
            || (self.config.cost_optimization && priority == Priority::Low)
    }

    fn effective_interval_ms(&self) -> u64 {
        self.config.transmission_interval_secs as u64 * 1000 * self.power.interval_factor() as u64
    }

    fn interval_elapsed(&self, now: u64) -> bool {
        self.last_transmission_ms
            .map_or(true, |last| now.saturating_sub(last) >= self.effective_interval_ms())
    }

    /// Whether a scheduled transmission may go out at `now`
    fn window_open(&mut self, now: u64) -> bool {
        if self.emergency_mode {
            return true;
        }
        if self.config.auto_pass_prediction {
            self.pass.refresh(now);
            self.pass.in_window(now)
        } else {
            self.interval_elapsed(now)
        }
    }

    fn flush_due(&mut self, now: u64) -> bool {
        if self.emergency_mode {
            return true;
        }
        // Low power stretches the spacing between flushes
        self.window_open(now) && (!self.power.is_low_power() || self.interval_elapsed(now))
    }

    async fn flush(&mut self) -> usize {
        let mut delivered = 0;

        for _ in 0..MAX_FLUSH_PER_TICK {
            let Some(next) = self.queue.peek_next() else {
                break;
            };
            let (seq, priority, payload) = (next.seq, next.priority, next.payload.clone());

            if priority != Priority::Emergency && !self.quota_allows(payload.len()) {
                break;
            }

            match self.transmit_with_retry(&payload).await {
                Ok(_) => {
                    self.queue.remove(seq);
                    self.dirty = true;
                    delivered += 1;
                }
                Err(e) => {
                    self.queue.note_attempt(seq);
                    self.dirty = true;
                    log::warn!("satellite: flush stopped ({:?}), {} pending", e, self.queue.len());
                    break;
                }
            }
        }

        if delivered > 0 {
            log::info!(
                "satellite: flushed {} stored messages, {} pending",
                delivered,
                self.queue.len()
            );
        }
        delivered
    }

    async fn transmit_or_store(
        &mut self,
        payload: StoredPayload,
        priority: Priority,
    ) -> Result<SendOutcome, SatelliteError> {
        match self.transmit_with_retry(&payload).await {
            Ok(attempts) => Ok(SendOutcome::Sent { attempts }),
            Err(_) => self.store(priority, payload, StoreReason::RetriesExhausted),
        }
    }

    /// Up to `max_attempts` sends with backoff; counts usage only on success
    async fn transmit_with_retry(&mut self, payload: &[u8]) -> Result<u8, TransportError> {
        let max_attempts = self.backoff.policy().max_attempts;
        let mut last_error = TransportError::Unavailable;

        for attempt in 1..=max_attempts {
            let result = match self.modem.wake().await {
                Ok(()) => self.modem.send(payload).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    let cost = self.modem.estimated_cost(payload.len());
                    self.usage.record(cost);
                    self.last_transmission_ms = Some(self.timebase.now_ms());
                    self.dirty = true;
                    log::info!(
                        "satellite: sent {} bytes on attempt {} (cost {}, today {}/{})",
                        payload.len(),
                        attempt,
                        cost,
                        self.usage.messages_sent,
                        self.config.max_daily_messages
                    );
                    self.rest_modem().await;
                    return Ok(attempt);
                }
                Err(e @ (TransportError::PayloadTooLarge | TransportError::EmptyPayload)) => {
                    last_error = e;
                    break;
                }
                Err(e) => {
                    last_error = e;
                    if attempt < max_attempts {
                        let delay = self.backoff.delay(attempt);
                        log::debug!(
                            "satellite: attempt {} failed ({:?}), retrying in {} ms",
                            attempt,
                            e,
                            delay
                        );
                        self.timebase.delay_ms(delay).await;
                    }
                }
            }
        }

        log::warn!(
            "satellite: giving up after {} attempts ({:?})",
            max_attempts,
            last_error
        );
        self.rest_modem().await;
        Err(last_error)
    }

    /// Put the modem back to sleep between sessions when saving power
    async fn rest_modem(&mut self) {
        if self.power.is_low_power() {
            let _ = self.modem.sleep().await;
        }
    }

    fn store(
        &mut self,
        priority: Priority,
        payload: StoredPayload,
        reason: StoreReason,
    ) -> Result<SendOutcome, SatelliteError> {
        match self.queue.push(priority, payload) {
            Ok(evicted) => {
                if let Some(evicted) = evicted {
                    self.evicted += 1;
                    log::warn!(
                        "satellite: queue full, evicted {:?} message #{}",
                        evicted.priority,
                        evicted.seq
                    );
                }
                self.dirty = true;
                log::info!(
                    "satellite: stored {:?} message ({:?}), {} pending",
                    priority,
                    reason,
                    self.queue.len()
                );
                Ok(SendOutcome::Stored {
                    reason,
                    pending: self.queue.len(),
                })
            }
            Err(_) => {
                log::warn!("satellite: queue full, {:?} message rejected", priority);
                Err(SatelliteError::QueueFull)
            }
        }
    }
}
