//! Network selector: picks a transport per message and falls back on failure
//!
//! Holds one optional slot per transport kind. The satellite slot is the
//! store-and-forward engine rather than a bare driver, so a satellite
//! "send" may end up stored for a later tick.

use crate::satellite::engine::{SatelliteEngine, SatelliteError, SatelliteStatus, SendOutcome};
use crate::selector::scoring::{self, Candidate, SelectorConfig, SLOTS};
use crate::time::Timebase;
use crate::transport::traits::{
    probe, NoTransport, Priority, Transport, TransportError, TransportInfo, TransportKind,
};
use heapless::Vec;

/// Slot order in scan snapshots
const SLOT_KINDS: [TransportKind; SLOTS] = [
    TransportKind::Wifi,
    TransportKind::LocalMesh,
    TransportKind::Cellular,
    TransportKind::Satellite,
];

/// Successful result of [`NetworkSelector::send_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the transport
    Delivered(TransportKind),
    /// Held in the satellite queue for a later flush
    Deferred { pending: usize },
}

/// Why a message could not be delivered or stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    EmptyPayload,
    /// Nothing reported available on the scan
    NoTransportAvailable,
    /// The chosen transport failed (non-Emergency, no fallback)
    SendFailed(TransportKind, TransportError),
    /// Every available transport failed an Emergency message
    AllTransportsFailed,
    /// Satellite engine refused the message
    Satellite(SatelliteError),
}

impl From<SatelliteError> for DeliveryError {
    fn from(e: SatelliteError) -> Self {
        DeliveryError::Satellite(e)
    }
}

/// Diagnostic snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorStatus {
    pub networks: [TransportInfo; SLOTS],
    pub last_selected: TransportKind,
    pub delivered: u32,
    pub deferred: u32,
    pub failed: u32,
    pub satellite: Option<SatelliteStatus>,
}

/// Result of one attempt on one transport
enum Attempt {
    Delivered,
    Stored(usize),
    Failed(TransportError),
    Refused(SatelliteError),
}

/// Transport selector over up to four channels
///
/// Empty slots default to [`NoTransport`]; fill them with the `with_*`
/// builders.
pub struct NetworkSelector<T, W = NoTransport, L = NoTransport, C = NoTransport, M = NoTransport>
{
    config: SelectorConfig,
    timebase: T,
    wifi: Option<W>,
    mesh: Option<L>,
    cellular: Option<C>,
    satellite: Option<SatelliteEngine<M, T>>,
    networks: [TransportInfo; SLOTS],
    last_selected: TransportKind,
    delivered: u32,
    deferred: u32,
    failed: u32,
}

impl<T: Timebase> NetworkSelector<T> {
    /// Selector with every slot empty
    pub fn new(config: SelectorConfig, timebase: T) -> Self {
        Self {
            config,
            timebase,
            wifi: None,
            mesh: None,
            cellular: None,
            satellite: None,
            networks: SLOT_KINDS.map(TransportInfo::absent),
            last_selected: TransportKind::None,
            delivered: 0,
            deferred: 0,
            failed: 0,
        }
    }
}

impl<T, W, L, C, M> NetworkSelector<T, W, L, C, M> {
    pub fn with_wifi<W2>(self, wifi: W2) -> NetworkSelector<T, W2, L, C, M> {
        NetworkSelector {
            config: self.config,
            timebase: self.timebase,
            wifi: Some(wifi),
            mesh: self.mesh,
            cellular: self.cellular,
            satellite: self.satellite,
            networks: self.networks,
            last_selected: self.last_selected,
            delivered: self.delivered,
            deferred: self.deferred,
            failed: self.failed,
        }
    }

    pub fn with_mesh<L2>(self, mesh: L2) -> NetworkSelector<T, W, L2, C, M> {
        NetworkSelector {
            config: self.config,
            timebase: self.timebase,
            wifi: self.wifi,
            mesh: Some(mesh),
            cellular: self.cellular,
            satellite: self.satellite,
            networks: self.networks,
            last_selected: self.last_selected,
            delivered: self.delivered,
            deferred: self.deferred,
            failed: self.failed,
        }
    }

    pub fn with_cellular<C2>(self, cellular: C2) -> NetworkSelector<T, W, L, C2, M> {
        NetworkSelector {
            config: self.config,
            timebase: self.timebase,
            wifi: self.wifi,
            mesh: self.mesh,
            cellular: Some(cellular),
            satellite: self.satellite,
            networks: self.networks,
            last_selected: self.last_selected,
            delivered: self.delivered,
            deferred: self.deferred,
            failed: self.failed,
        }
    }

    pub fn with_satellite<M2>(
        self,
        satellite: SatelliteEngine<M2, T>,
    ) -> NetworkSelector<T, W, L, C, M2> {
        NetworkSelector {
            config: self.config,
            timebase: self.timebase,
            wifi: self.wifi,
            mesh: self.mesh,
            cellular: self.cellular,
            satellite: Some(satellite),
            networks: self.networks,
            last_selected: self.last_selected,
            delivered: self.delivered,
            deferred: self.deferred,
            failed: self.failed,
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn timebase(&self) -> &T {
        &self.timebase
    }

    pub fn satellite(&self) -> Option<&SatelliteEngine<M, T>> {
        self.satellite.as_ref()
    }

    pub fn satellite_mut(&mut self) -> Option<&mut SatelliteEngine<M, T>> {
        self.satellite.as_mut()
    }

    /// Last scan snapshot, one entry per slot
    pub fn networks(&self) -> &[TransportInfo; SLOTS] {
        &self.networks
    }
}

impl<T, W, L, C, M> NetworkSelector<T, W, L, C, M>
where
    T: Timebase,
    W: Transport,
    L: Transport,
    C: Transport,
    M: Transport,
{
    /// Probe every fitted transport for a payload of `payload_len` bytes
    pub async fn scan_networks(&mut self, payload_len: usize) -> &[TransportInfo; SLOTS] {
        self.networks[0] = match self.wifi.as_mut() {
            Some(wifi) => probe(wifi, payload_len).await,
            None => TransportInfo::absent(TransportKind::Wifi),
        };
        self.networks[1] = match self.mesh.as_mut() {
            Some(mesh) => probe(mesh, payload_len).await,
            None => TransportInfo::absent(TransportKind::LocalMesh),
        };
        self.networks[2] = match self.cellular.as_mut() {
            Some(cellular) => probe(cellular, payload_len).await,
            None => TransportInfo::absent(TransportKind::Cellular),
        };
        self.networks[3] = match self.satellite.as_mut() {
            Some(engine) if engine.config().enabled => {
                probe(engine.modem_mut(), payload_len).await
            }
            _ => TransportInfo::absent(TransportKind::Satellite),
        };

        for info in self.networks.iter().filter(|i| i.available) {
            log::debug!(
                "selector: {:?} available, signal {:?}, cost {}",
                info.kind,
                info.signal_strength,
                info.estimated_cost
            );
        }
        &self.networks
    }

    /// Rank the last scan for a request
    pub fn rank(&self, payload_len: usize, priority: Priority) -> Vec<Candidate, SLOTS> {
        scoring::rank(&self.networks, payload_len, priority, &self.config)
    }

    /// Scan, then return the best transport for the request
    ///
    /// [`TransportKind::None`] when nothing is available.
    pub async fn select_optimal_network(
        &mut self,
        payload_len: usize,
        priority: Priority,
    ) -> TransportKind {
        self.scan_networks(payload_len).await;
        let selected = scoring::select(&self.networks, payload_len, priority, &self.config)
            .unwrap_or(TransportKind::None);
        log::info!(
            "selector: {:?} selected for {} bytes ({:?})",
            selected,
            payload_len,
            priority
        );
        selected
    }

    /// Deliver a payload over the best transport
    ///
    /// Emergency messages fall back through every available transport in
    /// score order; anything else is tried once.
    pub async fn send_data(
        &mut self,
        payload: &[u8],
        priority: Priority,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        if payload.is_empty() {
            return Err(DeliveryError::EmptyPayload);
        }

        self.scan_networks(payload.len()).await;
        let candidates = self.rank(payload.len(), priority);
        if candidates.is_empty() {
            log::warn!("selector: no transport available for {:?} message", priority);
            self.failed += 1;
            return Err(DeliveryError::NoTransportAvailable);
        }

        if priority != Priority::Emergency {
            let kind = candidates[0].kind;
            self.last_selected = kind;
            return match self.attempt(kind, payload, priority).await {
                Attempt::Delivered => Ok(self.delivered(kind, payload.len())),
                Attempt::Stored(pending) => Ok(self.deferred(pending)),
                Attempt::Failed(e) => {
                    log::warn!("selector: {:?} failed ({:?}), no fallback", kind, e);
                    self.failed += 1;
                    Err(DeliveryError::SendFailed(kind, e))
                }
                Attempt::Refused(e) => {
                    self.failed += 1;
                    Err(DeliveryError::Satellite(e))
                }
            };
        }

        let mut stored = None;
        for (i, candidate) in candidates.iter().enumerate() {
            if i > 0 {
                self.timebase.delay_ms(self.config.fallback_delay_ms).await;
            }
            self.last_selected = candidate.kind;

            match self.attempt(candidate.kind, payload, priority).await {
                Attempt::Delivered => return Ok(self.delivered(candidate.kind, payload.len())),
                Attempt::Stored(pending) => {
                    log::warn!("selector: emergency stored on satellite, trying other transports");
                    stored = Some(pending);
                }
                Attempt::Failed(e) => {
                    log::warn!("selector: emergency on {:?} failed ({:?})", candidate.kind, e);
                }
                Attempt::Refused(e) => {
                    log::warn!("selector: satellite refused emergency ({:?})", e);
                }
            }
        }

        match stored {
            Some(pending) => {
                log::error!(
                    "selector: emergency undelivered on {} transports, held in satellite queue",
                    candidates.len()
                );
                Ok(self.deferred(pending))
            }
            None => {
                log::error!(
                    "selector: CRITICAL emergency message lost, {} transports failed",
                    candidates.len()
                );
                self.failed += 1;
                Err(DeliveryError::AllTransportsFailed)
            }
        }
    }

    /// Periodic work; returns stored messages delivered this tick
    pub async fn tick(&mut self) -> usize {
        match self.satellite.as_mut() {
            Some(engine) => engine.tick().await,
            None => 0,
        }
    }

    /// Forward a battery reading to the satellite engine
    pub async fn optimize_power_consumption(
        &mut self,
        battery_percent: u8,
    ) -> Result<(), SatelliteError> {
        match self.satellite.as_mut() {
            Some(engine) => engine.optimize_power_consumption(battery_percent).await,
            None if battery_percent > 100 => Err(SatelliteError::InvalidBattery),
            None => Ok(()),
        }
    }

    pub fn set_emergency_mode(&mut self, on: bool) {
        if let Some(engine) = self.satellite.as_mut() {
            if on {
                engine.enter_emergency_mode();
            } else {
                engine.exit_emergency_mode();
            }
        }
    }

    pub fn reset_daily_usage(&mut self) {
        if let Some(engine) = self.satellite.as_mut() {
            engine.reset_daily_usage();
        }
    }

    pub fn status(&self) -> SelectorStatus {
        SelectorStatus {
            networks: self.networks,
            last_selected: self.last_selected,
            delivered: self.delivered,
            deferred: self.deferred,
            failed: self.failed,
            satellite: self.satellite.as_ref().map(|engine| engine.status()),
        }
    }

    async fn attempt(&mut self, kind: TransportKind, payload: &[u8], priority: Priority) -> Attempt {
        let result = match kind {
            TransportKind::Wifi => match self.wifi.as_mut() {
                Some(wifi) => send_once(wifi, payload).await,
                None => Err(TransportError::Unavailable),
            },
            TransportKind::LocalMesh => match self.mesh.as_mut() {
                Some(mesh) => send_once(mesh, payload).await,
                None => Err(TransportError::Unavailable),
            },
            TransportKind::Cellular => match self.cellular.as_mut() {
                Some(cellular) => send_once(cellular, payload).await,
                None => Err(TransportError::Unavailable),
            },
            TransportKind::Satellite => {
                let Some(engine) = self.satellite.as_mut() else {
                    return Attempt::Failed(TransportError::Unavailable);
                };
                return match engine.send_message(payload, priority).await {
                    Ok(SendOutcome::Sent { .. }) => Attempt::Delivered,
                    Ok(SendOutcome::Stored { pending, .. }) => Attempt::Stored(pending),
                    Err(e) => Attempt::Refused(e),
                };
            }
            TransportKind::None => Err(TransportError::Unavailable),
        };

        match result {
            Ok(()) => Attempt::Delivered,
            Err(e) => Attempt::Failed(e),
        }
    }

    fn delivered(&mut self, kind: TransportKind, len: usize) -> DeliveryOutcome {
        self.delivered += 1;
        log::info!("selector: {} bytes delivered over {:?}", len, kind);
        DeliveryOutcome::Delivered(kind)
    }

    fn deferred(&mut self, pending: usize) -> DeliveryOutcome {
        self.deferred += 1;
        log::info!("selector: message deferred, {} pending", pending);
        DeliveryOutcome::Deferred { pending }
    }
}

/// Wake a driver and make one send attempt
async fn send_once<D: Transport>(driver: &mut D, payload: &[u8]) -> Result<(), TransportError> {
    driver.wake().await?;
    driver.send(payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellite::engine::SatelliteConfig;
    use crate::time::mock::MockTimebase;
    use crate::transport::traits::mock::MockTransport;
    use crate::transport::traits::PowerClass;
    use futures::executor::block_on;

    type Selector = NetworkSelector<MockTimebase, MockTransport, MockTransport, MockTransport, MockTransport>;

    struct Rig {
        selector: Selector,
        wifi: MockTransport,
        mesh: MockTransport,
        cell: MockTransport,
        sat: MockTransport,
        clock: MockTimebase,
    }

    fn rig(sat_config: SatelliteConfig) -> Rig {
        let clock = MockTimebase::new();
        let wifi = MockTransport::new(TransportKind::Wifi, PowerClass::High, 0.0);
        let mesh = MockTransport::new(TransportKind::LocalMesh, PowerClass::Low, 0.0);
        let cell = MockTransport::new(TransportKind::Cellular, PowerClass::Medium, 5.0);
        let sat = MockTransport::new(TransportKind::Satellite, PowerClass::High, 20.0);
        wifi.set_available(false);

        let engine = SatelliteEngine::new(sat.clone(), clock.clone(), sat_config).unwrap();
        let selector = NetworkSelector::new(SelectorConfig::default(), clock.clone())
            .with_wifi(wifi.clone())
            .with_mesh(mesh.clone())
            .with_cellular(cell.clone())
            .with_satellite(engine);

        Rig {
            selector,
            wifi,
            mesh,
            cell,
            sat,
            clock,
        }
    }

    fn sat_config() -> SatelliteConfig {
        SatelliteConfig {
            enable_message_compression: false,
            auto_pass_prediction: false,
            max_daily_cost: 1_000.0,
            ..SatelliteConfig::default()
        }
    }

    #[test]
    fn test_selects_mesh_for_small_message() {
        let mut rig = rig(sat_config());

        let kind = block_on(rig.selector.select_optimal_network(100, Priority::Normal));
        assert_eq!(kind, TransportKind::LocalMesh);

        let outcome = block_on(rig.selector.send_data(&[1u8; 100], Priority::Normal)).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(TransportKind::LocalMesh));
        assert_eq!(rig.mesh.sent().len(), 1);
        assert_eq!(rig.cell.send_attempts(), 0);
    }

    #[test]
    fn test_large_message_avoids_satellite() {
        let mut rig = rig(sat_config());
        rig.mesh.set_available(false);

        let kind = block_on(rig.selector.select_optimal_network(2 * 1024 * 1024, Priority::Normal));
        assert_eq!(kind, TransportKind::Cellular);
    }

    #[test]
    fn test_wifi_first_when_connected() {
        let mut rig = rig(sat_config());
        rig.wifi.set_available(true);

        let outcome = block_on(rig.selector.send_data(b"img", Priority::Low)).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(TransportKind::Wifi));
        assert_eq!(rig.wifi.sent().len(), 1);
    }

    #[test]
    fn test_nothing_available_fails_immediately() {
        let mut rig = rig(sat_config());
        rig.mesh.set_available(false);
        rig.cell.set_available(false);
        rig.sat.set_available(false);

        assert_eq!(
            block_on(rig.selector.send_data(b"x", Priority::Emergency)),
            Err(DeliveryError::NoTransportAvailable)
        );
        assert_eq!(rig.mesh.send_attempts(), 0);
        assert_eq!(rig.sat.send_attempts(), 0);
        assert!(rig.clock.delays().is_empty());
        assert_eq!(rig.selector.satellite().unwrap().pending(), 0);
    }

    #[test]
    fn test_normal_failure_has_no_fallback() {
        let mut rig = rig(sat_config());
        rig.mesh.fail_sends(Some(TransportError::Timeout));

        assert_eq!(
            block_on(rig.selector.send_data(b"x", Priority::Normal)),
            Err(DeliveryError::SendFailed(
                TransportKind::LocalMesh,
                TransportError::Timeout
            ))
        );
        assert_eq!(rig.cell.send_attempts(), 0);
        assert_eq!(rig.sat.send_attempts(), 0);
    }

    #[test]
    fn test_emergency_falls_back_in_score_order() {
        let mut rig = rig(sat_config());
        rig.mesh.fail_sends(Some(TransportError::Timeout));
        rig.sat.fail_sends(Some(TransportError::Unavailable));

        // Emergency: satellite 30 + 50 = 80 ranks between mesh 125 and cellular 85
        let ranked: std::vec::Vec<TransportKind> = {
            block_on(rig.selector.scan_networks(10));
            rig.selector
                .rank(10, Priority::Emergency)
                .iter()
                .map(|c| c.kind)
                .collect()
        };
        assert_eq!(
            ranked,
            vec![
                TransportKind::LocalMesh,
                TransportKind::Cellular,
                TransportKind::Satellite
            ]
        );

        rig.clock.clear_delays();
        let outcome = block_on(rig.selector.send_data(b"sos", Priority::Emergency)).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(TransportKind::Cellular));
        assert_eq!(rig.mesh.send_attempts(), 1);
        assert_eq!(rig.sat.send_attempts(), 0);
        assert_eq!(rig.clock.delays(), vec![1_000]);
    }

    #[test]
    fn test_emergency_all_failed() {
        let mut rig = rig(sat_config());
        rig.mesh.fail_sends(Some(TransportError::Timeout));
        rig.cell.fail_sends(Some(TransportError::Rejected));
        rig.sat.set_cost(0.15);
        rig.sat.fail_sends(Some(TransportError::Timeout));

        let outcome = block_on(rig.selector.send_data(b"sos", Priority::Emergency)).unwrap();

        // Satellite kept it after exhausting its own retries
        assert_eq!(outcome, DeliveryOutcome::Deferred { pending: 1 });
        assert_eq!(rig.mesh.send_attempts(), 1);
        assert_eq!(rig.cell.send_attempts(), 1);
        assert_eq!(rig.sat.send_attempts(), 5);
    }

    #[test]
    fn test_emergency_lost_without_satellite() {
        let clock = MockTimebase::new();
        let mesh = MockTransport::new(TransportKind::LocalMesh, PowerClass::Low, 0.0);
        let cell = MockTransport::new(TransportKind::Cellular, PowerClass::Medium, 5.0);
        mesh.fail_sends(Some(TransportError::Timeout));
        cell.fail_sends(Some(TransportError::Timeout));

        let mut selector = NetworkSelector::new(SelectorConfig::default(), clock.clone())
            .with_mesh(mesh.clone())
            .with_cellular(cell.clone());

        assert_eq!(
            block_on(selector.send_data(b"sos", Priority::Emergency)),
            Err(DeliveryError::AllTransportsFailed)
        );
        assert_eq!(selector.status().failed, 1);
        assert_eq!(clock.delays(), vec![1_000]);
    }

    #[test]
    fn test_satellite_defers_when_only_option() {
        let mut rig = rig(SatelliteConfig {
            max_daily_messages: 0,
            ..sat_config()
        });
        rig.mesh.set_available(false);
        rig.cell.set_available(false);

        let outcome = block_on(rig.selector.send_data(b"count", Priority::Normal)).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Deferred { pending: 1 });
        assert_eq!(rig.sat.send_attempts(), 0);

        let status = rig.selector.status();
        assert_eq!(status.deferred, 1);
        assert_eq!(status.last_selected, TransportKind::Satellite);
        assert_eq!(status.satellite.unwrap().pending, 1);
    }

    #[test]
    fn test_forwards_power_and_emergency() {
        let mut rig = rig(sat_config());

        block_on(rig.selector.optimize_power_consumption(10)).unwrap();
        assert!(rig.selector.satellite().unwrap().is_in_low_power_mode());
        assert_eq!(
            block_on(rig.selector.optimize_power_consumption(150)),
            Err(SatelliteError::InvalidBattery)
        );

        rig.selector.set_emergency_mode(true);
        assert!(rig.selector.satellite().unwrap().is_emergency_mode());
        rig.selector.set_emergency_mode(false);
        assert!(!rig.selector.satellite().unwrap().is_emergency_mode());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut rig = rig(sat_config());
        assert_eq!(
            block_on(rig.selector.send_data(&[], Priority::Normal)),
            Err(DeliveryError::EmptyPayload)
        );
    }

    #[test]
    fn test_satellite_rejoins_after_low_battery() {
        use crate::modem::port::mock::MockModemPort;
        use crate::transport::satellite::{SatelliteModem, SatelliteModule};

        let clock = MockTimebase::new();
        let port = MockModemPort::new();
        let modem = SatelliteModem::new(port.clone(), clock.clone(), SatelliteModule::RockBlock);
        let engine = SatelliteEngine::new(modem, clock.clone(), sat_config()).unwrap();
        let mut selector = NetworkSelector::new(SelectorConfig::default(), clock).with_satellite(engine);

        port.expect_reply("\r\n+CSQF:4\r\n\r\nOK\r\n");
        port.expect_reply("\r\n+CSQF:4\r\n\r\nOK\r\n");
        assert!(block_on(selector.scan_networks(3))[3].available);

        // Low battery powers the modem down, recovery leaves it asleep
        port.expect_reply("\r\nOK\r\n"); // AT*F
        block_on(selector.optimize_power_consumption(10)).unwrap();
        assert!(!port.is_powered());
        block_on(selector.optimize_power_consumption(90)).unwrap();
        assert!(!selector.satellite().unwrap().is_in_low_power_mode());

        let sat = block_on(selector.scan_networks(3))[3];
        assert!(sat.available);
        assert_eq!(sat.signal_strength, Some(80));

        port.expect_reply("\r\nOK\r\n"); // AT
        port.expect_reply("\r\nOK\r\n"); // AT&K0
        port.expect_reply("READY\r\n");
        port.expect_reply("0\r\n\r\nOK\r\n");
        port.expect_reply("\r\n+SBDIX: 0, 3, 0, 0, 0, 0\r\n\r\nOK\r\n");

        let outcome = block_on(selector.send_data(b"sos", Priority::Emergency)).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(TransportKind::Satellite));
        assert!(port.is_powered());
        assert!(port.written_text().contains("AT+SBDIX\r"));
        assert_eq!(selector.satellite().unwrap().status().messages_sent_today, 1);
    }
}
