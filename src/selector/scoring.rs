//! Deterministic transport scoring
//!
//! Pure functions over a [`TransportInfo`] snapshot; nothing here touches a
//! radio. WiFi sits outside the scoring and ranks first whenever it is
//! available.

use crate::config::scoring::*;
use crate::transport::traits::{PowerClass, Priority, TransportInfo, TransportKind};
use heapless::Vec;

/// Number of transport slots a selector can hold
pub const SLOTS: usize = 4;

/// Selector tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorConfig {
    /// Apply the cost adjustment
    pub cost_optimization: bool,
    /// Favour satellite for Emergency traffic
    pub prioritize_emergency: bool,
    /// Pause between emergency fallback attempts
    pub fallback_delay_ms: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cost_optimization: true,
            prioritize_emergency: true,
            fallback_delay_ms: FALLBACK_DELAY_MS,
        }
    }
}

/// A transport eligible for this request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub kind: TransportKind,
    /// `None` for WiFi, which is preferred without scoring
    pub score: Option<i32>,
}

/// Base score by kind; `None` for kinds outside the scoring
pub fn base_score(kind: TransportKind) -> Option<i32> {
    match kind {
        TransportKind::LocalMesh => Some(BASE_LOCAL_MESH),
        TransportKind::Cellular => Some(BASE_CELLULAR),
        TransportKind::Satellite => Some(BASE_SATELLITE),
        TransportKind::Wifi | TransportKind::None => None,
    }
}

fn signal_adjustment(signal: Option<u8>) -> i32 {
    match signal {
        Some(s) if s > 80 => SIGNAL_EXCELLENT_BONUS,
        Some(s) if s > 60 => SIGNAL_GOOD_BONUS,
        Some(s) if s < 30 => SIGNAL_POOR_PENALTY,
        _ => 0,
    }
}

fn cost_adjustment(cost: f32) -> i32 {
    if cost == 0.0 {
        FREE_BONUS
    } else if cost > EXPENSIVE_COST {
        EXPENSIVE_PENALTY
    } else {
        0
    }
}

fn power_adjustment(power: PowerClass) -> i32 {
    match power {
        PowerClass::Low => POWER_LOW_BONUS,
        PowerClass::Medium => POWER_MEDIUM_BONUS,
        PowerClass::High => POWER_HIGH_PENALTY,
    }
}

/// Score one transport for a request
///
/// Returns `None` when the transport is unavailable or not scored (WiFi).
pub fn score(
    info: &TransportInfo,
    payload_len: usize,
    priority: Priority,
    config: &SelectorConfig,
) -> Option<i32> {
    if !info.available {
        return None;
    }
    let mut total = base_score(info.kind)?;

    total += signal_adjustment(info.signal_strength);
    if config.cost_optimization {
        total += cost_adjustment(info.estimated_cost);
    }
    total += power_adjustment(info.power_class);

    match (priority, info.kind) {
        (Priority::Emergency, TransportKind::Satellite) if config.prioritize_emergency => {
            total += EMERGENCY_SATELLITE_BONUS;
        }
        (Priority::Low, TransportKind::LocalMesh) => total += LOW_PRIORITY_MESH_BONUS,
        _ => {}
    }

    if info.kind == TransportKind::Satellite && payload_len > LARGE_MESSAGE_BYTES {
        total += LARGE_MESSAGE_SATELLITE_PENALTY;
    }

    Some(total)
}

/// Available transports in attempt order
///
/// WiFi first, then by descending score. Ties go to the higher base score,
/// then to the lower kind value.
pub fn rank(
    infos: &[TransportInfo],
    payload_len: usize,
    priority: Priority,
    config: &SelectorConfig,
) -> Vec<Candidate, SLOTS> {
    let mut candidates: Vec<Candidate, SLOTS> = Vec::new();

    for info in infos.iter().filter(|i| i.available) {
        let candidate = match info.kind {
            TransportKind::Wifi => Candidate {
                kind: info.kind,
                score: None,
            },
            TransportKind::None => continue,
            _ => match score(info, payload_len, priority, config) {
                Some(s) => Candidate {
                    kind: info.kind,
                    score: Some(s),
                },
                None => continue,
            },
        };
        if candidates.push(candidate).is_err() {
            break;
        }
    }

    candidates.sort_unstable_by(|a, b| {
        let key = |c: &Candidate| {
            (
                c.score.is_none(),
                c.score.unwrap_or(i32::MAX),
                base_score(c.kind).unwrap_or(i32::MAX),
            )
        };
        key(b).cmp(&key(a)).then(a.kind.cmp(&b.kind))
    });
    candidates
}

/// Best transport for a request, `None` if nothing is available
pub fn select(
    infos: &[TransportInfo],
    payload_len: usize,
    priority: Priority,
    config: &SelectorConfig,
) -> Option<TransportKind> {
    rank(infos, payload_len, priority, config)
        .first()
        .map(|c| c.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(kind: TransportKind, cost: f32, power: PowerClass) -> TransportInfo {
        TransportInfo {
            kind,
            signal_strength: None,
            estimated_cost: cost,
            power_class: power,
            available: true,
        }
    }

    fn three_way() -> [TransportInfo; 3] {
        [
            info(TransportKind::LocalMesh, 0.0, PowerClass::Low),
            info(TransportKind::Cellular, 5.0, PowerClass::Medium),
            info(TransportKind::Satellite, 20.0, PowerClass::High),
        ]
    }

    #[test]
    fn test_mesh_wins_for_small_normal_message() {
        let config = SelectorConfig::default();
        let infos = three_way();

        assert_eq!(score(&infos[0], 100, Priority::Normal, &config), Some(125));
        assert_eq!(score(&infos[1], 100, Priority::Normal, &config), Some(85));
        assert_eq!(score(&infos[2], 100, Priority::Normal, &config), Some(30));
        assert_eq!(
            select(&infos, 100, Priority::Normal, &config),
            Some(TransportKind::LocalMesh)
        );
    }

    #[test]
    fn test_large_message_never_satellite() {
        let config = SelectorConfig::default();
        let infos = three_way();
        let len = 2 * 1024 * 1024;

        let satellite = score(&infos[2], len, Priority::Normal, &config).unwrap();
        let cellular = score(&infos[1], len, Priority::Normal, &config).unwrap();
        assert!(satellite < cellular);

        // Even with the emergency bonus, bulk data stays off satellite
        let ranked = rank(&infos, len, Priority::Emergency, &config);
        assert_ne!(ranked[0].kind, TransportKind::Satellite);
        assert_eq!(ranked.last().unwrap().kind, TransportKind::Satellite);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let config = SelectorConfig::default();
        let mut infos = three_way();
        infos[1].signal_strength = Some(90);

        for priority in [Priority::Low, Priority::Normal, Priority::High, Priority::Emergency] {
            let first = rank(&infos, 300, priority, &config);
            let second = rank(&infos, 300, priority, &config);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_unavailable_never_selected() {
        let config = SelectorConfig::default();
        let mut infos = three_way();
        infos[0].available = false;
        infos[1].available = false;

        assert_eq!(score(&infos[0], 10, Priority::Low, &config), None);
        let ranked = rank(&infos, 10, Priority::Low, &config);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].kind, TransportKind::Satellite);

        infos[2].available = false;
        assert_eq!(select(&infos, 10, Priority::Low, &config), None);
    }

    #[test]
    fn test_wifi_preferred_when_available() {
        let config = SelectorConfig::default();
        let infos = [
            info(TransportKind::LocalMesh, 0.0, PowerClass::Low),
            info(TransportKind::Wifi, 0.0, PowerClass::High),
        ];

        let ranked = rank(&infos, 10, Priority::Low, &config);
        assert_eq!(ranked[0].kind, TransportKind::Wifi);
        assert_eq!(ranked[0].score, None);
        assert_eq!(ranked[1].kind, TransportKind::LocalMesh);
    }

    #[test]
    fn test_emergency_favours_satellite() {
        let config = SelectorConfig::default();
        let infos = [
            info(TransportKind::Cellular, 0.5, PowerClass::Medium),
            info(TransportKind::Satellite, 0.15, PowerClass::High),
        ];

        assert_eq!(
            select(&infos, 50, Priority::Emergency, &config),
            Some(TransportKind::Satellite)
        );
        assert_eq!(
            select(&infos, 50, Priority::Normal, &config),
            Some(TransportKind::Cellular)
        );

        let no_bonus = SelectorConfig {
            prioritize_emergency: false,
            ..config
        };
        assert_eq!(
            select(&infos, 50, Priority::Emergency, &no_bonus),
            Some(TransportKind::Cellular)
        );
    }

    #[test]
    fn test_signal_and_cost_adjustments() {
        let config = SelectorConfig::default();
        let mut cell = info(TransportKind::Cellular, 1.0, PowerClass::Medium);

        cell.signal_strength = Some(81);
        assert_eq!(score(&cell, 10, Priority::Normal, &config), Some(105));
        cell.signal_strength = Some(61);
        assert_eq!(score(&cell, 10, Priority::Normal, &config), Some(95));
        cell.signal_strength = Some(29);
        assert_eq!(score(&cell, 10, Priority::Normal, &config), Some(65));

        cell.signal_strength = None;
        cell.estimated_cost = 0.0;
        let no_cost = SelectorConfig {
            cost_optimization: false,
            ..config
        };
        assert_eq!(score(&cell, 10, Priority::Normal, &config), Some(100));
        assert_eq!(score(&cell, 10, Priority::Normal, &no_cost), Some(85));
    }

    #[test]
    fn test_ties_go_to_higher_base_score() {
        let config = SelectorConfig {
            cost_optimization: false,
            ..SelectorConfig::default()
        };
        // Mesh 100 - 20 - 5 = 75, cellular 80 - 5 = 75
        let mut mesh = info(TransportKind::LocalMesh, 0.0, PowerClass::High);
        mesh.signal_strength = Some(10);
        let cell = info(TransportKind::Cellular, 0.0, PowerClass::High);

        let ranked = rank(&[cell, mesh], 10, Priority::Normal, &config);
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].kind, TransportKind::LocalMesh);
    }
}
