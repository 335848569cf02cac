//! Satellite pass prediction
//!
//! A constant-offset heuristic: the next pass is assumed to start one
//! orbital period after the prediction was made, and to repeat every period
//! after that. It is a scheduling hint, not ephemeris.

use crate::config::satellite::PREDICTION_VALIDITY_MS;

/// Cached pass prediction
#[derive(Debug, Clone, Copy)]
pub struct PassPredictor {
    period_ms: u64,
    duration_ms: u64,
    /// Start of the predicted pass
    anchor_ms: Option<u64>,
    computed_at_ms: Option<u64>,
}

impl PassPredictor {
    pub fn new(period_ms: u64, duration_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            duration_ms,
            anchor_ms: None,
            computed_at_ms: None,
        }
    }

    /// Recompute if there is no prediction or it has gone stale
    ///
    /// Returns true when a new prediction was made.
    pub fn refresh(&mut self, now_ms: u64) -> bool {
        let stale = self
            .computed_at_ms
            .map_or(true, |at| now_ms.saturating_sub(at) >= PREDICTION_VALIDITY_MS);
        if !stale {
            return false;
        }

        let anchor = now_ms + self.period_ms;
        self.anchor_ms = Some(anchor);
        self.computed_at_ms = Some(now_ms);
        log::debug!("pass: next pass predicted at {} ms", anchor);
        true
    }

    /// Whether `now_ms` falls inside a predicted pass
    pub fn in_window(&self, now_ms: u64) -> bool {
        let Some(anchor) = self.anchor_ms else {
            return false;
        };
        now_ms >= anchor && (now_ms - anchor) % self.period_ms < self.duration_ms
    }

    /// Start of the current pass, or of the next one
    pub fn next_pass_ms(&self, now_ms: u64) -> Option<u64> {
        let anchor = self.anchor_ms?;
        if now_ms <= anchor {
            return Some(anchor);
        }

        let elapsed = now_ms - anchor;
        let current = anchor + (elapsed / self.period_ms) * self.period_ms;
        if elapsed % self.period_ms < self.duration_ms {
            Some(current)
        } else {
            Some(current + self.period_ms)
        }
    }

    /// When the current prediction was made
    pub fn computed_at_ms(&self) -> Option<u64> {
        self.computed_at_ms
    }
}
