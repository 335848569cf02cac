//! Battery-driven low power mode with hysteresis

use crate::config::power::HYSTERESIS_BAND;

/// Tracks low power mode from externally reported battery levels
///
/// Enters at or below the threshold, leaves only above threshold + band.
#[derive(Debug, Clone, Copy)]
pub struct PowerMode {
    threshold: u8,
    low_power: bool,
    battery: Option<u8>,
}

impl PowerMode {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            low_power: false,
            battery: None,
        }
    }

    /// Apply a battery reading; returns true if the mode changed
    ///
    /// Callers validate `battery_percent <= 100`.
    pub fn update(&mut self, battery_percent: u8) -> bool {
        self.battery = Some(battery_percent);

        let exit_level = self.threshold.saturating_add(HYSTERESIS_BAND);
        let next = if self.low_power {
            battery_percent <= exit_level
        } else {
            battery_percent <= self.threshold
        };

        let changed = next != self.low_power;
        self.low_power = next;
        changed
    }

    pub fn is_low_power(&self) -> bool {
        self.low_power
    }

    pub fn battery(&self) -> Option<u8> {
        self.battery
    }

    /// Transmission interval multiplier for the current mode
    pub fn interval_factor(&self) -> u32 {
        if self.low_power {
            2
        } else {
            1
        }
    }
}
