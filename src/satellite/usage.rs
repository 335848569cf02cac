//! Daily message and cost accounting

/// Counters for the current calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyUsage {
    pub messages_sent: u32,
    pub cost: f32,
    /// Day the counters belong to (days since epoch), if known
    pub day: Option<u32>,
}

impl DailyUsage {
    /// Whether one more message at `cost_per_message` stays within both caps
    pub fn allows(&self, max_messages: u32, max_cost: f32, cost_per_message: f32) -> bool {
        self.messages_sent < max_messages && self.cost + cost_per_message <= max_cost
    }

    /// Count a confirmed delivery
    pub fn record(&mut self, cost: f32) {
        self.messages_sent = self.messages_sent.saturating_add(1);
        self.cost += cost;
    }

    pub fn reset(&mut self) {
        self.messages_sent = 0;
        self.cost = 0.0;
    }

    /// Reset when `today` differs from the recorded day
    ///
    /// Returns true if the counters were cleared.
    pub fn roll_over(&mut self, today: Option<u32>) -> bool {
        let Some(today) = today else {
            return false;
        };

        match self.day {
            Some(day) if day == today => false,
            Some(_) => {
                self.reset();
                self.day = Some(today);
                true
            }
            None => {
                self.day = Some(today);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps() {
        let mut usage = DailyUsage::default();
        assert!(usage.allows(2, 1.0, 0.5));

        usage.record(0.5);
        usage.record(0.5);
        assert!(!usage.allows(3, 1.0, 0.5));
        assert!(!usage.allows(2, 10.0, 0.5));
        assert!(!usage.allows(0, 10.0, 0.0));
    }

    #[test]
    fn test_roll_over() {
        let mut usage = DailyUsage::default();
        assert!(!usage.roll_over(None));
        assert!(!usage.roll_over(Some(100)));

        usage.record(0.15);
        assert!(!usage.roll_over(Some(100)));
        assert_eq!(usage.messages_sent, 1);

        assert!(usage.roll_over(Some(101)));
        assert_eq!(usage.messages_sent, 0);
        assert_eq!(usage.cost, 0.0);
        assert_eq!(usage.day, Some(101));
    }
}
