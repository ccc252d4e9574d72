//! Scheduler configuration.

use serde::Deserialize;
use std::time::Duration;

/// Timer driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// How often the driver polls for due timers, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// The polling interval. Never zero.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(1));

        let config: SchedulerConfig = serde_json::from_str("{}").expect("empty config");
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = SchedulerConfig { tick_interval_ms: 0 };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
