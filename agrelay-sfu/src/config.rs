//! SFU configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SFU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    /// Maximum reconciliation attempts in one pass before backing off.
    pub max_signal_attempts: usize,
    /// Delay before a deferred reconciliation retry, in seconds.
    pub signal_retry_seconds: u64,
    /// Interval between periodic keyframe (PLI) requests, in seconds.
    pub keyframe_interval_seconds: u64,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            max_signal_attempts: 25,
            signal_retry_seconds: 3,
            keyframe_interval_seconds: 3,
        }
    }
}

impl SfuConfig {
    #[must_use]
    pub const fn signal_retry_delay(&self) -> Duration {
        Duration::from_secs(self.signal_retry_seconds)
    }

    #[must_use]
    pub const fn keyframe_interval(&self) -> Duration {
        Duration::from_secs(self.keyframe_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_contract() {
        let config = SfuConfig::default();
        assert_eq!(config.max_signal_attempts, 25);
        assert_eq!(config.signal_retry_delay(), Duration::from_secs(3));
        assert_eq!(config.keyframe_interval(), Duration::from_secs(3));
    }
}
