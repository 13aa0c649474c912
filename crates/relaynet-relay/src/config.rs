//! Routing table configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Routing table configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayTableConfig {
    /// Fallback poll interval while waiting for connections to drain
    pub shutdown_poll_interval_ms: u64,
    /// Give up waiting for connections to drain after this long
    pub shutdown_timeout_secs: Option<u64>,
}

impl Default for RelayTableConfig {
    fn default() -> Self {
        Self {
            shutdown_poll_interval_ms: 50,
            shutdown_timeout_secs: None,
        }
    }
}

impl RelayTableConfig {
    /// Get poll interval as Duration
    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_secs.map(Duration::from_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.shutdown_poll_interval_ms == 0 {
            return Err("shutdown_poll_interval_ms must be > 0".to_string());
        }
        if self.shutdown_timeout_secs == Some(0) {
            return Err("shutdown_timeout_secs must be > 0 when set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayTableConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shutdown_poll_interval().as_millis(), 50);
        assert!(config.shutdown_timeout().is_none());
    }

    #[test]
    fn test_invalid_config() {
        let config = RelayTableConfig {
            shutdown_poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
