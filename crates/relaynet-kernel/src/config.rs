//! Kernel configuration

use std::path::Path;

use relaynet_relay::RelayTableConfig;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Kernel configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Human-readable node name, used in logs
    pub node_name: String,
    /// Largest packet body accepted for dispatch
    pub max_body_size: usize,
    /// Built-in modules to register
    pub enabled_modules: Vec<String>,
    /// Routing table settings
    pub relay_table: RelayTableConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            node_name: "relaynet-node".to_string(),
            max_body_size: 1024 * 1024,
            enabled_modules: vec!["ping".to_string()],
            relay_table: RelayTableConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: KernelConfig =
            toml::from_str(content).map_err(|e| KernelError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KernelError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| KernelError::Configuration(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.node_name.is_empty() {
            return Err(KernelError::Configuration("node_name must not be empty".to_string()));
        }
        if self.max_body_size == 0 {
            return Err(KernelError::Configuration("max_body_size must be > 0".to_string()));
        }
        self.relay_table.validate().map_err(KernelError::Configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_modules, vec!["ping"]);
    }

    #[test]
    fn test_partial_toml() {
        let config = KernelConfig::from_toml_str(
            r#"
            node_name = "edge-1"
            enabled_modules = []

            [relay_table]
            shutdown_timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.node_name, "edge-1");
        assert!(config.enabled_modules.is_empty());
        assert_eq!(config.max_body_size, 1024 * 1024);
        assert_eq!(config.relay_table.shutdown_timeout_secs, Some(10));
        assert_eq!(config.relay_table.shutdown_poll_interval_ms, 50);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            KernelConfig::from_toml_str("max_body_size = \"big\""),
            Err(KernelError::Configuration(_))
        ));
        assert!(matches!(
            KernelConfig::from_toml_str("max_body_size = 0"),
            Err(KernelError::Configuration(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = KernelConfig::default();
        let parsed = KernelConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed.node_name, config.node_name);
        assert_eq!(parsed.max_body_size, config.max_body_size);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join(format!("relaynet-{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(
            KernelConfig::load(&path),
            Err(KernelError::Configuration(_))
        ));
    }
}
