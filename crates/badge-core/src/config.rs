//! Session configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;
use crate::state::ReadPolicy;
use crate::transport::DeviceSelector;

/// Configuration for a badge session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-call bulk read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Consecutive empty reads before a request gives up.
    pub read_attempts: u32,
    /// Delay after a mode switch while the badge re-enumerates.
    pub reenumerate_delay_ms: u64,
    /// File transfer chunk size.
    pub chunk_size: usize,
    /// USB Vendor ID.
    pub vendor_id: u16,
    /// USB Product ID.
    pub product_id: u16,
    /// Interface number of the ESP32 bridge.
    pub interface: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: READ_TIMEOUT_MS,
            read_attempts: READ_ATTEMPTS,
            reenumerate_delay_ms: REENUMERATE_DELAY_MS,
            chunk_size: CHUNK_SIZE,
            vendor_id: BADGE_VENDOR_ID,
            product_id: BADGE_PRODUCT_ID,
            interface: ESP32_INTERFACE,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn read_policy(&self) -> ReadPolicy {
        ReadPolicy {
            max_attempts: self.read_attempts.max(1),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn reenumerate_delay(&self) -> Duration {
        Duration::from_millis(self.reenumerate_delay_ms)
    }

    /// Chunk size, never zero.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    pub fn device_selector(&self, address: Option<u8>) -> DeviceSelector {
        DeviceSelector {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            interface: self.interface,
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.chunk_size(), 8192);
        assert_eq!(config.read_policy(), ReadPolicy::default());
        assert_eq!(config.reenumerate_delay(), Duration::from_secs(1));
        assert_eq!(config.interface, 4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str("read_attempts = 50\n").unwrap();
        assert_eq!(config.read_attempts, 50);
        assert_eq!(config.read_timeout_ms, READ_TIMEOUT_MS);
        assert_eq!(config.vendor_id, BADGE_VENDOR_ID);
    }

    #[test]
    fn test_toml_roundtrip_via_file() {
        let path = std::env::temp_dir().join(format!("badge-config-{}.toml", std::process::id()));
        let config = SessionConfig {
            reenumerate_delay_ms: 250,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
