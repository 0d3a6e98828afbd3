//! Endpoint configuration loading.
//!
//! TOML is the sole config source. Every field has a default except
//! `listen_addr` on the server side and `connect_addr` on the client side,
//! which callers must supply explicitly (there is no sane default for
//! "where do I listen" or "who do I connect to").

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// How long to wait for `ClientAdded`/`ClientValidated` before failing.
    pub handshake_timeout: Duration,
    /// Interval on which `ServerEndpoint::update`/`ClientEndpoint::update`
    /// re-probes peer liveness to detect connection loss.
    pub loss_poll_interval: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(5_000),
            loss_poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEndpointConfig {
    handshake_timeout_ms: Option<u64>,
    loss_poll_interval_ms: Option<u64>,
}

impl EndpointConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&toml_str)
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawEndpointConfig = toml::from_str(toml_str)?;
        let defaults = Self::default();
        Ok(Self {
            handshake_timeout: raw
                .handshake_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.handshake_timeout),
            loss_poll_interval: raw
                .loss_poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.loss_poll_interval),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = EndpointConfig::load_from_str("").unwrap();
        assert_eq!(cfg.handshake_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.loss_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = EndpointConfig::load_from_str(
            "handshake_timeout_ms = 1000\nloss_poll_interval_ms = 50\n",
        )
        .unwrap();
        assert_eq!(cfg.handshake_timeout, Duration::from_millis(1_000));
        assert_eq!(cfg.loss_poll_interval, Duration::from_millis(50));
    }
}
