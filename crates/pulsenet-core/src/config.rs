//! Session configuration (§6): every tunable the orchestrator consults,
//! serializable so a host application can load it from TOML the same way
//! the rest of this workspace handles configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub enable_heartbeat: bool,
    pub heartbeat_interval_millis: u64,
    pub heartbeat_timeout_millis: u64,
    pub max_retries: u32,
    pub max_queue_size: usize,
    /// Reserved for a future wire-compression layer; no-op today (§9).
    pub enable_compression: bool,
    /// Reserved for a future transport-encryption layer; no-op today (§9).
    pub enable_encryption: bool,
    pub connect_timeout_millis: u64,
    pub max_record_size: usize,
    pub reconnect_max_attempts: u32,
    pub reconnect_initial_delay_millis: u64,
    pub reconnect_max_delay_millis: u64,
    pub reconnect_backoff_factor: f64,
    /// When set, a record that fails to parse as JSON closes the connection
    /// with `ProtocolError` instead of being dropped and counted (§4.1).
    pub strict: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            enable_heartbeat: true,
            heartbeat_interval_millis: 5_000,
            heartbeat_timeout_millis: 10_000,
            max_retries: 3,
            max_queue_size: 1_000,
            enable_compression: false,
            enable_encryption: false,
            connect_timeout_millis: 10_000,
            max_record_size: crate::framer::DEFAULT_MAX_RECORD_SIZE,
            reconnect_max_attempts: 5,
            reconnect_initial_delay_millis: 1_000,
            reconnect_max_delay_millis: 30_000,
            reconnect_backoff_factor: 1.5,
            strict: false,
        }
    }
}

impl SessionConfig {
    pub fn reconnect_policy(&self) -> crate::reconnect::ReconnectPolicy {
        crate::reconnect::ReconnectPolicy {
            max_attempts: self.reconnect_max_attempts,
            initial_delay: std::time::Duration::from_millis(self.reconnect_initial_delay_millis),
            max_delay: std::time::Duration::from_millis(self.reconnect_max_delay_millis),
            backoff_factor: self.reconnect_backoff_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = SessionConfig::default();
        assert!(cfg.enable_heartbeat);
        assert_eq!(cfg.heartbeat_interval_millis, 5_000);
        assert_eq!(cfg.heartbeat_timeout_millis, 10_000);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.max_queue_size, 1_000);
        assert!(!cfg.enable_compression);
        assert!(!cfg.enable_encryption);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = SessionConfig::default();
        let text = toml::to_string(&cfg).expect("serialize");
        let parsed: SessionConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(parsed.heartbeat_interval_millis, cfg.heartbeat_interval_millis);
    }
}
