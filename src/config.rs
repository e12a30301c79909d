// src/config.rs
use serde::Deserialize;

/// Tunables consumed by the event loop. Loading (file, env, CLI) is the
/// embedder's concern; the engine only reads the resolved values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Keepalive reuses granted per connection before idle expiry stops applying.
    pub max_keepalive_reuses: u32,
    /// Idle window (seconds) for a keptalive connection with no next request yet.
    /// Zero disables the keepalive path in wait-timeout computation.
    pub keepalive_timeout_secs: u64,
    /// Absolute per-request timeout (seconds).
    pub request_timeout_secs: u64,
    /// Maximum readiness events consumed per wait call.
    pub event_capacity: usize,
    /// Connection table capacity.
    pub max_connections: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_keepalive_reuses: 100,
            keepalive_timeout_secs: 30,
            request_timeout_secs: 60,
            event_capacity: 1024,
            max_connections: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = LoopConfig::default();
        assert!(cfg.keepalive_timeout_secs < cfg.request_timeout_secs);
        assert!(cfg.event_capacity > 0);
        assert!(cfg.max_connections > 0);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let cfg: LoopConfig =
            serde_json::from_str(r#"{"keepalive_timeout_secs": 5}"#).unwrap();
        assert_eq!(cfg.keepalive_timeout_secs, 5);
        assert_eq!(cfg.request_timeout_secs, 60);
        assert_eq!(cfg.max_keepalive_reuses, 100);
    }
}
