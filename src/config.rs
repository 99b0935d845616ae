//! Session subsystem configuration
//!
//! Typed configuration for the session core. Hosts embedding this crate keep
//! their own top-level config document; [`SessionConfig::from_value`] extracts
//! the `sessions` section from such a document, falling back to defaults for
//! anything absent.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default idle timeout before a session expires (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// Default interval between validation sweeps (1 hour).
pub const DEFAULT_VALIDATION_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown session backend: {name}")]
    UnknownBackend { name: String },

    #[error("invalid sessions config: {0}")]
    Invalid(String),
}

/// Configuration for the session manager and its validation scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Idle timeout applied to newly started sessions, in milliseconds.
    /// Negative means sessions never expire.
    pub default_timeout_ms: i64,
    /// Whether invalid (expired or stopped) sessions are deleted from the
    /// backing store. When `false` they are retained for inspection and must
    /// be purged by some external process.
    pub delete_invalid_sessions: bool,
    /// How often the validation scheduler sweeps active sessions.
    pub validation_interval_ms: u64,
    /// Whether the validation scheduler should run at all.
    pub validation_enabled: bool,
    /// Name of the session backend to build from the [`super::session::BackendRegistry`].
    pub backend: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            delete_invalid_sessions: true,
            validation_interval_ms: DEFAULT_VALIDATION_INTERVAL_MS,
            validation_enabled: true,
            backend: "memory".to_string(),
        }
    }
}

impl SessionConfig {
    /// Build a `SessionConfig` from the `sessions` section of a host
    /// configuration document. A missing section yields the defaults; a
    /// present but malformed section is an error rather than silently
    /// ignored.
    pub fn from_value(cfg: &Value) -> Result<Self, ConfigError> {
        match cfg.get("sessions") {
            None => Ok(Self::default()),
            Some(section) => serde_json::from_value(section.clone())
                .map_err(|e| ConfigError::Invalid(e.to_string())),
        }
    }

    /// The validation sweep interval as a [`Duration`].
    pub fn validation_interval(&self) -> Duration {
        Duration::from_millis(self.validation_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_when_no_config() {
        let cfg = json!({});
        let sc = SessionConfig::from_value(&cfg).unwrap();
        assert_eq!(sc, SessionConfig::default());
        assert_eq!(sc.default_timeout_ms, DEFAULT_SESSION_TIMEOUT_MS);
        assert!(sc.delete_invalid_sessions);
        assert!(sc.validation_enabled);
        assert_eq!(sc.backend, "memory");
    }

    #[test]
    fn test_defaults_when_sessions_key_missing() {
        let cfg = json!({ "gateway": { "port": 3000 } });
        let sc = SessionConfig::from_value(&cfg).unwrap();
        assert_eq!(sc, SessionConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let cfg = json!({
            "sessions": {
                "defaultTimeoutMs": 1000
            }
        });
        let sc = SessionConfig::from_value(&cfg).unwrap();
        assert_eq!(sc.default_timeout_ms, 1000);
        assert_eq!(sc.validation_interval_ms, DEFAULT_VALIDATION_INTERVAL_MS); // default
        assert!(sc.delete_invalid_sessions);
    }

    #[test]
    fn test_full_override() {
        let cfg = json!({
            "sessions": {
                "defaultTimeoutMs": -1,
                "deleteInvalidSessions": false,
                "validationIntervalMs": 5000,
                "validationEnabled": false,
                "backend": "redis"
            }
        });
        let sc = SessionConfig::from_value(&cfg).unwrap();
        assert_eq!(sc.default_timeout_ms, -1);
        assert!(!sc.delete_invalid_sessions);
        assert_eq!(sc.validation_interval_ms, 5000);
        assert!(!sc.validation_enabled);
        assert_eq!(sc.backend, "redis");
    }

    #[test]
    fn test_malformed_section_is_an_error() {
        let cfg = json!({ "sessions": { "defaultTimeoutMs": "soon" } });
        let result = SessionConfig::from_value(&cfg);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_interval_duration() {
        let sc = SessionConfig {
            validation_interval_ms: 2500,
            ..Default::default()
        };
        assert_eq!(sc.validation_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn test_round_trip_serialization() {
        let sc = SessionConfig {
            default_timeout_ms: 60_000,
            delete_invalid_sessions: false,
            ..Default::default()
        };
        let json = serde_json::to_string(&sc).unwrap();
        let parsed: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sc);
    }
}
