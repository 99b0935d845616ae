//! Session entity
//!
//! A [`Session`] is the mutable record of one logical interaction context:
//! identifier, timestamps, idle timeout, terminal flags, and an arbitrary
//! attribute map. The entity carries no concurrency control of its own;
//! callers (the manager) serialize access per session id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::{now_millis, SessionError, SessionId};
use crate::config::DEFAULT_SESSION_TIMEOUT_MS;

/// A server-side session.
///
/// Validity is a pure function of two terminal flags: a session is valid iff
/// it has no stop timestamp and is not marked expired. Both flags are
/// one-way; once set they are never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier, assigned exactly once by the store at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<SessionId>,
    /// Timestamp when the session was started (Unix ms)
    start_timestamp: i64,
    /// Timestamp of the most recent access (Unix ms)
    last_access_time: i64,
    /// Timestamp when the session was stopped, if it has been (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_timestamp: Option<i64>,
    /// Idle timeout in milliseconds; negative means never expires
    timeout_ms: i64,
    /// Whether the session expired due to inactivity
    expired: bool,
    /// Originating host address, when the transport supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    /// Arbitrary attribute map
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<String, Value>,
}

impl Session {
    /// Create a new, unidentified session. The id is assigned later by the
    /// store; until then the session cannot be persisted or retrieved.
    pub fn new(host: Option<String>) -> Self {
        let now = now_millis();
        Self {
            id: None,
            start_timestamp: now,
            last_access_time: now,
            stop_timestamp: None,
            timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            expired: false,
            host,
            attributes: HashMap::new(),
        }
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// The session id, or [`SessionError::Unidentified`] if the store has
    /// not assigned one yet.
    pub fn require_id(&self) -> Result<&SessionId, SessionError> {
        self.id.as_ref().ok_or(SessionError::Unidentified)
    }

    /// Assign the id. Called by the store during creation, exactly once.
    pub(crate) fn assign_id(&mut self, id: SessionId) {
        debug_assert!(self.id.is_none(), "session id assigned twice");
        self.id = Some(id);
    }

    pub fn start_timestamp(&self) -> i64 {
        self.start_timestamp
    }

    pub fn last_access_time(&self) -> i64 {
        self.last_access_time
    }

    pub fn stop_timestamp(&self) -> Option<i64> {
        self.stop_timestamp
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    pub fn set_timeout(&mut self, timeout_ms: i64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_timestamp.is_some()
    }

    pub fn is_valid(&self) -> bool {
        !self.is_stopped() && !self.is_expired()
    }

    /// Record an access, pushing back the idle deadline.
    pub fn touch(&mut self) -> Result<(), SessionError> {
        self.check_valid()?;
        self.last_access_time = now_millis();
        Ok(())
    }

    /// Terminally stop the session. A second call fails with the
    /// already-stopped error and leaves the original stop timestamp intact.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.check_valid()?;
        let now = now_millis();
        self.stop_timestamp = Some(now);
        // The stop itself counts as the final access.
        self.last_access_time = now;
        Ok(())
    }

    /// Mark the session expired. Manager-only: expiry authority lives with
    /// the lifecycle owner, not with arbitrary callers.
    pub(crate) fn expire(&mut self) {
        if self.stop_timestamp.is_none() {
            self.stop_timestamp = Some(now_millis());
        }
        self.expired = true;
    }

    /// Whether the idle timeout has been exceeded as of `now`.
    pub fn is_timed_out(&self, now: i64) -> bool {
        if self.expired {
            return true;
        }
        if self.timeout_ms >= 0 {
            now - self.last_access_time > self.timeout_ms
        } else {
            trace!(session_id = ?self.id, "session has no timeout; never considered expired");
            false
        }
    }

    /// Check the terminal flags and the idle timeout, transitioning to
    /// expired when the timeout has been exceeded.
    ///
    /// Returns the distinct stopped/expired error so callers can tell the
    /// two invalidation causes apart.
    pub fn validate(&mut self, now: i64) -> Result<(), SessionError> {
        if self.is_stopped() && !self.is_expired() {
            return Err(SessionError::Stopped {
                id: self.require_id()?.clone(),
            });
        }
        if self.is_timed_out(now) {
            let last_access_time = self.last_access_time;
            let timeout_ms = self.timeout_ms;
            self.expire();
            return Err(SessionError::Expired {
                id: self.require_id()?.clone(),
                last_access_time,
                timeout_ms,
            });
        }
        Ok(())
    }

    /// Flag-only validity check (no timeout evaluation).
    fn check_valid(&self) -> Result<(), SessionError> {
        if self.is_expired() {
            return Err(SessionError::Expired {
                id: self.require_id()?.clone(),
                last_access_time: self.last_access_time,
                timeout_ms: self.timeout_ms,
            });
        }
        if self.is_stopped() {
            return Err(SessionError::Stopped {
                id: self.require_id()?.clone(),
            });
        }
        Ok(())
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set an attribute. A `Null` value is equivalent to removal. Attribute
    /// mutation is only legal on a valid session.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, SessionError> {
        self.check_valid()?;
        let key = key.into();
        if value.is_null() {
            return Ok(self.attributes.remove(&key));
        }
        Ok(self.attributes.insert(key, value))
    }

    /// Remove an attribute, returning the previous value if any.
    pub fn remove_attribute(&mut self, key: &str) -> Result<Option<Value>, SessionError> {
        self.check_valid()?;
        Ok(self.attributes.remove(key))
    }

    pub fn attribute_keys(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }
}
