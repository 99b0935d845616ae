//! Session management core
//!
//! Server-side sessions with timeout-based expiry, independent of any
//! transport. The pieces compose rather than inherit: a plain [`Session`]
//! entity, a [`SessionBackend`] persistence trait, a [`CachingStore`]
//! decorator that fronts any backend with an active-session cache, a
//! [`SessionManager`] that owns all lifecycle transitions, and a
//! [`ValidationScheduler`] that sweeps for expired sessions in the
//! background.

pub mod entity;
pub mod listener;
pub mod manager;
pub mod scheduler;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use entity::Session;
pub use listener::{ListenerRegistry, SessionCallback, SessionListener};
pub use manager::{SessionContext, SessionManager, SweepOutcome};
pub use scheduler::ValidationScheduler;
pub use store::{
    BackendRegistry, CachingStore, IdGenerator, MemoryBackend, MemoryCache, SessionBackend,
    SessionCache, UuidGenerator,
};

/// Opaque identifier for a session.
///
/// Ids are uninterpreted tokens: the store assigns them at creation time and
/// callers pass them back verbatim. Nothing in this crate parses or derives
/// meaning from the token's contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing token. Intended for backends that mint or persist
    /// their own identifiers.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error types for session operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The requested id exists in neither the cache nor the backing store.
    #[error("unknown session: {0}")]
    Unknown(SessionId),
    /// The session was explicitly stopped; no further interaction is allowed.
    #[error("session {id} has been stopped")]
    Stopped { id: SessionId },
    /// The session idle timeout was exceeded.
    #[error("session {id} has expired (last access {last_access_time}, timeout {timeout_ms}ms)")]
    Expired {
        id: SessionId,
        last_access_time: i64,
        timeout_ms: i64,
    },
    /// The referenced session was invalid and a replacement was started on
    /// the caller's behalf. Carries both ids so the caller can re-bind.
    #[error("session {old} was invalid and has been replaced by {new}")]
    Replaced { old: SessionId, new: SessionId },
    /// The backend produced an id that is already cached. Duplicate ids
    /// corrupt the active-session index, so this is non-recoverable.
    #[error("backend returned a session id that is already in use: {0}")]
    DuplicateId(SessionId),
    /// A session was used before the store assigned it an id.
    #[error("session has not been assigned an id by the store")]
    Unidentified,
    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// True for the invalid-session family: the session exists (or existed)
    /// but is no longer usable. Distinct from [`SessionError::Unknown`].
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::Expired { .. })
    }
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
