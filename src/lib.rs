//! palisade session core
//!
//! This library provides the session-management core of a security framework:
//! session entities with timeout-based expiry, a pluggable persistence layer
//! with a transparent caching decorator, a background validation scheduler,
//! and lifecycle listener notifications.
//!
//! Transport adapters (HTTP filters, RPC endpoints, etc.) live outside this
//! crate and talk to a [`session::SessionManager`] by opaque session id.

pub mod config;
pub mod logging;
pub mod session;

pub use config::{ConfigError, SessionConfig};
pub use session::{
    BackendRegistry, CachingStore, ListenerRegistry, MemoryBackend, MemoryCache, Session,
    SessionBackend, SessionCache, SessionContext, SessionError, SessionId, SessionListener,
    SessionManager, SweepOutcome, ValidationScheduler,
};
