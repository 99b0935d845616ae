//! Session lifecycle manager
//!
//! The [`SessionManager`] owns every lifecycle transition: it starts
//! sessions, validates them on access, expires the idle ones, and fans
//! lifecycle events out to registered listeners. All state lives in the
//! [`CachingStore`]; the manager itself only holds a per-id lock map that
//! serializes concurrent read-modify-write cycles on the same session.
//!
//! Invalidation follows a strict order: the terminal state is persisted
//! first, listeners are notified second, and deletion (when configured)
//! happens last. A storage failure therefore leaves the session observable
//! and the work retryable on the next sweep, and no listener ever fires for
//! a transition that was not persisted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::listener::ListenerRegistry;
use super::store::{BackendRegistry, CachingStore, MemoryBackend, SessionBackend};
use super::{now_millis, Session, SessionError, SessionId};
use crate::config::{ConfigError, SessionConfig};

/// Explicit inputs for starting a session. Passed by the caller rather than
/// plucked from any ambient state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Originating host, if the transport knows one.
    pub host: Option<String>,
    /// Idle timeout override; `None` uses the configured default.
    pub timeout_ms: Option<i64>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Result of one validation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    /// Sessions examined.
    pub checked: usize,
    /// Sessions found invalid and disposed of during this sweep.
    pub invalidated: usize,
    /// Sessions whose validation hit a storage failure. These stay cached
    /// and are retried on the next sweep.
    pub failed: usize,
}

/// Manages session lifecycles over a [`CachingStore`].
pub struct SessionManager {
    store: CachingStore,
    listeners: ListenerRegistry,
    config: SessionConfig,
    /// Per-session locks serializing read-modify-write cycles. Entries are
    /// created on demand and released at disposal or when a lookup ends
    /// unknown, invalid, or replaced, keeping the map bounded by the
    /// live-session count. State is persisted before an entry is released,
    /// so a latecomer on a fresh lock observes the final state.
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            store: CachingStore::new(backend),
            listeners: ListenerRegistry::new(),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// A manager over the in-memory backend with default configuration.
    pub fn in_memory() -> Self {
        Self::new(SessionConfig::default(), Arc::new(MemoryBackend::new()))
    }

    /// Build a manager whose backend is looked up by the configured name.
    pub fn from_registry(
        config: SessionConfig,
        registry: &BackendRegistry,
    ) -> Result<Self, ConfigError> {
        let backend = registry.build(&config.backend)?;
        Ok(Self::new(config, backend))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The listener registry; register [`super::SessionListener`]s here.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Number of currently active (valid, cached) sessions.
    pub fn active_session_count(&self) -> usize {
        self.store.active_count()
    }

    /// Start a new session and notify listeners.
    pub fn start(&self, context: SessionContext) -> Result<Session, SessionError> {
        let mut session = Session::new(context.host);
        session.set_timeout(
            context
                .timeout_ms
                .unwrap_or(self.config.default_timeout_ms),
        );
        let session = self.store.create(session)?;
        info!(session_id = %session.require_id()?, host = ?session.host(), "session started");
        self.listeners.notify_start(&session);
        Ok(session)
    }

    /// Look up a session and validate it.
    ///
    /// If the lookup detects that the session's idle timeout has elapsed,
    /// the session is expired right here: persisted as expired, listeners
    /// notified exactly once, and deleted when configured. The caller gets
    /// the [`SessionError::Expired`] error either way.
    pub fn retrieve(&self, id: &SessionId) -> Result<Session, SessionError> {
        self.with_lock(id, || self.checked_session(id))
    }

    /// Like [`SessionManager::retrieve`], but when the session turns out to
    /// be invalid a replacement is started on the caller's behalf using the
    /// given context (falling back to the dead session's host). Returns
    /// [`SessionError::Replaced`] carrying both ids so the caller can
    /// re-bind to the new session.
    pub fn retrieve_or_replace(
        &self,
        id: &SessionId,
        context: SessionContext,
    ) -> Result<Session, SessionError> {
        self.with_lock(id, || {
            // Capture the host before validation; disposal may delete the
            // record.
            let previous_host = self.store.read(id)?.host().map(str::to_string);

            match self.checked_session(id) {
                Ok(session) => Ok(session),
                Err(e) if e.is_invalid() => {
                    let context = SessionContext {
                        host: context.host.or(previous_host),
                        timeout_ms: context.timeout_ms,
                    };
                    let replacement = self.start(context)?;
                    let new = replacement.require_id()?.clone();
                    warn!(old = %id, new = %new, "invalid session replaced");
                    Err(SessionError::Replaced {
                        old: id.clone(),
                        new,
                    })
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Record an access on the session, pushing back its idle deadline.
    pub fn touch(&self, id: &SessionId) -> Result<(), SessionError> {
        self.mutate(id, |session| session.touch())
    }

    /// Explicitly stop a session. Persists the stop, notifies listeners
    /// exactly once, and deletes the record when configured. Stopping an
    /// already-invalid session fails with that session's invalid error and
    /// notifies no one.
    pub fn stop(&self, id: &SessionId) -> Result<(), SessionError> {
        self.with_lock(id, || {
            let mut session = self.checked_session(id)?;
            session.stop()?;
            self.dispose_invalid(&session)
        })
    }

    /// Validate the session, surfacing the exact error when it is not
    /// usable. Expiry detected during the check is processed as in
    /// [`SessionManager::retrieve`].
    pub fn check_valid(&self, id: &SessionId) -> Result<(), SessionError> {
        self.retrieve(id).map(|_| ())
    }

    /// Whether the id refers to a currently valid session.
    pub fn is_valid(&self, id: &SessionId) -> bool {
        self.check_valid(id).is_ok()
    }

    pub fn host(&self, id: &SessionId) -> Result<Option<String>, SessionError> {
        Ok(self.retrieve(id)?.host().map(str::to_string))
    }

    pub fn start_timestamp(&self, id: &SessionId) -> Result<i64, SessionError> {
        Ok(self.retrieve(id)?.start_timestamp())
    }

    pub fn last_access_time(&self, id: &SessionId) -> Result<i64, SessionError> {
        Ok(self.retrieve(id)?.last_access_time())
    }

    pub fn timeout(&self, id: &SessionId) -> Result<i64, SessionError> {
        Ok(self.retrieve(id)?.timeout_ms())
    }

    /// Change the session's idle timeout. Takes effect immediately.
    pub fn set_timeout(&self, id: &SessionId, timeout_ms: i64) -> Result<(), SessionError> {
        self.mutate(id, |session| {
            session.set_timeout(timeout_ms);
            Ok(())
        })
    }

    pub fn attribute(&self, id: &SessionId, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.retrieve(id)?.attribute(key).cloned())
    }

    pub fn attribute_keys(&self, id: &SessionId) -> Result<Vec<String>, SessionError> {
        Ok(self
            .retrieve(id)?
            .attribute_keys()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Set an attribute on the session, returning any previous value. A
    /// `Null` value removes the attribute.
    pub fn set_attribute(
        &self,
        id: &SessionId,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, SessionError> {
        let mut previous = None;
        self.mutate(id, |session| {
            previous = session.set_attribute(key, value)?;
            Ok(())
        })?;
        Ok(previous)
    }

    /// Remove an attribute from the session, returning its value if present.
    pub fn remove_attribute(
        &self,
        id: &SessionId,
        key: &str,
    ) -> Result<Option<Value>, SessionError> {
        let mut previous = None;
        self.mutate(id, |session| {
            previous = session.remove_attribute(key)?;
            Ok(())
        })?;
        Ok(previous)
    }

    /// Validate every active session, expiring the timed-out ones. Each
    /// session is handled independently: a storage failure on one is logged
    /// and counted, and the sweep moves on to the next.
    pub fn validate_sessions(&self) -> SweepOutcome {
        let snapshot = self.store.active_sessions();
        debug!(count = snapshot.len(), "validating active sessions");

        let mut outcome = SweepOutcome::default();
        for session in snapshot {
            let Some(id) = session.id().cloned() else {
                continue;
            };
            outcome.checked += 1;

            match self.with_lock(&id, || self.checked_session(&id)) {
                Ok(_) => {}
                Err(e) if e.is_invalid() => {
                    debug!(session_id = %id, error = %e, "session invalidated by sweep");
                    outcome.invalidated += 1;
                }
                // Removed by a concurrent stop between the snapshot and now.
                Err(SessionError::Unknown(_)) => {}
                Err(e) => {
                    warn!(session_id = %id, error = %e, "session validation failed; will retry next sweep");
                    outcome.failed += 1;
                }
            }
        }

        if outcome.invalidated > 0 || outcome.failed > 0 {
            info!(
                checked = outcome.checked,
                invalidated = outcome.invalidated,
                failed = outcome.failed,
                "validation sweep complete"
            );
        }
        outcome
    }

    /// Read the session and validate it, expiring and disposing of it when
    /// the idle timeout has elapsed. Caller must hold the per-id lock.
    fn checked_session(&self, id: &SessionId) -> Result<Session, SessionError> {
        let mut session = self.store.read(id)?;
        let was_valid = session.is_valid();
        if let Err(e) = session.validate(now_millis()) {
            // Dispose only on the transition; an already-invalid session
            // was disposed of (and its listeners notified) when it first
            // went invalid.
            if e.is_invalid() && was_valid {
                self.dispose_invalid(&session)?;
            }
            return Err(e);
        }
        Ok(session)
    }

    /// Persist a freshly invalidated session, notify listeners, and delete
    /// the record when configured. Caller must hold the per-id lock and the
    /// session must carry its terminal flags already.
    fn dispose_invalid(&self, session: &Session) -> Result<(), SessionError> {
        let id = session.require_id()?.clone();
        self.store.update(session)?;
        if session.is_expired() {
            info!(session_id = %id, "session expired");
            self.listeners.notify_expiration(session);
        } else {
            info!(session_id = %id, "session stopped");
            self.listeners.notify_stop(session);
        }
        if self.config.delete_invalid_sessions {
            self.store.delete(&id)?;
        }
        self.discard_lock(&id);
        Ok(())
    }

    /// Run a validated read-modify-write cycle under the per-id lock.
    fn mutate(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        self.with_lock(id, || {
            let mut session = self.checked_session(id)?;
            f(&mut session)?;
            self.store.update(&session)
        })
    }

    /// Run `f` under the per-id lock. A lock entry lives only while its
    /// session can still be mutated: when the operation reports the id
    /// unknown, invalid, or replaced, the entry is dropped again so bogus
    /// and dead ids cannot grow the lock map.
    fn with_lock<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce() -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let lock = self.lock_for(id);
        let guard = lock.lock();
        let result = f();
        drop(guard);
        if let Err(e) = &result {
            if matches!(e, SessionError::Unknown(_) | SessionError::Replaced { .. })
                || e.is_invalid()
            {
                self.discard_lock(id);
            }
        }
        result
    }

    fn lock_for(&self, id: &SessionId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(id.clone()).or_default().clone()
    }

    fn discard_lock(&self, id: &SessionId) {
        self.locks.lock().remove(id);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn create_test_manager() -> SessionManager {
        SessionManager::in_memory()
    }

    fn expiration_counter(manager: &SessionManager) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        manager.listeners().register(
            super::super::SessionListener::new().with_on_expiration(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        count
    }

    #[test]
    fn test_start_uses_configured_default_timeout() {
        let config = SessionConfig {
            default_timeout_ms: 1234,
            ..Default::default()
        };
        let manager = SessionManager::new(config, Arc::new(MemoryBackend::new()));
        let session = manager.start(SessionContext::new()).unwrap();
        assert_eq!(session.timeout_ms(), 1234);
        assert_eq!(manager.active_session_count(), 1);
    }

    #[test]
    fn test_start_context_overrides() {
        let manager = create_test_manager();
        let session = manager
            .start(
                SessionContext::new()
                    .with_host("192.168.1.9")
                    .with_timeout_ms(-1),
            )
            .unwrap();
        assert_eq!(session.host(), Some("192.168.1.9"));
        assert_eq!(session.timeout_ms(), -1);
    }

    #[test]
    fn test_start_notifies_listeners() {
        let manager = create_test_manager();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        manager.listeners().register(
            super::super::SessionListener::new().with_on_start(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        manager.start(SessionContext::new()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retrieve_valid_session() {
        let manager = create_test_manager();
        let session = manager.start(SessionContext::new()).unwrap();
        let id = session.require_id().unwrap();
        let retrieved = manager.retrieve(id).unwrap();
        assert_eq!(retrieved.id(), session.id());
    }

    #[test]
    fn test_retrieve_unknown_session() {
        let manager = create_test_manager();
        let result = manager.retrieve(&SessionId::new("missing"));
        assert!(matches!(result, Err(SessionError::Unknown(_))));
    }

    #[test]
    fn test_expired_session_is_disposed_and_notified_once() {
        let manager = create_test_manager();
        let expirations = expiration_counter(&manager);

        let session = manager
            .start(SessionContext::new().with_timeout_ms(20))
            .unwrap();
        let id = session.require_id().unwrap().clone();
        std::thread::sleep(Duration::from_millis(40));

        let result = manager.retrieve(&id);
        assert!(matches!(result, Err(SessionError::Expired { .. })));
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_session_count(), 0);

        // Deleted by default configuration, so a second retrieve is Unknown
        // and must not re-notify.
        let result = manager.retrieve(&id);
        assert!(matches!(result, Err(SessionError::Unknown(_))));
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_session_retained_when_delete_disabled() {
        let config = SessionConfig {
            delete_invalid_sessions: false,
            ..Default::default()
        };
        let manager = SessionManager::new(config, Arc::new(MemoryBackend::new()));
        let expirations = expiration_counter(&manager);

        let session = manager
            .start(SessionContext::new().with_timeout_ms(20))
            .unwrap();
        let id = session.require_id().unwrap().clone();
        std::thread::sleep(Duration::from_millis(40));

        assert!(matches!(
            manager.retrieve(&id),
            Err(SessionError::Expired { .. })
        ));
        // The record survives for inspection but subsequent retrieves keep
        // failing and never notify again.
        assert!(matches!(
            manager.retrieve(&id),
            Err(SessionError::Expired { .. })
        ));
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_touch_pushes_back_expiry() {
        let manager = create_test_manager();
        let session = manager
            .start(SessionContext::new().with_timeout_ms(100))
            .unwrap();
        let id = session.require_id().unwrap().clone();

        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(60));
            manager.touch(&id).unwrap();
        }
        // 180ms of wall time, but never more than 60ms idle.
        assert!(manager.retrieve(&id).is_ok());
    }

    #[test]
    fn test_stop_notifies_once_and_second_stop_fails() {
        let config = SessionConfig {
            delete_invalid_sessions: false,
            ..Default::default()
        };
        let manager = SessionManager::new(config, Arc::new(MemoryBackend::new()));
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = stops.clone();
        manager.listeners().register(
            super::super::SessionListener::new().with_on_stop(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let session = manager.start(SessionContext::new()).unwrap();
        let id = session.require_id().unwrap().clone();

        manager.stop(&id).unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        let result = manager.stop(&id);
        assert!(matches!(result, Err(SessionError::Stopped { .. })));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_deletes_when_configured() {
        let manager = create_test_manager();
        let session = manager.start(SessionContext::new()).unwrap();
        let id = session.require_id().unwrap().clone();

        manager.stop(&id).unwrap();
        assert!(matches!(
            manager.retrieve(&id),
            Err(SessionError::Unknown(_))
        ));
    }

    #[test]
    fn test_attribute_round_trip_through_manager() {
        let manager = create_test_manager();
        let session = manager.start(SessionContext::new()).unwrap();
        let id = session.require_id().unwrap().clone();

        let prev = manager.set_attribute(&id, "user", json!("alice")).unwrap();
        assert!(prev.is_none());
        assert_eq!(manager.attribute(&id, "user").unwrap(), Some(json!("alice")));
        assert_eq!(manager.attribute_keys(&id).unwrap(), vec!["user"]);

        let removed = manager.remove_attribute(&id, "user").unwrap();
        assert_eq!(removed, Some(json!("alice")));
        assert_eq!(manager.attribute(&id, "user").unwrap(), None);
    }

    #[test]
    fn test_set_timeout_is_persisted() {
        let manager = create_test_manager();
        let session = manager.start(SessionContext::new()).unwrap();
        let id = session.require_id().unwrap().clone();

        manager.set_timeout(&id, -1).unwrap();
        assert_eq!(manager.timeout(&id).unwrap(), -1);
    }

    #[test]
    fn test_infinite_timeout_never_expires() {
        let manager = create_test_manager();
        let session = manager
            .start(SessionContext::new().with_timeout_ms(-1))
            .unwrap();
        let id = session.require_id().unwrap().clone();

        std::thread::sleep(Duration::from_millis(30));
        assert!(manager.retrieve(&id).is_ok());
        assert_eq!(manager.validate_sessions().invalidated, 0);
    }

    #[test]
    fn test_retrieve_or_replace_valid_session_passes_through() {
        let manager = create_test_manager();
        let session = manager.start(SessionContext::new()).unwrap();
        let id = session.require_id().unwrap();
        let retrieved = manager
            .retrieve_or_replace(id, SessionContext::new())
            .unwrap();
        assert_eq!(retrieved.id(), session.id());
        assert_eq!(manager.active_session_count(), 1);
    }

    #[test]
    fn test_retrieve_or_replace_starts_replacement() {
        let manager = create_test_manager();
        let session = manager
            .start(
                SessionContext::new()
                    .with_host("10.1.1.1")
                    .with_timeout_ms(20),
            )
            .unwrap();
        let id = session.require_id().unwrap().clone();
        std::thread::sleep(Duration::from_millis(40));

        let result = manager.retrieve_or_replace(&id, SessionContext::new());
        let Err(SessionError::Replaced { old, new }) = result else {
            panic!("expected Replaced, got {result:?}");
        };
        assert_eq!(old, id);
        assert_ne!(new, old);
        // Replacement inherits the host of the session it replaced.
        assert_eq!(manager.host(&new).unwrap(), Some("10.1.1.1".to_string()));
    }

    #[test]
    fn test_retrieve_or_replace_unknown_id_is_not_replaced() {
        let manager = create_test_manager();
        let result = manager.retrieve_or_replace(&SessionId::new("gone"), SessionContext::new());
        assert!(matches!(result, Err(SessionError::Unknown(_))));
        assert_eq!(manager.active_session_count(), 0);
    }

    #[test]
    fn test_validate_sessions_expires_only_timed_out() {
        let manager = create_test_manager();
        let expirations = expiration_counter(&manager);

        let short = manager
            .start(SessionContext::new().with_timeout_ms(20))
            .unwrap();
        let long = manager
            .start(SessionContext::new().with_timeout_ms(60_000))
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));

        let outcome = manager.validate_sessions();
        assert_eq!(outcome.checked, 2);
        assert_eq!(outcome.invalidated, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(expirations.load(Ordering::SeqCst), 1);

        assert!(matches!(
            manager.retrieve(short.require_id().unwrap()),
            Err(SessionError::Unknown(_))
        ));
        assert!(manager.retrieve(long.require_id().unwrap()).is_ok());
    }

    #[test]
    fn test_sweep_after_disposal_is_a_no_op() {
        let manager = create_test_manager();
        let expirations = expiration_counter(&manager);
        manager
            .start(SessionContext::new().with_timeout_ms(20))
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(manager.validate_sessions().invalidated, 1);
        let second = manager.validate_sessions();
        assert_eq!(second.checked, 0);
        assert_eq!(second.invalidated, 0);
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_ids_do_not_accumulate_lock_entries() {
        let manager = create_test_manager();
        for i in 0..1000 {
            let result = manager.retrieve(&SessionId::new(format!("bogus-{i}")));
            assert!(matches!(result, Err(SessionError::Unknown(_))));
        }
        assert_eq!(manager.lock_count(), 0);
    }

    #[test]
    fn test_lock_entry_discarded_after_disposal() {
        let manager = create_test_manager();
        let session = manager
            .start(SessionContext::new().with_timeout_ms(20))
            .unwrap();
        let id = session.require_id().unwrap().clone();
        assert_eq!(manager.lock_count(), 0);

        // A live session keeps its entry across the operation.
        manager.touch(&id).unwrap();
        assert_eq!(manager.lock_count(), 1);

        std::thread::sleep(Duration::from_millis(40));
        assert!(matches!(
            manager.retrieve(&id),
            Err(SessionError::Expired { .. })
        ));
        assert_eq!(manager.lock_count(), 0);

        // A later lookup of the disposed id must not re-create the entry.
        assert!(matches!(
            manager.retrieve(&id),
            Err(SessionError::Unknown(_))
        ));
        assert_eq!(manager.lock_count(), 0);
    }

    #[test]
    fn test_stopped_and_replaced_ids_release_lock_entries() {
        let manager = create_test_manager();

        let stopped = manager.start(SessionContext::new()).unwrap();
        let stopped_id = stopped.require_id().unwrap().clone();
        manager.stop(&stopped_id).unwrap();
        assert_eq!(manager.lock_count(), 0);

        let expired = manager
            .start(SessionContext::new().with_timeout_ms(20))
            .unwrap();
        let expired_id = expired.require_id().unwrap().clone();
        std::thread::sleep(Duration::from_millis(40));
        let result = manager.retrieve_or_replace(&expired_id, SessionContext::new());
        assert!(matches!(result, Err(SessionError::Replaced { .. })));
        // Starting the replacement takes no lock, and the dead id's entry
        // is released, so nothing remains in the map.
        assert_eq!(manager.lock_count(), 0);
        let _ = manager.retrieve(&expired_id);
        assert_eq!(manager.lock_count(), 0);
    }

    #[test]
    fn test_check_valid_surfaces_exact_error() {
        let manager = create_test_manager();
        let session = manager
            .start(SessionContext::new().with_timeout_ms(20))
            .unwrap();
        let id = session.require_id().unwrap().clone();

        assert!(manager.check_valid(&id).is_ok());
        std::thread::sleep(Duration::from_millis(40));
        assert!(matches!(
            manager.check_valid(&id),
            Err(SessionError::Expired { .. })
        ));
        // Disposed by the check above, so the id is now unknown.
        assert!(matches!(
            manager.check_valid(&id),
            Err(SessionError::Unknown(_))
        ));
        assert!(matches!(
            manager.check_valid(&SessionId::new("missing")),
            Err(SessionError::Unknown(_))
        ));
    }
}
