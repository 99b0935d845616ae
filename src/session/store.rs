//! Session persistence
//!
//! Storage is split into three pieces. A [`SessionBackend`] is dumb keyed
//! persistence (insert, read, update, delete, enumerate). An [`IdGenerator`]
//! mints identifiers for new sessions. The [`CachingStore`] composes the two
//! behind a single API and fronts the backend with an active-session cache so
//! that hot reads and validation sweeps never touch the backend.
//!
//! Backends are registered by name in a [`BackendRegistry`] so hosts can
//! select one from configuration without this crate knowing about every
//! implementation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{Session, SessionError, SessionId};
use crate::config::ConfigError;

/// Mints identifiers for newly created sessions.
///
/// Generators may consult the session (for example to embed a shard hint)
/// but most will not. Generated ids must be unique with overwhelming
/// probability; the store treats a collision as a hard error.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, session: &Session) -> SessionId;
}

/// Default generator: random UUID v4, rendered in hyphenated form.
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self, _session: &Session) -> SessionId {
        SessionId::new(Uuid::new_v4().to_string())
    }
}

/// Keyed persistence for sessions.
///
/// Implementations do no lifecycle reasoning at all: they store and return
/// whatever session state they are handed. Failures surface as
/// [`SessionError::Storage`].
pub trait SessionBackend: Send + Sync {
    /// Persist a newly created session. The session already has its id.
    fn insert(&self, session: &Session) -> Result<(), SessionError>;

    /// Read a session by id. `Ok(None)` means the backend has no record of
    /// the id, which is not an error at this layer.
    fn read(&self, id: &SessionId) -> Result<Option<Session>, SessionError>;

    /// Overwrite the stored state for an existing session.
    fn update(&self, session: &Session) -> Result<(), SessionError>;

    /// Remove a session. Deleting an absent id is a no-op.
    fn delete(&self, id: &SessionId) -> Result<(), SessionError>;

    /// All sessions currently held by the backend.
    fn all(&self) -> Result<Vec<Session>, SessionError>;
}

/// In-memory backend backed by a hash map. The default backend, and the
/// reference implementation for the trait contract.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn insert(&self, session: &Session) -> Result<(), SessionError> {
        let id = session.require_id()?.clone();
        self.sessions.write().insert(id, session.clone());
        Ok(())
    }

    fn read(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        Ok(self.sessions.read().get(id).cloned())
    }

    fn update(&self, session: &Session) -> Result<(), SessionError> {
        self.insert(session)
    }

    fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.sessions.write().remove(id);
        Ok(())
    }

    fn all(&self) -> Result<Vec<Session>, SessionError> {
        Ok(self.sessions.read().values().cloned().collect())
    }
}

/// Cache of active sessions sitting in front of a backend.
pub trait SessionCache: Send + Sync {
    fn get(&self, id: &SessionId) -> Option<Session>;
    fn put(&self, session: Session);
    fn remove(&self, id: &SessionId);
    fn clear(&self);
    fn keys(&self) -> Vec<SessionId>;
    fn values(&self) -> Vec<Session>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded in-memory cache. Entries are evicted when their session goes
/// invalid, so the population tracks the active-session count.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for MemoryCache {
    fn get(&self, id: &SessionId) -> Option<Session> {
        self.entries.read().get(id).cloned()
    }

    fn put(&self, session: Session) {
        if let Some(id) = session.id() {
            self.entries.write().insert(id.clone(), session);
        }
    }

    fn remove(&self, id: &SessionId) {
        self.entries.write().remove(id);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn keys(&self) -> Vec<SessionId> {
        self.entries.read().keys().cloned().collect()
    }

    fn values(&self) -> Vec<Session> {
        self.entries.read().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Caching decorator over a [`SessionBackend`].
///
/// Reads consult the cache first and only fall through to the backend on a
/// miss. Updates write through to the backend and then keep the cache in
/// sync with validity: valid sessions are (re)cached, invalid ones evicted.
/// The backend write happens before any cache mutation so a storage failure
/// leaves the cache exactly as it was.
pub struct CachingStore {
    backend: Arc<dyn SessionBackend>,
    cache: Box<dyn SessionCache>,
    id_generator: Box<dyn IdGenerator>,
}

impl CachingStore {
    /// Build a store over the given backend with the default cache and id
    /// generator.
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            cache: Box::new(MemoryCache::new()),
            id_generator: Box::new(UuidGenerator),
        }
    }

    /// Replace the cache implementation.
    pub fn with_cache(mut self, cache: Box<dyn SessionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the id generator.
    pub fn with_id_generator(mut self, id_generator: Box<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Assign an id to the session, persist it, and cache it. Returns the
    /// identified session.
    pub fn create(&self, mut session: Session) -> Result<Session, SessionError> {
        let id = self.id_generator.generate(&session);
        // The existence check and the insert are not one atomic step, so
        // uniqueness ultimately rests on the id generator's entropy. This
        // catches a misbehaving generator, not a lost race between two
        // creates that drew the same id.
        if self.cache.get(&id).is_some() || self.backend.read(&id)?.is_some() {
            return Err(SessionError::DuplicateId(id));
        }
        session.assign_id(id);
        self.backend.insert(&session)?;
        self.cache.put(session.clone());
        debug!(session_id = %session.require_id()?, "session created");
        Ok(session)
    }

    /// Read a session, cache first. A backend hit on a cache miss re-caches
    /// the session, but only while it is valid; the cache stays an index of
    /// active sessions. An id that neither layer knows is
    /// [`SessionError::Unknown`].
    pub fn read(&self, id: &SessionId) -> Result<Session, SessionError> {
        if let Some(session) = self.cache.get(id) {
            trace!(session_id = %id, "session cache hit");
            return Ok(session);
        }
        let session = self
            .backend
            .read(id)?
            .ok_or_else(|| SessionError::Unknown(id.clone()))?;
        if session.is_valid() {
            self.cache.put(session.clone());
        }
        Ok(session)
    }

    /// Write the session through to the backend, then reconcile the cache:
    /// valid sessions stay cached, invalid ones are evicted.
    pub fn update(&self, session: &Session) -> Result<(), SessionError> {
        let id = session.require_id()?.clone();
        self.backend.update(session)?;
        if session.is_valid() {
            self.cache.put(session.clone());
        } else {
            trace!(session_id = %id, "evicting invalid session from cache");
            self.cache.remove(&id);
        }
        Ok(())
    }

    /// Remove the session from the backend and the cache.
    pub fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.backend.delete(id)?;
        self.cache.remove(id);
        Ok(())
    }

    /// The active sessions, straight from the cache. The cache is the index
    /// of live sessions; invalid ones have already been evicted by
    /// [`CachingStore::update`].
    pub fn active_sessions(&self) -> Vec<Session> {
        self.cache.values()
    }

    /// Number of cached (active) sessions.
    pub fn active_count(&self) -> usize {
        self.cache.len()
    }
}

type BackendBuilder = Box<dyn Fn() -> Arc<dyn SessionBackend> + Send + Sync>;

/// Registry of named backend constructors.
///
/// Hosts register every backend they link in, then build the one named in
/// [`crate::config::SessionConfig::backend`]. Keeps backend selection a
/// plain string-to-constructor lookup with no global state.
#[derive(Default)]
pub struct BackendRegistry {
    builders: HashMap<String, BackendBuilder>,
}

impl BackendRegistry {
    /// An empty registry with no backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `memory` backend registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", || Arc::new(MemoryBackend::new()));
        registry
    }

    /// Register a backend constructor under a name. Re-registering a name
    /// replaces the previous constructor.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: impl Fn() -> Arc<dyn SessionBackend> + Send + Sync + 'static,
    ) {
        self.builders.insert(name.into(), Box::new(builder));
    }

    /// Build the backend registered under `name`.
    pub fn build(&self, name: &str) -> Result<Arc<dyn SessionBackend>, ConfigError> {
        match self.builders.get(name) {
            Some(builder) => Ok(builder()),
            None => Err(ConfigError::UnknownBackend {
                name: name.to_string(),
            }),
        }
    }

    /// The registered backend names, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}
