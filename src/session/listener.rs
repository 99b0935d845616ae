//! Session lifecycle notifications
//!
//! Interested parties register a [`SessionListener`] with the manager's
//! [`ListenerRegistry`] and receive callbacks on the three lifecycle events:
//! start, stop, and expiration. Each callback is independently optional, so
//! a listener that only cares about expirations registers just that one.
//!
//! Listener callbacks run synchronously on the thread that triggered the
//! transition, after the new state has been persisted. A panicking callback
//! is caught and logged; it never disturbs the session transition itself or
//! the remaining listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::Session;

/// A single lifecycle callback. Receives the session in its post-transition
/// state (for stop and expiration, the terminal flags are already set).
pub type SessionCallback = Arc<dyn Fn(&Session) + Send + Sync>;

/// A set of optional lifecycle callbacks.
///
/// Built with the `with_on_*` methods; unset callbacks are simply skipped
/// at dispatch time.
#[derive(Clone, Default)]
pub struct SessionListener {
    on_start: Option<SessionCallback>,
    on_stop: Option<SessionCallback>,
    on_expiration: Option<SessionCallback>,
}

impl SessionListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a session is started.
    pub fn with_on_start(mut self, f: impl Fn(&Session) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Called when a session is explicitly stopped.
    pub fn with_on_stop(mut self, f: impl Fn(&Session) + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(f));
        self
    }

    /// Called when a session expires due to inactivity. Fired at most once
    /// per session, at the moment the expiry is detected.
    pub fn with_on_expiration(mut self, f: impl Fn(&Session) + Send + Sync + 'static) -> Self {
        self.on_expiration = Some(Arc::new(f));
        self
    }
}

/// The three lifecycle events a listener can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleEvent {
    Start,
    Stop,
    Expiration,
}

impl LifecycleEvent {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Expiration => "expiration",
        }
    }
}

/// Holds registered listeners and fans lifecycle events out to them.
///
/// Dispatch happens under a read lock, so callbacks must not register or
/// remove listeners from within a callback.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<SessionListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: SessionListener) {
        self.listeners.write().push(listener);
    }

    /// Remove all registered listeners.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn notify_start(&self, session: &Session) {
        self.dispatch(LifecycleEvent::Start, session);
    }

    pub fn notify_stop(&self, session: &Session) {
        self.dispatch(LifecycleEvent::Stop, session);
    }

    pub fn notify_expiration(&self, session: &Session) {
        self.dispatch(LifecycleEvent::Expiration, session);
    }

    fn dispatch(&self, event: LifecycleEvent, session: &Session) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            let callback = match event {
                LifecycleEvent::Start => listener.on_start.as_ref(),
                LifecycleEvent::Stop => listener.on_stop.as_ref(),
                LifecycleEvent::Expiration => listener.on_expiration.as_ref(),
            };
            let Some(callback) = callback else {
                continue;
            };
            if catch_unwind(AssertUnwindSafe(|| callback(session))).is_err() {
                warn!(
                    event = event.as_str(),
                    session_id = ?session.id(),
                    "session listener panicked"
                );
            }
        }
    }
}
