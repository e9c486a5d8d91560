//! Endpoint storage, global and per-session.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::ids::{EndpointId, SessionId};

/// Endpoint lookup consumed by the dispatch pipeline.
pub trait EndpointLookup: Send + Sync {
    /// Resolve `event_id`, preferring the session's own endpoints and
    /// falling back to global ones.
    fn get(&self, event_id: &str, session_id: Option<&SessionId>) -> Option<Arc<Endpoint>>;

    /// Add or replace an endpoint under its own ID and scope.
    fn register(&self, endpoint: Arc<Endpoint>);

    /// Remove an endpoint from the session scope if `session_id` is given,
    /// otherwise from the global scope. Returns whether one was removed.
    fn unregister(&self, event_id: &str, session_id: Option<&SessionId>) -> bool;
}

/// Notifications about session start and end.
pub trait SessionLifecycle: Send + Sync {
    /// A session was bound to a connection.
    fn start_session(&self, session_id: &SessionId);

    /// A session ended; its scoped resources should be released.
    fn end_session(&self, session_id: &SessionId);
}

/// Concurrent endpoint store. Lookups are a single shard read per scope.
#[derive(Default)]
pub struct EndpointRegistry {
    global: DashMap<EndpointId, Arc<Endpoint>>,
    sessions: DashMap<SessionId, HashMap<EndpointId, Arc<Endpoint>>>,
}

impl EndpointRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of endpoints.
    pub fn register_all<I>(&self, endpoints: I) -> usize
    where
        I: IntoIterator<Item = Arc<Endpoint>>,
    {
        let mut count = 0;
        for endpoint in endpoints {
            self.register(endpoint);
            count += 1;
        }
        count
    }

    /// Number of global endpoints.
    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    /// Number of endpoints scoped to `session_id`.
    pub fn session_count(&self, session_id: &SessionId) -> usize {
        self.sessions.get(session_id).map_or(0, |scope| scope.len())
    }

    /// Whether a scope exists for `session_id`.
    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }
}

impl EndpointLookup for EndpointRegistry {
    fn get(&self, event_id: &str, session_id: Option<&SessionId>) -> Option<Arc<Endpoint>> {
        if let Some(session_id) = session_id {
            let scoped = self
                .sessions
                .get(session_id)
                .and_then(|scope| scope.get(event_id).cloned());
            if scoped.is_some() {
                return scoped;
            }
        }
        self.global.get(event_id).map(|e| Arc::clone(e.value()))
    }

    fn register(&self, endpoint: Arc<Endpoint>) {
        let id = endpoint.id().clone();
        match endpoint.session_id().cloned() {
            Some(session_id) => {
                debug!(endpoint = %id, session = %session_id, "registering session endpoint");
                let _ = self.sessions.entry(session_id).or_default().insert(id, endpoint);
            }
            None => {
                debug!(endpoint = %id, "registering global endpoint");
                let _ = self.global.insert(id, endpoint);
            }
        }
    }

    fn unregister(&self, event_id: &str, session_id: Option<&SessionId>) -> bool {
        let removed = match session_id {
            Some(session_id) => self
                .sessions
                .get_mut(session_id)
                .is_some_and(|mut scope| scope.remove(event_id).is_some()),
            None => self.global.remove(event_id).is_some(),
        };
        if removed {
            debug!(endpoint = event_id, session = ?session_id, "unregistered endpoint");
        }
        removed
    }
}

impl SessionLifecycle for EndpointRegistry {
    fn start_session(&self, session_id: &SessionId) {
        let _ = self.sessions.entry(session_id.clone()).or_default();
        info!(session = %session_id, "session started");
    }

    fn end_session(&self, session_id: &SessionId) {
        let released = self.sessions.remove(session_id).map_or(0, |(_, scope)| scope.len());
        info!(session = %session_id, released, "session ended");
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("global", &self.global.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
