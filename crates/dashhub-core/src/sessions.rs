//! Bidirectional connection/session mapping.
//!
//! Two concurrent maps hold the two directions. No operation holds a lock on
//! one map while touching the other, and stale reverse entries are removed
//! with compare-and-remove so a concurrent rebind is never clobbered.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::ids::{ConnectionId, SessionId};
use crate::registry::SessionLifecycle;

/// Connection ↔ session registry.
pub struct SessionRegistry {
    by_connection: DashMap<ConnectionId, SessionId>,
    by_session: DashMap<SessionId, ConnectionId>,
    lifecycle: Arc<dyn SessionLifecycle>,
}

impl SessionRegistry {
    /// Registry notifying `lifecycle` when sessions start and end.
    pub fn new(lifecycle: Arc<dyn SessionLifecycle>) -> Self {
        Self {
            by_connection: DashMap::new(),
            by_session: DashMap::new(),
            lifecycle,
        }
    }

    /// Record a new transport connection. Nothing is stored until a session
    /// is bound.
    pub fn on_connect(&self, connection_id: &ConnectionId) {
        debug!(%connection_id, "connection registered");
    }

    /// Bind `session_id` to `connection_id`.
    ///
    /// Rebinding the same pair is a no-op. A connection moving to a new
    /// session ends the old one. A session moving to a new connection keeps
    /// running; the old connection is detached from it.
    pub fn bind(&self, connection_id: &ConnectionId, session_id: &SessionId) {
        let previous = self
            .by_connection
            .insert(connection_id.clone(), session_id.clone());

        if previous.as_ref() == Some(session_id) {
            return;
        }

        if let Some(old_session) = previous {
            let released = self
                .by_session
                .remove_if(&old_session, |_, c| c == connection_id)
                .is_some();
            if released {
                debug!(%connection_id, session = %old_session, "connection left session");
                self.lifecycle.end_session(&old_session);
            }
        }

        if let Some(old_connection) = self
            .by_session
            .insert(session_id.clone(), connection_id.clone())
            .filter(|c| c != connection_id)
        {
            let _ = self
                .by_connection
                .remove_if(&old_connection, |_, s| s == session_id);
            debug!(session = %session_id, from = %old_connection, to = %connection_id, "session moved connection");
        }

        debug!(%connection_id, session = %session_id, "session bound");
        self.lifecycle.start_session(session_id);
    }

    /// Session bound to `connection_id`.
    pub fn resolve_session(&self, connection_id: &ConnectionId) -> Option<SessionId> {
        self.by_connection.get(connection_id).map(|s| s.value().clone())
    }

    /// Connection currently bound to `session_id`.
    pub fn resolve_connection(&self, session_id: &SessionId) -> Option<ConnectionId> {
        self.by_session.get(session_id).map(|c| c.value().clone())
    }

    /// Drop both directions for `connection_id` and end its session, if any.
    /// Returns the session that ended.
    pub fn unbind(&self, connection_id: &ConnectionId) -> Option<SessionId> {
        let (_, session_id) = self.by_connection.remove(connection_id)?;
        let owned = self
            .by_session
            .remove_if(&session_id, |_, c| c == connection_id)
            .is_some();
        if owned {
            self.lifecycle.end_session(&session_id);
            Some(session_id)
        } else {
            None
        }
    }

    /// End `session_id` explicitly, detaching whichever connection holds it.
    /// Returns the detached connection.
    pub fn end_session(&self, session_id: &SessionId) -> Option<ConnectionId> {
        let (_, connection_id) = self.by_session.remove(session_id)?;
        let _ = self
            .by_connection
            .remove_if(&connection_id, |_, s| s == session_id);
        self.lifecycle.end_session(session_id);
        Some(connection_id)
    }

    /// Number of bound sessions.
    pub fn len(&self) -> usize {
        self.by_session.len()
    }

    /// Whether no session is bound.
    pub fn is_empty(&self) -> bool {
        self.by_session.is_empty()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("connections", &self.by_connection.len())
            .field("sessions", &self.by_session.len())
            .finish_non_exhaustive()
    }
}
