//! Per-invocation execution context and the shared transient cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::commands::Commands;
use crate::endpoint::Endpoint;
use crate::errors::StateRequestError;
use crate::ids::{ComponentId, ConnectionId, SessionId};
use crate::protocol::{ElementState, Target};
use crate::state_request::StateRequestBus;

/// Variable holding the authenticated user name.
pub const USER_VARIABLE: &str = "user";
/// Variable holding the decoded client [`Location`].
pub const LOCATION_VARIABLE: &str = "Location";
/// Variable holding the event payload (boolean or raw string).
pub const EVENT_DATA_VARIABLE: &str = "EventData";

/// Client location as reported by the browser.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    /// Path portion of the URL.
    pub pathname: String,
    /// Query string, including the leading `?`.
    pub search: String,
    /// Fragment, including the leading `#`.
    pub hash: String,
    /// Any other fields the client sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    /// Decode a JSON location string.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Best-effort typed decode of an event payload: a boolean when the text is
/// `true`/`false` (any case, surrounding whitespace ignored), otherwise the
/// raw string.
pub fn decode_event_data(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Value::Bool(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Value::Bool(false)
    } else {
        Value::String(raw.to_owned())
    }
}

/// Process-wide transient key/value cache shared by all dispatches.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Value>,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    /// Insert or replace a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Remove a value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    /// Atomically update a value in place; `f` sees `None` if absent.
    ///
    /// A stored `null` is a value like any other and is passed as
    /// `Some(&Value::Null)`.
    pub fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let next = f(Some(occupied.get()));
                *occupied.get_mut() = next.clone();
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                let _ = vacant.insert(next.clone());
                next
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one endpoint invocation can see.
///
/// Built by the dispatch pipeline for a single client event, owned by that
/// invocation, and dropped when it finishes.
pub struct ExecutionContext {
    /// Endpoint being executed.
    pub endpoint: Arc<Endpoint>,
    /// Input variables (`user`, `Location`, `EventData`, ...).
    pub variables: HashMap<String, Value>,
    /// Reciprocal values produced by the endpoint.
    pub output: HashMap<String, Value>,
    /// Shared transient cache.
    pub memory_cache: Arc<MemoryCache>,
    /// Originating connection.
    pub connection_id: Option<ConnectionId>,
    /// Session bound to the originating connection, if any.
    pub session_id: Option<SessionId>,
    /// Authenticated user name, if any.
    pub user: Option<String>,
    /// Outbound command handle.
    pub commands: Commands,
    /// Correlation bus for asking clients for component state.
    pub state_requests: Arc<StateRequestBus>,
    /// Default deadline for [`ExecutionContext::request_state`].
    pub state_request_timeout: Duration,
}

impl ExecutionContext {
    /// Look up an input variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// The decoded event payload.
    pub fn event_data(&self) -> Option<&Value> {
        self.variable(EVENT_DATA_VARIABLE)
    }

    /// The decoded client location, if one was supplied.
    pub fn location(&self) -> Option<Location> {
        self.variable(LOCATION_VARIABLE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Target addressing only the originating connection.
    pub fn caller(&self) -> Option<Target> {
        self.connection_id.clone().map(Target::Connection)
    }

    /// Push `setState` to the originating connection.
    pub fn set_state(&self, component_id: &ComponentId, state: ElementState) -> bool {
        self.caller()
            .is_some_and(|target| self.commands.set_state(&target, component_id, state) > 0)
    }

    /// Ask the originating client for a component's current state and wait
    /// for the answer, up to the context's default deadline.
    pub async fn request_state(&self, component_id: &ComponentId) -> Result<ElementState, StateRequestError> {
        self.request_state_with_timeout(component_id, self.state_request_timeout)
            .await
    }

    /// Same as [`ExecutionContext::request_state`] with an explicit deadline.
    pub async fn request_state_with_timeout(
        &self,
        component_id: &ComponentId,
        timeout: Duration,
    ) -> Result<ElementState, StateRequestError> {
        let Some(connection_id) = &self.connection_id else {
            return Err(StateRequestError::Disconnected {
                request_id: crate::ids::RequestId::new(),
            });
        };
        self.state_requests
            .request_state(connection_id, component_id)
            .wait(timeout)
            .await
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("endpoint", self.endpoint.id())
            .field("variables", &self.variables)
            .field("output", &self.output)
            .field("connection_id", &self.connection_id)
            .field("session_id", &self.session_id)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
