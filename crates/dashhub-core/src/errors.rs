//! Error types for the hub.
//!
//! The taxonomy mirrors where a failure surfaces:
//!
//! - [`DispatchError`]: resolution failures, returned synchronously to the
//!   caller of the dispatch entry point. The event is not executed.
//! - [`ExecutionError`]: failures of endpoint logic, isolated to the
//!   background task that ran it.
//! - [`StateRequestError`]: a pending state request that will never be
//!   answered (timeout or disconnect).
//! - [`CommandError`]: a command addressed to a target it cannot use.
//!
//! Registry operations on unknown connection or session IDs are no-ops and
//! have no error type.

use std::time::Duration;

use thiserror::Error;

use crate::ids::{EndpointId, RequestId};

/// Error raised by endpoint logic.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The endpoint ran but reported a failure.
    #[error("{0}")]
    Failed(String),
    /// A state request issued by the endpoint did not complete.
    #[error(transparent)]
    StateRequest(#[from] StateRequestError),
    /// An outbound command was rejected.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// A payload could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EndpointError {
    /// Shorthand for [`EndpointError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Failure to resolve a client event into an executable endpoint.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No endpoint is registered for the event in the caller's session or
    /// globally.
    #[error("Endpoint {event_id} not found.")]
    EndpointNotFound {
        /// The event ID the client sent.
        event_id: String,
    },
    /// The client-supplied location string is not a valid location object.
    #[error("invalid location payload: {0}")]
    InvalidLocation(#[source] serde_json::Error),
}

impl DispatchError {
    /// Short machine-readable code used in error frames and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EndpointNotFound { .. } => "ENDPOINT_NOT_FOUND",
            Self::InvalidLocation(_) => "INVALID_LOCATION",
        }
    }
}

/// Failure while executing a resolved endpoint in the background.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The endpoint's logic returned an error.
    #[error("endpoint {endpoint} failed: {source}")]
    Endpoint {
        /// Endpoint that failed.
        endpoint: EndpointId,
        /// Underlying error.
        #[source]
        source: EndpointError,
    },
    /// The endpoint's task panicked.
    #[error("endpoint {endpoint} panicked: {message}")]
    Panicked {
        /// Endpoint that panicked.
        endpoint: EndpointId,
        /// Panic payload, if it was a string.
        message: String,
    },
}

/// Outcome of a state request that did not receive an answer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StateRequestError {
    /// No response arrived within the caller's deadline.
    #[error("state request {request_id} timed out after {after:?}")]
    TimedOut {
        /// The request that timed out.
        request_id: RequestId,
        /// How long the caller waited.
        after: Duration,
    },
    /// The target connection went away (or could not be reached) before
    /// answering.
    #[error("state request {request_id} abandoned: client disconnected")]
    Disconnected {
        /// The request that was abandoned.
        request_id: RequestId,
    },
}

impl StateRequestError {
    /// The request this outcome belongs to.
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::TimedOut { request_id, .. } | Self::Disconnected { request_id } => request_id,
        }
    }
}

/// A command was pushed to a target form it does not support.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// e.g. broadcasting `showModal` or unicasting `reload`.
    #[error("command '{command}' cannot be sent to {target}")]
    InvalidTarget {
        /// Wire name of the command.
        command: &'static str,
        /// Human-readable target form.
        target: &'static str,
    },
}
