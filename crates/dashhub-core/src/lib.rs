//! # dashhub-core
//!
//! Real-time synchronization hub for server-defined dashboards.
//!
//! - [`sessions`]: bidirectional connection/session registry
//! - [`registry`]: global and session-scoped endpoint store
//! - [`state_request`]: request/response correlation over push-only transport
//! - [`hub`]: inbound message routing and background endpoint dispatch
//! - [`protocol`] and [`commands`]: the wire vocabulary in both directions
//!
//! The transport itself is abstracted behind [`commands::CommandSink`].

#![deny(unsafe_code)]

pub mod commands;
pub mod context;
pub mod endpoint;
pub mod engine;
pub mod errors;
pub mod hub;
pub mod ids;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod sessions;
pub mod state_request;

#[cfg(test)]
mod testing;

pub use commands::{CommandSink, Commands};
pub use context::{ExecutionContext, Location, MemoryCache};
pub use endpoint::{Endpoint, EndpointHandler, handler_fn};
pub use engine::{DirectExecutionEngine, ExecutionEngine};
pub use errors::{CommandError, DispatchError, EndpointError, ExecutionError, StateRequestError};
pub use hub::{CallerContext, DashboardHub, DisconnectCause, HubConfig};
pub use ids::{ComponentId, ConnectionId, EndpointId, RequestId, SessionId};
pub use protocol::{ClientEvent, Command, ElementState, ErrorFrame, InboundMessage, Target};
pub use registry::{EndpointLookup, EndpointRegistry, SessionLifecycle};
pub use sessions::SessionRegistry;
pub use state_request::{StateRequest, StateRequestBus};
