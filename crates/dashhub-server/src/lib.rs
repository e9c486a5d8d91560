//! # dashhub-server
//!
//! WebSocket push transport and HTTP surface for the dashhub hub.
//!
//! - `GET /ws`: one connection per socket, bounded ordered send queue,
//!   ping/pong heartbeat, JSON inbound messages forwarded to the hub
//! - `GET /health` and optional Prometheus `GET /metrics`
//! - Graceful shutdown via `CancellationToken`, then a bounded drain of
//!   running endpoint executions

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use errors::ServerError;
pub use server::DashServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::manager::ConnectionManager;
