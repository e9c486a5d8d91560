//! WebSocket push transport.

pub mod connection;
pub mod manager;
pub mod session;
