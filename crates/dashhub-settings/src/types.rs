//! Settings type definitions.
//!
//! All types are `camelCase` on the wire and `#[serde(default)]`, so a
//! partial JSON file only needs the fields it changes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
///
/// ```json
/// { "server": { "port": 9000 }, "logging": { "level": "debug" } }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashSettings {
    /// Network transport.
    pub server: ServerSettings,
    /// Hub behaviour.
    pub hub: HubSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl DashSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue("server.maxConnections must be at least 1".into()));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue("server.sendQueueCapacity must be at least 1".into()));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) is shorter than heartbeatIntervalSecs ({})",
                self.server.heartbeat_timeout_secs, self.server.heartbeat_interval_secs
            )));
        }
        if self.hub.state_request_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue("hub.stateRequestTimeoutMs must be at least 1".into()));
        }
        Ok(())
    }
}

/// WebSocket server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Connections accepted at once; further upgrades get 503.
    pub max_connections: usize,
    /// Outbound frames buffered per connection before dropping.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before the connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Request header carrying an authenticated user name, set by a
    /// fronting proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_header: Option<String>,
    /// Serve Prometheus metrics at `/metrics`.
    pub metrics: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10_000,
            max_connections: 1_000,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            user_header: None,
            metrics: true,
        }
    }
}

impl ServerSettings {
    /// `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Pong deadline.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Hub settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Default wait for a client's `requestState` answer.
    pub state_request_timeout_ms: u64,
    /// How long shutdown waits for running endpoints.
    pub shutdown_timeout_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            state_request_timeout_ms: 10_000,
            shutdown_timeout_secs: 10,
        }
    }
}

impl HubSettings {
    /// State request deadline.
    pub fn state_request_timeout(&self) -> Duration {
        Duration::from_millis(self.state_request_timeout_ms)
    }

    /// Drain deadline at shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Base level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"dashhub_core": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: BTreeMap::new(),
        }
    }
}
