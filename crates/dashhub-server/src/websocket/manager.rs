//! Live connection table and the hub's push transport.

use std::sync::Arc;

use dashhub_core::{CommandSink, ConnectionId};
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::WS_SEND_DROPS_TOTAL;

/// Connected clients indexed by connection ID.
#[derive(Debug)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
    queue_capacity: usize,
}

impl ConnectionManager {
    /// Manager whose connections buffer up to `queue_capacity` frames each.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Allocate a connection ID and its outbound queue.
    pub fn register(&self) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let connection = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
        let _ = self
            .connections
            .insert(connection.id.clone(), Arc::clone(&connection));
        debug!(connection_id = %connection.id, "connection added");
        (connection, rx)
    }

    /// Forget a connection. Returns it if it was present.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.remove(connection_id).map(|(_, c)| c)
    }

    /// Look up a connection.
    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(connection_id).map(|c| Arc::clone(c.value()))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no client is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn record_drop(connection: &ClientConnection) {
        counter!(WS_SEND_DROPS_TOTAL).increment(1);
        warn!(
            connection_id = %connection.id,
            dropped = connection.drop_count(),
            "send queue full or closed, dropping frame"
        );
    }
}

impl CommandSink for ConnectionManager {
    fn send_to(&self, connection_id: &ConnectionId, frame: Arc<String>) -> bool {
        // Clone out of the map so no shard lock is held while queueing.
        let Some(connection) = self.get(connection_id) else {
            return false;
        };
        let sent = connection.send(frame);
        if !sent {
            Self::record_drop(&connection);
        }
        sent
    }

    fn broadcast(&self, frame: Arc<String>) -> usize {
        let recipients: Vec<Arc<ClientConnection>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut delivered = 0;
        for connection in &recipients {
            if connection.send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                Self::record_drop(connection);
            }
        }
        debug!(recipients = recipients.len(), delivered, "broadcast frame");
        delivered
    }
}
