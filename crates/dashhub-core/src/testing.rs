//! Test doubles shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::commands::CommandSink;
use crate::ids::ConnectionId;

/// In-memory transport that records every frame per connection.
#[derive(Default)]
pub(crate) struct RecordingSink {
    frames: Mutex<HashMap<ConnectionId, Vec<Arc<String>>>>,
}

impl RecordingSink {
    pub(crate) fn with_connections(ids: &[&str]) -> Self {
        let sink = Self::default();
        for id in ids {
            sink.connect(id);
        }
        sink
    }

    pub(crate) fn connect(&self, id: &str) {
        let _ = self.frames.lock().entry(ConnectionId::from(id)).or_default();
    }

    pub(crate) fn disconnect(&self, id: &str) {
        let _ = self.frames.lock().remove(id);
    }

    pub(crate) fn frames_for(&self, id: &str) -> Vec<Value> {
        self.frames
            .lock()
            .get(id)
            .map(|frames| {
                frames
                    .iter()
                    .map(|f| serde_json::from_str(f).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl CommandSink for RecordingSink {
    fn send_to(&self, connection_id: &ConnectionId, frame: Arc<String>) -> bool {
        match self.frames.lock().get_mut(connection_id) {
            Some(frames) => {
                frames.push(frame);
                true
            }
            None => false,
        }
    }

    fn broadcast(&self, frame: Arc<String>) -> usize {
        let mut frames = self.frames.lock();
        for queue in frames.values_mut() {
            queue.push(frame.clone());
        }
        frames.len()
    }
}
