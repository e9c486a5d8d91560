//! Outbound command API on top of the push transport.
//!
//! [`CommandSink`] is the seam to the transport: unicast to one connection,
//! broadcast to all. [`Commands`] serializes the typed [`Command`]
//! vocabulary onto it. Every command is fire-and-forget; the return values
//! only report whether the transport accepted the frame.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::CommandError;
use crate::ids::{ComponentId, ConnectionId, RequestId};
use crate::protocol::{Command, ElementState, Target};

/// Push transport as seen by the hub.
pub trait CommandSink: Send + Sync {
    /// Queue a frame for one connection. Returns `false` if the connection is
    /// unknown or its queue rejected the frame.
    fn send_to(&self, connection_id: &ConnectionId, frame: Arc<String>) -> bool;

    /// Queue a frame for every connection. Returns how many accepted it.
    fn broadcast(&self, frame: Arc<String>) -> usize;
}

/// Typed, cloneable handle for pushing [`Command`]s.
#[derive(Clone)]
pub struct Commands {
    sink: Arc<dyn CommandSink>,
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commands").finish_non_exhaustive()
    }
}

impl Commands {
    /// Wrap a transport.
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }

    /// Push a command, checking the target form first.
    ///
    /// Returns the number of connections that accepted the frame.
    pub fn push(&self, target: &Target, command: &Command) -> Result<usize, CommandError> {
        command.check_target(target)?;
        Ok(self.deliver(target, command))
    }

    fn deliver(&self, target: &Target, command: &Command) -> usize {
        let frame = match serde_json::to_string(command) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(command = command.name(), error = %e, "failed to serialize command");
                return 0;
            }
        };
        match target {
            Target::Connection(connection_id) => {
                let sent = self.sink.send_to(connection_id, frame);
                if !sent {
                    debug!(command = command.name(), %connection_id, "command not delivered");
                }
                usize::from(sent)
            }
            Target::All => self.sink.broadcast(frame),
        }
    }

    fn unicast(&self, connection_id: &ConnectionId, command: &Command) -> bool {
        self.deliver(&Target::Connection(connection_id.clone()), command) > 0
    }

    /// `showModal` to one connection.
    pub fn show_modal(&self, connection_id: &ConnectionId, modal: Value) -> bool {
        self.unicast(connection_id, &Command::ShowModal { modal })
    }

    /// `closeModal` to one connection.
    pub fn close_modal(&self, connection_id: &ConnectionId) -> bool {
        self.unicast(connection_id, &Command::CloseModal)
    }

    /// `showToast` to one connection.
    pub fn show_toast(&self, connection_id: &ConnectionId, toast: Value) -> bool {
        self.unicast(connection_id, &Command::ShowToast { toast })
    }

    /// `hideToast` to one connection.
    pub fn hide_toast(&self, connection_id: &ConnectionId, id: impl Into<String>) -> bool {
        self.unicast(connection_id, &Command::HideToast { id: id.into() })
    }

    /// `requestState` to one connection. Callers that want the answer go
    /// through [`crate::state_request::StateRequestBus`].
    pub fn request_state(
        &self,
        connection_id: &ConnectionId,
        component_id: &ComponentId,
        request_id: &RequestId,
    ) -> bool {
        self.unicast(
            connection_id,
            &Command::RequestState {
                component_id: component_id.clone(),
                request_id: request_id.clone(),
            },
        )
    }

    /// `redirect` one connection.
    pub fn redirect(&self, connection_id: &ConnectionId, url: impl Into<String>, new_window: bool) -> bool {
        self.unicast(
            connection_id,
            &Command::Redirect {
                url: url.into(),
                new_window,
            },
        )
    }

    /// `setState` to one connection or all.
    pub fn set_state(&self, target: &Target, component_id: &ComponentId, state: ElementState) -> usize {
        self.deliver(
            target,
            &Command::SetState {
                component_id: component_id.clone(),
                state,
            },
        )
    }

    /// `addElement` to one connection or all.
    pub fn add_element(&self, target: &Target, parent_component_id: &ComponentId, elements: Vec<Value>) -> usize {
        self.deliver(
            target,
            &Command::AddElement {
                parent_component_id: parent_component_id.clone(),
                elements,
            },
        )
    }

    /// `removeElement` to one connection or all.
    pub fn remove_element(&self, target: &Target, component_id: &ComponentId) -> usize {
        self.deliver(
            target,
            &Command::RemoveElement {
                component_id: component_id.clone(),
            },
        )
    }

    /// `clearElement` to one connection or all.
    pub fn clear_element(&self, target: &Target, component_id: &ComponentId) -> usize {
        self.deliver(
            target,
            &Command::ClearElement {
                component_id: component_id.clone(),
            },
        )
    }

    /// `syncElement` to one connection or all.
    pub fn sync_element(&self, target: &Target, component_id: &ComponentId) -> usize {
        self.deliver(
            target,
            &Command::SyncElement {
                component_id: component_id.clone(),
            },
        )
    }

    /// `reload` every connection.
    pub fn reload(&self) -> usize {
        self.deliver(&Target::All, &Command::Reload)
    }
}
