//! Semantic messages carried over the push channel.
//!
//! Outbound frames are [`Command`]s, addressed by [`Target`]. Inbound frames
//! are [`InboundMessage`]s. Both are JSON objects with a `type` tag and
//! camelCase fields:
//!
//! ```json
//! {"type":"setState","componentId":"counter","state":{"value":3}}
//! {"type":"clientEvent","eventId":"btn1","eventName":"click","eventData":"","location":""}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ComponentId, ConnectionId, RequestId, SessionId};

/// Element state payload exchanged with the client.
pub type ElementState = Value;

/// Where a command is delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// A single connection.
    Connection(ConnectionId),
    /// Every live connection.
    All,
}

impl Target {
    fn describe(&self) -> &'static str {
        match self {
            Self::Connection(_) => "a single connection",
            Self::All => "all connections",
        }
    }
}

/// How a command may be addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addressing {
    /// Only to a single connection.
    Unicast,
    /// Only to every connection.
    Broadcast,
    /// Either form.
    Any,
}

/// Server-to-client push command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Open a modal dialog.
    ShowModal {
        /// Modal descriptor.
        modal: Value,
    },
    /// Close the open modal.
    CloseModal,
    /// Show a toast notification.
    ShowToast {
        /// Toast descriptor.
        toast: Value,
    },
    /// Hide a toast by ID.
    HideToast {
        /// Toast ID.
        id: String,
    },
    /// Ask the client for a component's current state.
    RequestState {
        /// Component whose state is requested.
        component_id: ComponentId,
        /// Correlation ID the client echoes back.
        request_id: RequestId,
    },
    /// Navigate the client.
    Redirect {
        /// Destination URL.
        url: String,
        /// Open in a new window/tab.
        new_window: bool,
    },
    /// Replace a component's element state.
    SetState {
        /// Target component.
        component_id: ComponentId,
        /// New element state.
        state: ElementState,
    },
    /// Append child elements to a component.
    AddElement {
        /// Parent component.
        parent_component_id: ComponentId,
        /// Element subtree(s) to append.
        elements: Vec<Value>,
    },
    /// Remove a component.
    RemoveElement {
        /// Component to remove.
        component_id: ComponentId,
    },
    /// Remove a component's children.
    ClearElement {
        /// Component to clear.
        component_id: ComponentId,
    },
    /// Ask the client to re-fetch a component from the server.
    SyncElement {
        /// Component to sync.
        component_id: ComponentId,
    },
    /// Reload the page.
    Reload,
}

impl Command {
    /// Wire name (the `type` tag).
    pub fn name(&self) -> &'static str {
        match self {
            Self::ShowModal { .. } => "showModal",
            Self::CloseModal => "closeModal",
            Self::ShowToast { .. } => "showToast",
            Self::HideToast { .. } => "hideToast",
            Self::RequestState { .. } => "requestState",
            Self::Redirect { .. } => "redirect",
            Self::SetState { .. } => "setState",
            Self::AddElement { .. } => "addElement",
            Self::RemoveElement { .. } => "removeElement",
            Self::ClearElement { .. } => "clearElement",
            Self::SyncElement { .. } => "syncElement",
            Self::Reload => "reload",
        }
    }

    /// Which target forms this command accepts.
    pub fn addressing(&self) -> Addressing {
        match self {
            Self::ShowModal { .. }
            | Self::CloseModal
            | Self::ShowToast { .. }
            | Self::HideToast { .. }
            | Self::RequestState { .. }
            | Self::Redirect { .. } => Addressing::Unicast,
            Self::SetState { .. }
            | Self::AddElement { .. }
            | Self::RemoveElement { .. }
            | Self::ClearElement { .. }
            | Self::SyncElement { .. } => Addressing::Any,
            Self::Reload => Addressing::Broadcast,
        }
    }

    /// Check the command may be sent to `target`.
    pub fn check_target(&self, target: &Target) -> Result<(), crate::errors::CommandError> {
        let ok = matches!(
            (self.addressing(), target),
            (Addressing::Any, _)
                | (Addressing::Unicast, Target::Connection(_))
                | (Addressing::Broadcast, Target::All)
        );
        if ok {
            Ok(())
        } else {
            Err(crate::errors::CommandError::InvalidTarget {
                command: self.name(),
                target: target.describe(),
            })
        }
    }
}

/// A client-originated UI event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    /// Endpoint the event targets.
    pub event_id: String,
    /// DOM-level event name (`click`, `change`, ...).
    #[serde(default)]
    pub event_name: String,
    /// Raw event payload.
    #[serde(default)]
    pub event_data: String,
    /// JSON-encoded client location, or empty.
    #[serde(default)]
    pub location: String,
}

impl ClientEvent {
    /// Event with empty payload and location.
    pub fn new(event_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_name: event_name.into(),
            event_data: String::new(),
            location: String::new(),
        }
    }

    /// Set the raw payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.event_data = data.into();
        self
    }

    /// Set the JSON-encoded location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// Client-to-server message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    /// Bind this connection to a logical session.
    SetSessionId {
        /// Client-chosen session ID.
        session_id: SessionId,
    },
    /// Answer to a `requestState` command.
    RequestStateResponse {
        /// Correlation ID from the command.
        request_id: RequestId,
        /// The component's state.
        #[serde(default)]
        state: ElementState,
    },
    /// Drop a dynamically registered endpoint.
    UnregisterEvent {
        /// Endpoint ID.
        event_id: String,
    },
    /// UI event to dispatch to an endpoint.
    ClientEvent(ClientEvent),
    /// Reload every connected client.
    Reload,
}

impl InboundMessage {
    /// Wire name (the `type` tag).
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetSessionId { .. } => "setSessionId",
            Self::RequestStateResponse { .. } => "requestStateResponse",
            Self::UnregisterEvent { .. } => "unregisterEvent",
            Self::ClientEvent(_) => "clientEvent",
            Self::Reload => "reload",
        }
    }
}

/// Frame sent back when an inbound message could not be handled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "error", rename_all = "camelCase")]
pub struct ErrorFrame {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Event the error relates to, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub event_id: Option<String>,
}

impl ErrorFrame {
    /// Build an error frame.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            event_id: None,
        }
    }

    /// Attach the related event ID.
    #[must_use]
    pub fn for_event(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}
