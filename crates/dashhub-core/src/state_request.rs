//! Request/response correlation over the push-only transport.
//!
//! The server pushes `requestState(componentId, requestId)` and later
//! receives an unrelated inbound `RequestStateResponse(requestId, state)`.
//! [`StateRequestBus`] pairs the two through a concurrent map of
//! single-fulfillment oneshot slots. Waiting never holds a map lock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::commands::Commands;
use crate::errors::StateRequestError;
use crate::ids::{ComponentId, ConnectionId, RequestId};
use crate::metrics::{STATE_REQUEST_TIMEOUTS_TOTAL, STATE_REQUESTS_PENDING};
use crate::protocol::ElementState;

struct PendingRequest {
    connection_id: ConnectionId,
    tx: oneshot::Sender<ElementState>,
}

type PendingMap = DashMap<RequestId, PendingRequest>;

#[allow(clippy::cast_precision_loss)]
fn record_pending(pending: &PendingMap) {
    gauge!(STATE_REQUESTS_PENDING).set(pending.len() as f64);
}

/// Correlation map from request ID to the waiter's slot.
pub struct StateRequestBus {
    pending: Arc<PendingMap>,
    commands: Commands,
}

impl StateRequestBus {
    /// Bus pushing its `requestState` commands through `commands`.
    pub fn new(commands: Commands) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            commands,
        }
    }

    /// Ask `connection_id` for the state of `component_id`.
    ///
    /// The slot is registered before the command is pushed, so a response
    /// can never race ahead of its waiter. If the push is not accepted the
    /// slot is discarded at once and [`StateRequest::wait`] resolves to
    /// [`StateRequestError::Disconnected`] without waiting.
    pub fn request_state(&self, connection_id: &ConnectionId, component_id: &ComponentId) -> StateRequest {
        let request_id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.insert(
            request_id.clone(),
            PendingRequest {
                connection_id: connection_id.clone(),
                tx,
            },
        );
        record_pending(&self.pending);

        if self.commands.request_state(connection_id, component_id, &request_id) {
            debug!(%request_id, %connection_id, %component_id, "state requested");
        } else {
            warn!(%request_id, %connection_id, %component_id, "state request could not be pushed");
            let _ = self.pending.remove(&request_id);
            record_pending(&self.pending);
        }

        StateRequest {
            request_id,
            rx,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Resolve a pending request. Unknown, late, or duplicate IDs are
    /// dropped and return `false`.
    pub fn fulfill(&self, request_id: &RequestId, state: ElementState) -> bool {
        let removed = self.pending.remove(request_id);
        self.complete(request_id, removed, state)
    }

    /// Like [`StateRequestBus::fulfill`], but only accepts the answer from
    /// the connection the request was sent to.
    pub fn fulfill_from(&self, connection_id: &ConnectionId, request_id: &RequestId, state: ElementState) -> bool {
        let removed = self
            .pending
            .remove_if(request_id, |_, p| &p.connection_id == connection_id);
        self.complete(request_id, removed, state)
    }

    fn complete(
        &self,
        request_id: &RequestId,
        removed: Option<(RequestId, PendingRequest)>,
        state: ElementState,
    ) -> bool {
        let Some((_, pending)) = removed else {
            debug!(%request_id, "dropping response for unknown or settled request");
            return false;
        };
        record_pending(&self.pending);
        // A send error means the waiter gave up between our remove and now.
        pending.tx.send(state).is_ok()
    }

    /// Abandon every request addressed to `connection_id`. Their waiters
    /// resolve to [`StateRequestError::Disconnected`]. Returns how many were
    /// abandoned.
    pub fn cancel_connection(&self, connection_id: &ConnectionId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| &p.connection_id != connection_id);
        let cancelled = before.saturating_sub(self.pending.len());
        if cancelled > 0 {
            debug!(%connection_id, cancelled, "abandoned pending state requests");
            record_pending(&self.pending);
        }
        cancelled
    }

    /// Whether `request_id` is still awaiting an answer.
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for StateRequestBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRequestBus")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Handle for one outstanding state request.
///
/// Dropping it without waiting discards the slot.
pub struct StateRequest {
    request_id: RequestId,
    rx: oneshot::Receiver<ElementState>,
    pending: Arc<PendingMap>,
}

impl StateRequest {
    /// The generated request ID carried by the `requestState` command.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Suspend until the answer arrives, the target disconnects, or
    /// `timeout` elapses.
    pub async fn wait(mut self, timeout: Duration) -> Result<ElementState, StateRequestError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(_)) => Err(StateRequestError::Disconnected {
                request_id: self.request_id.clone(),
            }),
            Err(_) => {
                counter!(STATE_REQUEST_TIMEOUTS_TOTAL).increment(1);
                debug!(request_id = %self.request_id, ?timeout, "state request timed out");
                Err(StateRequestError::TimedOut {
                    request_id: self.request_id.clone(),
                    after: timeout,
                })
            }
        }
    }
}

impl std::fmt::Debug for StateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRequest")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl Drop for StateRequest {
    fn drop(&mut self) {
        if self.pending.remove(&self.request_id).is_some() {
            record_pending(&self.pending);
        }
    }
}
