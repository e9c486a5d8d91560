//! One client socket from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use dashhub_core::{CallerContext, DashboardHub, DisconnectCause, ErrorFrame, InboundMessage};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::manager::ConnectionManager;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_INVALID_FRAMES_TOTAL,
};

/// Error code sent back for frames that are not a valid inbound message.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

/// Liveness probing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Time between server pings.
    pub interval: Duration,
    /// Silence after which the client is dropped.
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Shared handles every socket task needs.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// Hub receiving connection lifecycle and inbound messages.
    pub hub: Arc<DashboardHub>,
    /// Live connection table.
    pub connections: Arc<ConnectionManager>,
    /// Ping cadence and deadline.
    pub heartbeat: Heartbeat,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

/// Run a socket until the client leaves, stops answering pings, or the
/// server shuts down.
///
/// The connection is registered with the push table and the hub before the
/// first frame is read, and released from both on the way out whatever the
/// cause.
#[instrument(skip_all, fields(connection_id))]
pub async fn run_ws_session(ws: WebSocket, ctx: SessionContext, user: Option<String>) {
    let (connection, send_rx) = ctx.connections.register();
    let connection_id = connection.id.clone();
    let _ = tracing::Span::current().record("connection_id", tracing::field::display(&connection_id));

    let mut caller = CallerContext::new(connection_id.clone());
    if let Some(user) = user {
        caller = caller.with_user(user);
    }

    info!(user = ?caller.user, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    ctx.hub.on_connect(&connection_id);

    let (ws_tx, mut ws_rx) = ws.split();
    let mut outbound = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        ctx.heartbeat,
        ctx.shutdown.clone(),
    ));

    let cause = loop {
        tokio::select! {
            finished = &mut outbound => {
                break finished.unwrap_or_else(|e| DisconnectCause::Transport(e.to_string()));
            }
            next = ws_rx.next() => {
                let msg = match next {
                    None => break DisconnectCause::ClientClosed,
                    Some(Err(e)) => break DisconnectCause::Transport(e.to_string()),
                    Some(Ok(msg)) => msg,
                };
                connection.mark_alive();
                match msg {
                    Message::Text(text) => reply(&connection, dispatch_frame(&ctx.hub, &caller, text.as_str())),
                    Message::Binary(data) => {
                        let error = match std::str::from_utf8(&data) {
                            Ok(text) => dispatch_frame(&ctx.hub, &caller, text),
                            Err(_) => {
                                counter!(WS_INVALID_FRAMES_TOTAL).increment(1);
                                Some(ErrorFrame::new(INVALID_MESSAGE, "binary frame is not valid UTF-8"))
                            }
                        };
                        reply(&connection, error);
                    }
                    Message::Close(_) => break DisconnectCause::ClientClosed,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    };
    outbound.abort();

    info!(cause = ?cause, dropped = connection.drop_count(), "client disconnected");
    release(&ctx, &connection, &cause);
}

/// Drop a finished connection from the push table, then from the hub.
///
/// The aborted writer may still hold the queue receiver for a while, so the
/// table entry goes first: any push issued after this point fails, and a
/// `requestState` aimed at the departing connection resolves as
/// disconnected instead of waiting out its timeout.
fn release(ctx: &SessionContext, connection: &ClientConnection, cause: &DisconnectCause) {
    let _ = ctx.connections.unregister(&connection.id);
    ctx.hub.on_disconnect(&connection.id, cause);

    counter!(WS_DISCONNECTIONS_TOTAL, "cause" => cause_label(cause)).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

/// Decode one text frame and hand it to the hub.
///
/// Returns the error frame to send back, if any. A malformed frame or a
/// synchronous dispatch failure never closes the connection.
pub fn dispatch_frame(hub: &DashboardHub, caller: &CallerContext, text: &str) -> Option<ErrorFrame> {
    let message: InboundMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            counter!(WS_INVALID_FRAMES_TOTAL).increment(1);
            warn!(connection_id = %caller.connection_id, error = %e, "malformed inbound frame");
            return Some(ErrorFrame::new(INVALID_MESSAGE, format!("malformed message: {e}")));
        }
    };

    debug!(connection_id = %caller.connection_id, kind = message.name(), "inbound message");
    let event_id = match &message {
        InboundMessage::ClientEvent(event) => Some(event.event_id.clone()),
        _ => None,
    };

    hub.handle(caller, message).err().map(|e| {
        let frame = ErrorFrame::new(e.code(), e.to_string());
        match event_id {
            Some(id) => frame.for_event(id),
            None => frame,
        }
    })
}

fn reply(connection: &ClientConnection, error: Option<ErrorFrame>) {
    if let Some(frame) = error {
        if !connection.send_json(&frame) {
            debug!(connection_id = %connection.id, "error frame not delivered");
        }
    }
}

/// Forward queued frames to the socket and ping the client.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) -> DisconnectCause {
    let mut ping = tokio::time::interval(heartbeat.interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = send_rx.recv() => {
                let Some(frame) = frame else {
                    return DisconnectCause::ClientClosed;
                };
                if let Err(e) = ws_tx.send(Message::Text(frame.as_str().into())).await {
                    return DisconnectCause::Transport(e.to_string());
                }
            }
            _ = ping.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > heartbeat.timeout {
                    warn!(
                        connection_id = %connection.id,
                        silent_secs = connection.last_pong_elapsed().as_secs(),
                        "client unresponsive, disconnecting"
                    );
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return DisconnectCause::TimedOut;
                }
                if let Err(e) = ws_tx.send(Message::Ping(Bytes::new())).await {
                    return DisconnectCause::Transport(e.to_string());
                }
            }
            () = shutdown.cancelled() => {
                let close = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = ws_tx.send(Message::Close(Some(close))).await;
                return DisconnectCause::ServerShutdown;
            }
        }
    }
}

fn cause_label(cause: &DisconnectCause) -> &'static str {
    match cause {
        DisconnectCause::ClientClosed => "client_closed",
        DisconnectCause::TimedOut => "timed_out",
        DisconnectCause::ServerShutdown => "server_shutdown",
        DisconnectCause::Transport(_) => "transport",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dashhub_core::{
        CommandSink, ComponentId, Endpoint, EndpointRegistry, ExecutionContext, SessionId, StateRequestError, handler_fn,
    };
    use serde_json::json;

    fn hub_with(endpoints: &[&str]) -> (Arc<DashboardHub>, Arc<ConnectionManager>) {
        let manager = Arc::new(ConnectionManager::new(8));
        let registry = Arc::new(EndpointRegistry::new());
        let _ = registry.register_all(endpoints.iter().map(|id| {
            Arc::new(Endpoint::new(
                *id,
                handler_fn(|_ctx: &ExecutionContext| async { Ok(()) }),
            ))
        }));
        let hub = Arc::new(DashboardHub::new(Arc::clone(&manager) as Arc<dyn CommandSink>, registry));
        (hub, manager)
    }

    #[tokio::test]
    async fn malformed_frame_gets_invalid_message() {
        let (hub, _) = hub_with(&[]);
        let caller = CallerContext::new("c1".into());
        let frame = dispatch_frame(&hub, &caller, "{not json").unwrap();
        assert_eq!(frame.code, INVALID_MESSAGE);
        assert!(frame.event_id.is_none());
    }

    #[tokio::test]
    async fn unknown_type_gets_invalid_message() {
        let (hub, _) = hub_with(&[]);
        let caller = CallerContext::new("c1".into());
        let frame = dispatch_frame(&hub, &caller, r#"{"type":"launchRockets"}"#).unwrap();
        assert_eq!(frame.code, INVALID_MESSAGE);
    }

    #[tokio::test]
    async fn unknown_endpoint_reports_event_id() {
        let (hub, _) = hub_with(&[]);
        let caller = CallerContext::new("c1".into());
        let text = json!({"type": "clientEvent", "eventId": "nope", "eventName": "onClick"}).to_string();
        let frame = dispatch_frame(&hub, &caller, &text).unwrap();
        assert_eq!(frame.code, "ENDPOINT_NOT_FOUND");
        assert_eq!(frame.event_id.as_deref(), Some("nope"));
        assert_eq!(frame.message, "Endpoint nope not found.");
    }

    #[tokio::test]
    async fn known_endpoint_dispatches_without_reply() {
        let (hub, _) = hub_with(&["btn1"]);
        let caller = CallerContext::new("c1".into());
        let text = json!({"type": "clientEvent", "eventId": "btn1", "eventName": "onClick"}).to_string();
        assert!(dispatch_frame(&hub, &caller, &text).is_none());
        assert!(hub.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn set_session_id_binds() {
        let (hub, _) = hub_with(&[]);
        let caller = CallerContext::new("c1".into());
        let text = json!({"type": "setSessionId", "sessionId": "S1"}).to_string();
        assert!(dispatch_frame(&hub, &caller, &text).is_none());
        assert_eq!(
            hub.sessions().resolve_session(&"c1".into()),
            Some(SessionId::from("S1"))
        );
    }

    #[tokio::test]
    async fn reload_reaches_registered_connections() {
        let (hub, manager) = hub_with(&[]);
        let (conn, mut rx) = manager.register();
        let caller = CallerContext::new(conn.id.clone());
        assert!(dispatch_frame(&hub, &caller, r#"{"type":"reload"}"#).is_none());
        let pushed: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(pushed["type"], "reload");
    }

    fn session_ctx(hub: &Arc<DashboardHub>, manager: &Arc<ConnectionManager>) -> SessionContext {
        SessionContext {
            hub: Arc::clone(hub),
            connections: Arc::clone(manager),
            heartbeat: Heartbeat::default(),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn release_fails_later_state_requests_fast() {
        let (hub, manager) = hub_with(&[]);
        let ctx = session_ctx(&hub, &manager);
        // receiver stays alive, as it does while the aborted writer unwinds
        let (conn, _rx) = manager.register();
        ctx.hub.on_connect(&conn.id);

        release(&ctx, &conn, &DisconnectCause::ClientClosed);
        assert!(manager.get(&conn.id).is_none());

        let outcome = hub
            .request_state(&conn.id, &ComponentId::from("comp1"))
            .wait(Duration::from_secs(10))
            .await;
        assert_matches!(outcome, Err(StateRequestError::Disconnected { .. }));
        assert_eq!(hub.state_requests().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn release_resolves_outstanding_state_requests() {
        let (hub, manager) = hub_with(&[]);
        let ctx = session_ctx(&hub, &manager);
        let (conn, mut rx) = manager.register();
        ctx.hub.on_connect(&conn.id);

        let pending = hub.request_state(&conn.id, &ComponentId::from("comp1"));
        let pushed: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(pushed["type"], "requestState");

        release(&ctx, &conn, &DisconnectCause::Transport("reset".into()));
        assert_matches!(
            pending.wait(Duration::from_secs(10)).await,
            Err(StateRequestError::Disconnected { .. })
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn cause_labels_are_distinct() {
        let labels = [
            cause_label(&DisconnectCause::ClientClosed),
            cause_label(&DisconnectCause::TimedOut),
            cause_label(&DisconnectCause::ServerShutdown),
            cause_label(&DisconnectCause::Transport("reset".into())),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn default_heartbeat_matches_settings_defaults() {
        let settings = dashhub_settings::ServerSettings::default();
        let hb = Heartbeat::default();
        assert_eq!(hb.interval, settings.heartbeat_interval());
        assert_eq!(hb.timeout, settings.heartbeat_timeout());
    }
}
