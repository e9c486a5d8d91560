//! The synchronization hub: entry points for everything a transport
//! reports about its connections.
//!
//! A transport calls [`DashboardHub::on_connect`] and
//! [`DashboardHub::on_disconnect`] around each connection and hands every
//! decoded inbound frame to [`DashboardHub::handle`]. Client events are
//! resolved synchronously and executed on a tracked background task, so the
//! transport's read loop never waits on endpoint logic.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::commands::{CommandSink, Commands};
use crate::context::{
    EVENT_DATA_VARIABLE, ExecutionContext, LOCATION_VARIABLE, Location, MemoryCache, USER_VARIABLE,
    decode_event_data,
};
use crate::engine::{DirectExecutionEngine, ExecutionEngine};
use crate::errors::{DispatchError, ExecutionError};
use crate::ids::{ComponentId, ConnectionId, RequestId, SessionId};
use crate::metrics::{CLIENT_EVENTS_TOTAL, ENDPOINT_FAILURES_TOTAL};
use crate::protocol::{ClientEvent, ElementState, InboundMessage};
use crate::registry::{EndpointLookup, EndpointRegistry, SessionLifecycle};
use crate::sessions::SessionRegistry;
use crate::state_request::{StateRequest, StateRequestBus};

/// Default deadline for state requests issued through an execution context.
pub const DEFAULT_STATE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one background endpoint execution.
pub type ExecutionHandle = JoinHandle<Result<HashMap<String, Value>, ExecutionError>>;

/// Hub tuning.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Deadline used by [`ExecutionContext::request_state`].
    pub state_request_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            state_request_timeout: DEFAULT_STATE_REQUEST_TIMEOUT,
        }
    }
}

/// Who sent an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerContext {
    /// Originating connection.
    pub connection_id: ConnectionId,
    /// Authenticated user name resolved by the transport, if any.
    pub user: Option<String>,
}

impl CallerContext {
    /// Anonymous caller.
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user: None,
        }
    }

    /// Attach an authenticated user name.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The client closed the connection.
    ClientClosed,
    /// The heartbeat deadline passed.
    TimedOut,
    /// The server is shutting down.
    ServerShutdown,
    /// The transport failed.
    Transport(String),
}

/// Real-time synchronization hub.
pub struct DashboardHub {
    sessions: SessionRegistry,
    endpoints: Arc<dyn EndpointLookup>,
    engine: Arc<dyn ExecutionEngine>,
    commands: Commands,
    state_requests: Arc<StateRequestBus>,
    memory_cache: Arc<MemoryCache>,
    tasks: TaskTracker,
    config: HubConfig,
}

impl DashboardHub {
    /// Hub over `sink`, using `registry` for endpoint lookup and session
    /// lifecycle, and running endpoints in place.
    pub fn new(sink: Arc<dyn CommandSink>, registry: Arc<EndpointRegistry>) -> Self {
        Self::with_collaborators(
            sink,
            Arc::clone(&registry) as Arc<dyn EndpointLookup>,
            registry,
            Arc::new(DirectExecutionEngine),
        )
    }

    /// Hub with explicit collaborators.
    pub fn with_collaborators(
        sink: Arc<dyn CommandSink>,
        endpoints: Arc<dyn EndpointLookup>,
        lifecycle: Arc<dyn SessionLifecycle>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Self {
        let commands = Commands::new(sink);
        Self {
            sessions: SessionRegistry::new(lifecycle),
            endpoints,
            engine,
            state_requests: Arc::new(StateRequestBus::new(commands.clone())),
            commands,
            memory_cache: Arc::new(MemoryCache::new()),
            tasks: TaskTracker::new(),
            config: HubConfig::default(),
        }
    }

    /// Replace the tuning.
    #[must_use]
    pub fn with_config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Outbound command handle.
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Connection/session registry.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Endpoint lookup.
    pub fn endpoints(&self) -> &Arc<dyn EndpointLookup> {
        &self.endpoints
    }

    /// Shared transient cache.
    pub fn memory_cache(&self) -> &Arc<MemoryCache> {
        &self.memory_cache
    }

    /// Correlation bus.
    pub fn state_requests(&self) -> &Arc<StateRequestBus> {
        &self.state_requests
    }

    /// A transport connection opened.
    pub fn on_connect(&self, connection_id: &ConnectionId) {
        self.sessions.on_connect(connection_id);
    }

    /// A transport connection closed. Never fails.
    pub fn on_disconnect(&self, connection_id: &ConnectionId, cause: &DisconnectCause) {
        match cause {
            DisconnectCause::Transport(reason) => {
                error!(%connection_id, reason = %reason, "connection lost");
            }
            other => debug!(%connection_id, cause = ?other, "connection closed"),
        }
        if let Some(session_id) = self.sessions.unbind(connection_id) {
            debug!(%connection_id, session = %session_id, "session released on disconnect");
        }
        let _ = self.state_requests.cancel_connection(connection_id);
    }

    /// Bind the caller's connection to `session_id`.
    pub fn set_session_id(&self, connection_id: &ConnectionId, session_id: &SessionId) {
        self.sessions.bind(connection_id, session_id);
    }

    /// End a session explicitly, detaching its connection.
    pub fn end_session(&self, session_id: &SessionId) -> Option<ConnectionId> {
        self.sessions.end_session(session_id)
    }

    /// A client answered a `requestState`. Late, duplicate, or foreign
    /// answers are dropped.
    pub fn request_state_response(&self, connection_id: &ConnectionId, request_id: &RequestId, state: ElementState) -> bool {
        self.state_requests.fulfill_from(connection_id, request_id, state)
    }

    /// Remove a dynamic endpoint from the caller's session, or globally if
    /// the caller has no session.
    pub fn unregister_event(&self, connection_id: &ConnectionId, event_id: &str) -> bool {
        let session_id = self.sessions.resolve_session(connection_id);
        self.endpoints.unregister(event_id, session_id.as_ref())
    }

    /// Tell every connected client to reload.
    pub fn reload(&self) -> usize {
        info!("broadcasting reload");
        self.commands.reload()
    }

    /// Ask a connection for a component's state.
    pub fn request_state(&self, connection_id: &ConnectionId, component_id: &ComponentId) -> StateRequest {
        self.state_requests.request_state(connection_id, component_id)
    }

    /// Route one decoded inbound message.
    pub fn handle(&self, caller: &CallerContext, message: InboundMessage) -> Result<(), DispatchError> {
        match message {
            InboundMessage::SetSessionId { session_id } => {
                self.set_session_id(&caller.connection_id, &session_id);
            }
            InboundMessage::RequestStateResponse { request_id, state } => {
                let _ = self.request_state_response(&caller.connection_id, &request_id, state);
            }
            InboundMessage::UnregisterEvent { event_id } => {
                let _ = self.unregister_event(&caller.connection_id, &event_id);
            }
            InboundMessage::ClientEvent(event) => {
                let _ = self.client_event(caller, event)?;
            }
            InboundMessage::Reload => {
                let _ = self.reload();
            }
        }
        Ok(())
    }

    /// Resolve a client event and run its endpoint in the background.
    ///
    /// Resolution failures are logged at WARN and returned here; the
    /// endpoint is not run. Execution failures are logged at ERROR and come
    /// back through the returned handle.
    pub fn client_event(&self, caller: &CallerContext, event: ClientEvent) -> Result<ExecutionHandle, DispatchError> {
        let variables = match build_variables(caller, &event) {
            Ok(v) => v,
            Err(e) => {
                warn!(event_id = %event.event_id, connection_id = %caller.connection_id, error = %e, "rejecting client event");
                counter!(CLIENT_EVENTS_TOTAL, "outcome" => "rejected").increment(1);
                return Err(e);
            }
        };

        let session_id = self.sessions.resolve_session(&caller.connection_id);
        let Some(endpoint) = self.endpoints.get(&event.event_id, session_id.as_ref()) else {
            let err = DispatchError::EndpointNotFound {
                event_id: event.event_id,
            };
            warn!(connection_id = %caller.connection_id, session = ?session_id, "{err}");
            counter!(CLIENT_EVENTS_TOTAL, "outcome" => "not_found").increment(1);
            return Err(err);
        };

        let ctx = ExecutionContext {
            endpoint: Arc::clone(&endpoint),
            variables,
            output: HashMap::new(),
            memory_cache: Arc::clone(&self.memory_cache),
            connection_id: Some(caller.connection_id.clone()),
            session_id: session_id.clone(),
            user: caller.user.clone(),
            commands: self.commands.clone(),
            state_requests: Arc::clone(&self.state_requests),
            state_request_timeout: self.config.state_request_timeout,
        };

        let span = info_span!(
            "client_event",
            endpoint = %endpoint.id(),
            event = %event.event_name,
            connection_id = %caller.connection_id,
            session = ?session_id,
        );
        counter!(CLIENT_EVENTS_TOTAL, "outcome" => "dispatched").increment(1);

        let engine = Arc::clone(&self.engine);
        let task = async move {
            let endpoint_id = endpoint.id().clone();
            let result = AssertUnwindSafe(engine.execute(ctx, endpoint))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(ExecutionError::Panicked {
                        endpoint: endpoint_id,
                        message: panic_message(payload.as_ref()),
                    })
                });
            match &result {
                Ok(_) => debug!("endpoint completed"),
                Err(e) => {
                    counter!(ENDPOINT_FAILURES_TOTAL).increment(1);
                    error!(error = %e, "endpoint failed");
                }
            }
            result
        };
        Ok(self.tasks.spawn(task.instrument(span)))
    }

    /// Number of endpoint executions still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting new executions into the drain set and wait for the
    /// running ones, up to `timeout`. Returns `true` if all finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let _ = self.tasks.close();
        let drained = tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok();
        if !drained {
            warn!(remaining = self.tasks.len(), "endpoint executions still running after drain timeout");
        }
        drained
    }
}

impl std::fmt::Debug for DashboardHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardHub")
            .field("sessions", &self.sessions)
            .field("state_requests", &self.state_requests)
            .field("in_flight", &self.tasks.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn build_variables(caller: &CallerContext, event: &ClientEvent) -> Result<HashMap<String, Value>, DispatchError> {
    let mut variables = HashMap::new();
    if let Some(user) = &caller.user {
        let _ = variables.insert(USER_VARIABLE.to_owned(), Value::String(user.clone()));
    }
    if !event.location.is_empty() {
        let location = Location::parse(&event.location).map_err(DispatchError::InvalidLocation)?;
        let value = serde_json::to_value(location).map_err(DispatchError::InvalidLocation)?;
        let _ = variables.insert(LOCATION_VARIABLE.to_owned(), value);
    }
    let _ = variables.insert(EVENT_DATA_VARIABLE.to_owned(), decode_event_data(&event.event_data));
    Ok(variables)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, handler_fn};
    use crate::errors::EndpointError;
    use crate::sessions::tests::LifecycleLog;
    use crate::testing::RecordingSink;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{Notify, mpsc};

    /// Captures the context of every execution instead of running it.
    struct CapturingEngine {
        tx: mpsc::UnboundedSender<ExecutionContext>,
    }

    #[async_trait]
    impl ExecutionEngine for CapturingEngine {
        async fn execute(
            &self,
            ctx: ExecutionContext,
            _endpoint: Arc<Endpoint>,
        ) -> Result<HashMap<String, Value>, ExecutionError> {
            let _ = self.tx.send(ctx);
            Ok(HashMap::new())
        }
    }

    fn noop() -> Arc<dyn crate::endpoint::EndpointHandler> {
        handler_fn(|_ctx: &ExecutionContext| async { Ok(()) })
    }

    struct Fixture {
        hub: Arc<DashboardHub>,
        registry: Arc<EndpointRegistry>,
        sink: Arc<RecordingSink>,
    }

    fn fixture() -> Fixture {
        let sink = Arc::new(RecordingSink::with_connections(&["C1", "C2"]));
        let registry = Arc::new(EndpointRegistry::new());
        let hub = DashboardHub::new(sink.clone(), Arc::clone(&registry));
        Fixture {
            hub: Arc::new(hub),
            registry,
            sink,
        }
    }

    fn capturing() -> (DashboardHub, Arc<EndpointRegistry>, mpsc::UnboundedReceiver<ExecutionContext>) {
        let sink = Arc::new(RecordingSink::with_connections(&["C1"]));
        let registry = Arc::new(EndpointRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = DashboardHub::with_collaborators(
            sink,
            Arc::clone(&registry) as Arc<dyn EndpointLookup>,
            Arc::clone(&registry) as Arc<dyn SessionLifecycle>,
            Arc::new(CapturingEngine { tx }),
        );
        (hub, registry, rx)
    }

    fn c1() -> CallerContext {
        CallerContext::new(ConnectionId::from("C1"))
    }

    #[tokio::test]
    async fn client_event_builds_context() {
        let (hub, registry, mut rx) = capturing();
        registry.register(Arc::new(Endpoint::new("btn1", noop())));
        hub.on_connect(&ConnectionId::from("C1"));
        hub.set_session_id(&ConnectionId::from("C1"), &SessionId::from("S1"));

        let handle = hub.client_event(&c1(), ClientEvent::new("btn1", "click")).unwrap();
        handle.await.unwrap().unwrap();

        let ctx = rx.recv().await.unwrap();
        assert_eq!(ctx.session_id, Some(SessionId::from("S1")));
        assert_eq!(ctx.connection_id, Some(ConnectionId::from("C1")));
        assert_eq!(ctx.event_data(), Some(&json!("")));
        assert!(ctx.variable(USER_VARIABLE).is_none());
        assert!(ctx.location().is_none());
        assert_eq!(ctx.endpoint.id().as_str(), "btn1");
    }

    #[tokio::test]
    async fn user_location_and_boolean_payload() {
        let (hub, registry, mut rx) = capturing();
        registry.register(Arc::new(Endpoint::new("chk", noop())));
        let caller = c1().with_user("alice");
        let event = ClientEvent::new("chk", "change")
            .with_data("True")
            .with_location(r#"{"pathname":"/home","search":""}"#);

        hub.client_event(&caller, event).unwrap().await.unwrap().unwrap();

        let ctx = rx.recv().await.unwrap();
        assert_eq!(ctx.variable(USER_VARIABLE), Some(&json!("alice")));
        assert_eq!(ctx.user.as_deref(), Some("alice"));
        assert_eq!(ctx.event_data(), Some(&json!(true)));
        assert_eq!(ctx.location().unwrap().pathname, "/home");
        assert!(ctx.session_id.is_none());
    }

    #[tokio::test]
    async fn unknown_endpoint_is_not_executed() {
        let (hub, _registry, mut rx) = capturing();
        let err = hub
            .client_event(&c1(), ClientEvent::new("missing", "click"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Endpoint missing not found.");
        assert_eq!(hub.in_flight(), 0);
        drop(hub);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn malformed_location_is_rejected() {
        let (hub, registry, _rx) = capturing();
        registry.register(Arc::new(Endpoint::new("btn1", noop())));
        let err = hub
            .client_event(&c1(), ClientEvent::new("btn1", "click").with_location("{oops"))
            .unwrap_err();
        assert_matches!(err, DispatchError::InvalidLocation(_));
    }

    #[tokio::test]
    async fn session_scoped_endpoint_resolves_for_its_session_only() {
        let f = fixture();
        f.registry
            .register(Arc::new(Endpoint::new("mine", noop()).scoped_to(SessionId::from("S1"))));
        f.hub.set_session_id(&ConnectionId::from("C1"), &SessionId::from("S1"));

        assert!(f.hub.client_event(&c1(), ClientEvent::new("mine", "click")).is_ok());
        let other = CallerContext::new(ConnectionId::from("C2"));
        assert_matches!(
            f.hub.client_event(&other, ClientEvent::new("mine", "click")),
            Err(DispatchError::EndpointNotFound { .. })
        );
    }

    #[tokio::test]
    async fn slow_endpoint_does_not_block_next_event() {
        let f = fixture();
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        f.registry.register(Arc::new(Endpoint::new(
            "slow",
            handler_fn(move |_ctx: &ExecutionContext| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(())
                }
            }),
        )));
        f.registry.register(Arc::new(Endpoint::new(
            "fast",
            handler_fn(|ctx: &ExecutionContext| {
                let ok = ctx.set_state(&ComponentId::from("label"), json!("done"));
                async move { if ok { Ok(()) } else { Err(EndpointError::failed("undelivered")) } }
            }),
        )));

        let slow = f.hub.client_event(&c1(), ClientEvent::new("slow", "click")).unwrap();
        let fast = f.hub.client_event(&c1(), ClientEvent::new("fast", "click")).unwrap();

        fast.await.unwrap().unwrap();
        assert!(!slow.is_finished());
        assert_eq!(f.sink.frames_for("C1")[0]["state"], "done");

        release.notify_one();
        slow.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn endpoint_failure_is_isolated() {
        let f = fixture();
        f.registry.register(Arc::new(Endpoint::new(
            "boom",
            handler_fn(|_ctx: &ExecutionContext| async { Err(EndpointError::failed("bad input")) }),
        )));
        f.registry.register(Arc::new(Endpoint::new("panic", Arc::new(Panicker))));
        f.registry.register(Arc::new(Endpoint::new("ok", noop())));

        let err = f.hub.client_event(&c1(), ClientEvent::new("boom", "click")).unwrap().await.unwrap();
        assert_matches!(err, Err(ExecutionError::Endpoint { .. }));

        let err = f.hub.client_event(&c1(), ClientEvent::new("panic", "click")).unwrap().await.unwrap();
        assert_matches!(err, Err(ExecutionError::Panicked { ref message, .. }) if message == "kaboom");

        let ok = f.hub.client_event(&c1(), ClientEvent::new("ok", "click")).unwrap().await.unwrap();
        assert!(ok.is_ok());
    }

    struct Panicker;

    #[async_trait]
    impl crate::endpoint::EndpointHandler for Panicker {
        async fn invoke(&self, _ctx: &mut ExecutionContext) -> Result<(), EndpointError> {
            panic!("kaboom")
        }
    }

    #[tokio::test]
    async fn endpoint_round_trips_state_through_client() {
        let f = fixture();
        f.registry.register(Arc::new(Endpoint::new(
            "read",
            Arc::new(ReadState) as Arc<dyn crate::endpoint::EndpointHandler>,
        )));

        let handle = f.hub.client_event(&c1(), ClientEvent::new("read", "click")).unwrap();

        let request_id = loop {
            let frames = f.sink.frames_for("C1");
            if let Some(frame) = frames.iter().find(|fr| fr["type"] == "requestState") {
                break RequestId::from(frame["requestId"].as_str().unwrap());
            }
            tokio::task::yield_now().await;
        };

        let caller = c1();
        f.hub
            .handle(&caller, InboundMessage::RequestStateResponse {
                request_id: request_id.clone(),
                state: json!({"value": 7}),
            })
            .unwrap();
        // stray duplicate is ignored
        assert!(!f.hub.request_state_response(&caller.connection_id, &request_id, json!("stateY")));

        let out = handle.await.unwrap().unwrap();
        assert_eq!(out["seen"], json!({"value": 7}));
    }

    struct ReadState;

    #[async_trait]
    impl crate::endpoint::EndpointHandler for ReadState {
        async fn invoke(&self, ctx: &mut ExecutionContext) -> Result<(), EndpointError> {
            let state = ctx.request_state(&ComponentId::from("comp1")).await?;
            let _ = ctx.output.insert("seen".into(), state);
            Ok(())
        }
    }

    #[tokio::test]
    async fn disconnect_resolves_pending_requests_and_ends_session() {
        let sink = Arc::new(RecordingSink::with_connections(&["C1"]));
        let log = Arc::new(LifecycleLog::default());
        let registry = Arc::new(EndpointRegistry::new());
        let hub = DashboardHub::with_collaborators(
            sink,
            registry as Arc<dyn EndpointLookup>,
            log.clone(),
            Arc::new(DirectExecutionEngine),
        );
        let c = ConnectionId::from("C1");
        hub.set_session_id(&c, &SessionId::from("S1"));

        let req = hub.request_state(&c, &ComponentId::from("comp1"));
        hub.on_disconnect(&c, &DisconnectCause::Transport("reset by peer".into()));

        assert_matches!(
            req.wait(Duration::from_secs(30)).await,
            Err(crate::errors::StateRequestError::Disconnected { .. })
        );
        assert!(hub.sessions().resolve_session(&c).is_none());
        assert_eq!(log.take(), ["start:S1", "end:S1"]);

        // a second disconnect is harmless
        hub.on_disconnect(&c, &DisconnectCause::ClientClosed);
    }

    #[tokio::test]
    async fn unregister_event_uses_caller_session() {
        let f = fixture();
        let s1 = SessionId::from("S1");
        f.registry.register(Arc::new(Endpoint::new("dyn", noop())));
        f.registry.register(Arc::new(Endpoint::new("dyn", noop()).scoped_to(s1.clone())));
        f.hub.set_session_id(&ConnectionId::from("C1"), &s1);

        f.hub
            .handle(&c1(), InboundMessage::UnregisterEvent { event_id: "dyn".into() })
            .unwrap();
        assert!(f.registry.get("dyn", Some(&s1)).unwrap().is_global());

        let anon = CallerContext::new(ConnectionId::from("C2"));
        assert!(f.hub.unregister_event(&anon.connection_id, "dyn"));
        assert!(f.registry.get("dyn", None).is_none());
        assert!(!f.hub.unregister_event(&anon.connection_id, "dyn"));
    }

    #[tokio::test]
    async fn reload_reaches_everyone() {
        let f = fixture();
        f.hub.handle(&c1(), InboundMessage::Reload).unwrap();
        assert_eq!(f.sink.frames_for("C1")[0]["type"], "reload");
        assert_eq!(f.sink.frames_for("C2")[0]["type"], "reload");
    }

    #[tokio::test]
    async fn memory_cache_is_shared_between_dispatches() {
        let f = fixture();
        f.registry.register(Arc::new(Endpoint::new("count", Arc::new(Counter) as _)));
        for _ in 0..3 {
            f.hub
                .client_event(&c1(), ClientEvent::new("count", "click"))
                .unwrap()
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(f.hub.memory_cache().get("clicks"), Some(json!(3)));
    }

    struct Counter;

    #[async_trait]
    impl crate::endpoint::EndpointHandler for Counter {
        async fn invoke(&self, ctx: &mut ExecutionContext) -> Result<(), EndpointError> {
            let _ = ctx
                .memory_cache
                .update("clicks", |v| json!(v.and_then(Value::as_i64).unwrap_or(0) + 1));
            Ok(())
        }
    }

    #[tokio::test]
    async fn drain_waits_for_running_endpoints() {
        let f = fixture();
        let gate = Arc::new(Notify::new());
        let waiter = Arc::clone(&gate);
        f.registry.register(Arc::new(Endpoint::new(
            "slow",
            handler_fn(move |_ctx: &ExecutionContext| {
                let gate = Arc::clone(&waiter);
                async move {
                    gate.notified().await;
                    Ok(())
                }
            }),
        )));
        let _handle = f.hub.client_event(&c1(), ClientEvent::new("slow", "click")).unwrap();

        assert!(!f.hub.drain(Duration::from_millis(20)).await);
        gate.notify_one();
        assert!(f.hub.drain(Duration::from_secs(5)).await);
        assert_eq!(f.hub.in_flight(), 0);
    }
}
