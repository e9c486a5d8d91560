//! `DashServer`: axum router, listener and shutdown wiring.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use dashhub_core::{CommandSink, DashboardHub, EndpointRegistry, HubConfig};
use dashhub_settings::{DashSettings, ServerSettings};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::manager::ConnectionManager;
use crate::websocket::session::{Heartbeat, SessionContext, run_ws_session};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    session: SessionContext,
    shutdown: Arc<ShutdownCoordinator>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    max_message_size: usize,
    user_header: Option<Arc<str>>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// The dashboard server: one hub, its WebSocket transport, and the HTTP
/// routes around it.
pub struct DashServer {
    settings: ServerSettings,
    hub: Arc<DashboardHub>,
    connections: Arc<ConnectionManager>,
    shutdown: Arc<ShutdownCoordinator>,
    permits: Arc<Semaphore>,
    metrics: Option<PrometheusHandle>,
    drain_timeout: Duration,
    start_time: Instant,
}

impl DashServer {
    /// Server resolving client events against `registry`.
    pub fn new(settings: &DashSettings, registry: Arc<EndpointRegistry>) -> Self {
        let connections = Arc::new(ConnectionManager::new(settings.server.send_queue_capacity));
        let hub = DashboardHub::new(Arc::clone(&connections) as Arc<dyn CommandSink>, registry).with_config(
            HubConfig {
                state_request_timeout: settings.hub.state_request_timeout(),
            },
        );
        Self {
            settings: settings.server.clone(),
            hub: Arc::new(hub),
            connections,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            permits: Arc::new(Semaphore::new(settings.server.max_connections)),
            metrics: None,
            drain_timeout: settings.hub.shutdown_timeout(),
            start_time: Instant::now(),
        }
    }

    /// Serve `handle` at `/metrics` (when metrics are enabled).
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let state = AppState {
            session: SessionContext {
                hub: Arc::clone(&self.hub),
                connections: Arc::clone(&self.connections),
                heartbeat: Heartbeat {
                    interval: self.settings.heartbeat_interval(),
                    timeout: self.settings.heartbeat_timeout(),
                },
                shutdown: self.shutdown.token(),
            },
            shutdown: Arc::clone(&self.shutdown),
            permits: Arc::clone(&self.permits),
            max_connections: self.settings.max_connections,
            max_message_size: self.settings.max_message_size,
            user_header: self.settings.user_header.as_deref().map(Arc::from),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler));
        if self.settings.metrics && self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        router
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve in the background.
    ///
    /// The returned task ends after shutdown is signalled, the listener has
    /// closed, and running endpoint executions were drained (bounded by
    /// the hub shutdown timeout).
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let address = self.settings.bind_address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind { address, source })?;
        info!(%local_addr, max_connections = self.settings.max_connections, "dashhub server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let hub = Arc::clone(&self.hub);
        let drain_timeout = self.drain_timeout;
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server terminated with error");
            }
            info!(in_flight = hub.in_flight(), "listener closed, draining endpoint executions");
            if hub.drain(drain_timeout).await {
                info!("all endpoint executions finished");
            }
        });
        Ok((local_addr, handle))
    }

    /// The hub.
    pub fn hub(&self) -> &Arc<DashboardHub> {
        &self.hub
    }

    /// The live connection table.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Transport settings in effect.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// How long shutdown waits for running endpoints.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }
}

impl std::fmt::Debug for DashServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashServer")
            .field("settings", &self.settings)
            .field("connections", &self.connections.len())
            .field("shutting_down", &self.shutdown.is_shutting_down())
            .finish_non_exhaustive()
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, headers: HeaderMap, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        counter!(WS_REJECTED_TOTAL, "reason" => "shutting_down").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let Ok(permit) = Arc::clone(&state.permits).try_acquire_owned() else {
        warn!(max_connections = state.max_connections, "connection limit reached, refusing upgrade");
        counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let user = state
        .user_header
        .as_deref()
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let ctx = state.session.clone();

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, ctx, user).await;
            drop(permit);
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let hub = &state.session.hub;
    Json(health::health_check(
        state.start_time,
        state.shutdown.is_shutting_down(),
        state.session.connections.len(),
        hub.sessions().len(),
        hub.in_flight(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
