//! Server-side callable units addressed by client events.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::errors::EndpointError;
use crate::ids::{EndpointId, SessionId};

/// Logic behind an endpoint.
///
/// Implementations may push commands and issue state requests through the
/// context, and may write reciprocal values into `ctx.output`.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    /// Run the endpoint for one client event.
    async fn invoke(&self, ctx: &mut ExecutionContext) -> Result<(), EndpointError>;
}

/// Adapter turning an async closure into an [`EndpointHandler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EndpointHandler for FnHandler<F>
where
    F: Fn(&ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), EndpointError>> + Send + 'static,
{
    async fn invoke(&self, ctx: &mut ExecutionContext) -> Result<(), EndpointError> {
        (self.0)(ctx).await
    }
}

/// Build a handler from a closure.
///
/// The closure receives the context by reference and returns a `'static`
/// future, so it must clone whatever it needs out of the context first:
///
/// ```ignore
/// let handler = handler_fn(|ctx: &ExecutionContext| {
///     let commands = ctx.commands.clone();
///     let conn = ctx.connection_id.clone();
///     async move { /* ... */ Ok(()) }
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EndpointHandler>
where
    F: Fn(&ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EndpointError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A registered endpoint: identifier, optional session scope, and handler.
///
/// Immutable once built.
#[derive(Clone)]
pub struct Endpoint {
    id: EndpointId,
    session_id: Option<SessionId>,
    handler: Arc<dyn EndpointHandler>,
}

impl Endpoint {
    /// Global endpoint.
    pub fn new(id: impl Into<EndpointId>, handler: Arc<dyn EndpointHandler>) -> Self {
        Self {
            id: id.into(),
            session_id: None,
            handler,
        }
    }

    /// Restrict the endpoint to one session.
    #[must_use]
    pub fn scoped_to(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Endpoint identifier.
    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    /// Owning session, `None` for global endpoints.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Whether the endpoint is visible to every session.
    pub fn is_global(&self) -> bool {
        self.session_id.is_none()
    }

    /// The callable unit.
    pub fn handler(&self) -> &Arc<dyn EndpointHandler> {
        &self.handler
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Endpoints compare by address (ID and scope), not by handler identity.
impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.session_id == other.session_id
    }
}

impl Eq for Endpoint {}
