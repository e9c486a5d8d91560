//! Execution engine seam.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::endpoint::Endpoint;
use crate::errors::ExecutionError;

/// Runs a resolved endpoint against its context.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Execute `endpoint`, returning the reciprocal output variables.
    async fn execute(
        &self,
        ctx: ExecutionContext,
        endpoint: Arc<Endpoint>,
    ) -> Result<HashMap<String, Value>, ExecutionError>;
}

/// Engine that calls the endpoint's handler in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectExecutionEngine;

#[async_trait]
impl ExecutionEngine for DirectExecutionEngine {
    async fn execute(
        &self,
        mut ctx: ExecutionContext,
        endpoint: Arc<Endpoint>,
    ) -> Result<HashMap<String, Value>, ExecutionError> {
        endpoint
            .handler()
            .invoke(&mut ctx)
            .await
            .map_err(|source| ExecutionError::Endpoint {
                endpoint: endpoint.id().clone(),
                source,
            })?;
        Ok(ctx.output)
    }
}
