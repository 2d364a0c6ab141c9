//! Ambient request scope.
//!
//! Code deep inside a tool handler often needs the correlation ID without
//! every intermediate function threading a context argument through. The
//! scope is task-local: it survives `.await` points within the request's
//! task tree and is invisible to unrelated requests interleaved on the
//! same runtime, so there is no cross-request leakage by construction.
//!
//! The pipeline itself still passes [`RequestContext`] explicitly; the
//! ambient scope is a convenience for leaf code, not the transport.

use std::future::Future;

use tokio::task_local;

use super::RequestContext;
use crate::types::{CorrelationId, Error, Result};

task_local! {
    static CURRENT_CONTEXT: RequestContext;
}

/// Run `fut` with `ctx` as the ambient request context.
///
/// The scope covers every suspension point inside `fut`, including
/// sub-futures polled concurrently on the same task. Nested calls shadow
/// the outer scope for their duration.
pub async fn with_scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_CONTEXT.scope(ctx, fut).await
}

/// Synchronous variant of [`with_scope`] for non-async callers.
pub fn with_scope_sync<F, R>(ctx: RequestContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_CONTEXT.sync_scope(ctx, f)
}

/// The context currently in scope, if any.
pub fn current() -> Option<RequestContext> {
    CURRENT_CONTEXT.try_with(|ctx| ctx.clone()).ok()
}

/// The context currently in scope, failing loudly outside any scope.
pub fn require() -> Result<RequestContext> {
    CURRENT_CONTEXT
        .try_with(|ctx| ctx.clone())
        .map_err(|_| Error::internal("no request context in scope"))
}

/// Correlation ID of the context in scope, if any.
pub fn correlation_id() -> Option<CorrelationId> {
    CURRENT_CONTEXT
        .try_with(|ctx| ctx.correlation_id.clone())
        .ok()
}
