//! Correlation context management.
//!
//! Every request gets a [`RequestContext`] at the front door: a correlation
//! ID (caller-supplied or minted), creation time, and an open metadata map
//! that accumulates routing, auth, and intent facts as the pipeline
//! progresses. Contexts are values: extension operations return a new
//! context and never mutate the original, so a handler holding an old
//! snapshot can never observe a later stage's writes.
//!
//! The [`scope`] submodule provides ambient access for code that cannot
//! take the context as an argument; [`ContextStore`] tracks in-flight
//! contexts so leaks are observable.

pub mod scope;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::{CorrelationId, IncomingRequest};

/// Inputs for [`RequestContext::create`]. All fields optional; anything
/// absent is simply not recorded.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Caller-supplied correlation ID. Used only if it validates; an
    /// invalid one is replaced (with a warning), never propagated.
    pub correlation_id: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Identity already resolved by upstream middleware, if any.
    pub user_id: Option<String>,
    pub user_email: Option<String>,
}

/// Identity facts produced by authentication.
#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    /// Backing service that vouched for the credentials (e.g. "google").
    pub service: Option<String>,
    /// Credential mechanism ("api_key", "oauth", ...).
    pub auth_type: Option<String>,
}

/// Per-request correlation context.
///
/// `correlation_id` and the creation instant are fixed at construction;
/// everything else accumulates through the `with_*` extension methods.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: CorrelationId,
    /// Wall-clock creation time, for log and response timestamps.
    pub created_at: DateTime<Utc>,
    /// Monotonic creation instant; the source for elapsed-time math.
    started_at: Instant,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub metadata: Map<String, Value>,
}

impl RequestContext {
    /// Build a context from explicit options.
    ///
    /// A supplied correlation ID is kept only when it validates; otherwise
    /// a fresh one is generated and the bad value logged, never failing
    /// the request.
    pub fn create(options: ContextOptions) -> Self {
        let correlation_id = match options.correlation_id {
            Some(id) if CorrelationId::is_valid(&id) => {
                CorrelationId::from_string(id).unwrap_or_default()
            }
            Some(id) => {
                warn!(
                    supplied = %id,
                    "invalid correlation id supplied, generating a fresh one"
                );
                CorrelationId::generate()
            }
            None => CorrelationId::generate(),
        };

        let mut metadata = Map::new();
        if let Some(method) = options.method {
            metadata.insert("method".to_string(), Value::String(method));
        }
        if let Some(path) = options.path {
            metadata.insert("path".to_string(), Value::String(path));
        }
        if let Some(ip) = options.ip {
            metadata.insert("ip".to_string(), Value::String(ip));
        }
        if let Some(user_agent) = options.user_agent {
            metadata.insert("user_agent".to_string(), Value::String(user_agent));
        }

        Self {
            correlation_id,
            created_at: Utc::now(),
            started_at: Instant::now(),
            user_id: options.user_id,
            user_email: options.user_email,
            metadata,
        }
    }

    /// Build a context straight from an incoming request: correlation ID
    /// from `x-correlation-id` / `x-request-id` (first non-empty wins),
    /// method, path, caller address, and user agent.
    pub fn from_request(req: &IncomingRequest) -> Self {
        Self::create(ContextOptions {
            correlation_id: req.correlation_header().map(str::to_string),
            method: Some(req.method.clone()),
            path: Some(req.path.clone()),
            ip: req.ip.clone(),
            user_agent: req.user_agent().map(str::to_string),
            user_id: None,
            user_email: None,
        })
    }

    /// New context with extra metadata merged in. The receiver is
    /// untouched; correlation ID and timing carry over.
    pub fn extend(&self, entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut next = self.clone();
        for (key, value) in entries {
            next.metadata.insert(key, value);
        }
        next
    }

    /// New context carrying resolved identity and auth metadata.
    pub fn with_auth(&self, info: &AuthInfo) -> Self {
        let mut next = self.clone();
        if info.user_id.is_some() {
            next.user_id = info.user_id.clone();
        }
        if info.user_email.is_some() {
            next.user_email = info.user_email.clone();
        }
        if let Some(service) = &info.service {
            next.metadata
                .insert("auth_service".to_string(), Value::String(service.clone()));
        }
        if let Some(auth_type) = &info.auth_type {
            next.metadata
                .insert("auth_type".to_string(), Value::String(auth_type.clone()));
        }
        next
    }

    /// New context recording the classified intent.
    pub fn with_intent(&self, action: &str, resource: &str, tools: &[String]) -> Self {
        self.extend([
            ("action".to_string(), Value::String(action.to_string())),
            ("resource".to_string(), Value::String(resource.to_string())),
            (
                "tools".to_string(),
                Value::Array(tools.iter().cloned().map(Value::String).collect()),
            ),
        ])
    }

    /// Time since creation. Monotonic: repeated calls never go backwards.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Elapsed milliseconds, saturating.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Slice of this context handed to a tool handler.
    pub fn tool_context(
        &self,
        previous_result: Option<Value>,
        cancellation: CancellationToken,
    ) -> ToolContext {
        ToolContext {
            correlation_id: self.correlation_id.clone(),
            user_id: self.user_id.clone(),
            user_email: self.user_email.clone(),
            previous_result,
            cancellation,
        }
    }

    /// Emit the single completion log line for this request.
    pub fn finalize(&self, outcome: &RequestOutcome) {
        let elapsed_ms = self.elapsed_ms();
        if outcome.success {
            info!(
                correlation_id = %self.correlation_id,
                status = outcome.status_code,
                elapsed_ms,
                "request completed"
            );
        } else {
            warn!(
                correlation_id = %self.correlation_id,
                status = outcome.status_code,
                elapsed_ms,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "request failed"
            );
        }
    }
}

/// How a request ended, for the completion log line.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub success: bool,
    pub status_code: u16,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn ok(status_code: u16) -> Self {
        Self {
            success: true,
            status_code,
            error: None,
        }
    }

    pub fn failed(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            error: Some(error.into()),
        }
    }
}

/// What a tool handler gets to see of the request: correlation ID,
/// resolved identity, the dependency phase's output, and a cancellation
/// token that fires when the step's deadline expires.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub correlation_id: CorrelationId,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub previous_result: Option<Value>,
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Whether the step's deadline has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

// =============================================================================
// In-flight context tracking
// =============================================================================

/// Registry of in-flight request contexts, keyed by correlation ID.
///
/// Purely observational: the processor tracks contexts at creation and
/// removes them at finalization, so a growing store means finalization is
/// being skipped somewhere. [`ContextStore::sweep_stale`] evicts entries
/// that outlive their request.
#[derive(Debug, Default)]
pub struct ContextStore {
    active: RwLock<HashMap<String, RequestContext>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a context as in-flight.
    pub async fn track(&self, ctx: &RequestContext) {
        self.active
            .write()
            .await
            .insert(ctx.correlation_id.as_str().to_string(), ctx.clone());
    }

    /// Drop a context from tracking, returning it if it was present.
    pub async fn remove(&self, id: &CorrelationId) -> Option<RequestContext> {
        self.active.write().await.remove(id.as_str())
    }

    /// Number of in-flight contexts.
    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Evict contexts older than `stale_after`, returning how many were
    /// swept. Each eviction is logged; a nonzero sweep means some path
    /// finished without finalizing.
    pub async fn sweep_stale(&self, stale_after: Duration) -> usize {
        let mut active = self.active.write().await;
        let before = active.len();
        active.retain(|id, ctx| {
            let stale = ctx.elapsed() >= stale_after;
            if stale {
                warn!(
                    correlation_id = %id,
                    elapsed_ms = ctx.elapsed_ms(),
                    "sweeping stale request context"
                );
            }
            !stale
        });
        before - active.len()
    }
}
