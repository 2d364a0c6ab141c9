//! Request processor — the pipeline orchestrator.
//!
//! [`RequestProcessor::process`] takes a framework-agnostic request
//! through the gates in order: context, intent classification,
//! authentication, input validation, rate limiting, then plan execution.
//! A failed gate short-circuits the rest and the result always carries
//! the correlation ID and elapsed duration. Nothing escapes as a panic:
//! the pipeline is unwind-contained at the top, and each tool handler is
//! contained individually.
//!
//! Plan execution walks phases in ascending order. A single-step phase
//! runs inline; a fan-out phase runs its steps concurrently and the
//! phase settles only when every step has. Any step failure fails the
//! phase and the plan — there is no partial-success continuation. Each
//! step races its handler against a deadline (step timeout, then
//! call-level timeout, then the configured default); a deadline miss
//! drops the handler future and fires the cancellation token handed to
//! it, so timed-out work is actually released.

pub mod collaborators;
pub mod plan;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{scope, ContextStore, RequestContext, RequestOutcome};
use crate::registry::SharedRegistry;
use crate::response::{self, ApiResponse};
use crate::types::{Config, ErrorCode, IncomingRequest, InvocationError, InvocationResult};

use collaborators::{
    AuthOutcome, AuthResolver, InputValidator, IntentResolver, MetricsRecorder, NoopTracer,
    SchemaValidator, SlidingWindowMetrics, TraceHandle, Tracer, ValidationOutcome,
};
use plan::{group_into_phases, PhaseResults};

pub use plan::{ExecutionStep, ResolvedIntent};

// =============================================================================
// Options
// =============================================================================

/// Per-call knobs for [`RequestProcessor::process`].
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Context already created by upstream middleware; reused instead of
    /// deriving one from the request.
    pub context: Option<RequestContext>,

    /// Overrides the auth type the route implies.
    pub auth_type: Option<String>,

    /// JSON Schema for the request body. Validation runs only when both
    /// a schema and a body are present.
    pub input_schema: Option<Value>,

    /// Skip the rate limit gate entirely.
    pub skip_rate_limit: bool,

    /// Call-level step deadline, between per-step timeouts and the
    /// configured default.
    pub timeout: Option<Duration>,
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, ctx: RequestContext) -> Self {
        self.context = Some(ctx);
        self
    }

    pub fn with_auth_type(mut self, auth_type: impl Into<String>) -> Self {
        self.auth_type = Some(auth_type.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// =============================================================================
// Processor
// =============================================================================

/// The pipeline orchestrator. Construct once, share via `Arc` or clone
/// the cheap handles it holds.
pub struct RequestProcessor {
    registry: SharedRegistry,
    contexts: Arc<ContextStore>,
    intents: Arc<dyn IntentResolver>,
    auth: Arc<dyn AuthResolver>,
    validator: Arc<dyn InputValidator>,
    metrics: Arc<dyn MetricsRecorder>,
    tracer: Arc<dyn Tracer>,
    config: Config,
    default_metrics: bool,
}

impl fmt::Debug for RequestProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestProcessor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestProcessor {
    /// Processor with default collaborators: JSON Schema validation,
    /// in-process sliding-window metrics, no tracing.
    pub fn new(
        registry: SharedRegistry,
        intents: Arc<dyn IntentResolver>,
        auth: Arc<dyn AuthResolver>,
    ) -> Self {
        Self {
            registry,
            contexts: Arc::new(ContextStore::new()),
            intents,
            auth,
            validator: Arc::new(SchemaValidator),
            metrics: Arc::new(SlidingWindowMetrics::default()),
            tracer: Arc::new(NoopTracer),
            config: Config::default(),
            default_metrics: true,
        }
    }

    /// Replace the configuration. While the built-in metrics recorder is
    /// in use it is rebuilt to match the configured rate limit window.
    pub fn with_config(mut self, config: Config) -> Self {
        if self.default_metrics {
            self.metrics = Arc::new(SlidingWindowMetrics::new(config.rate_limits.window));
        }
        self.config = config;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn InputValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.default_metrics = false;
        self.metrics = metrics;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// In-flight context tracking, for observability and stale sweeps.
    pub fn contexts(&self) -> &Arc<ContextStore> {
        &self.contexts
    }

    /// Run one request through the full pipeline.
    ///
    /// Infallible by contract: every failure mode becomes a structured
    /// error result, including panics anywhere in the pipeline.
    pub async fn process(&self, req: &IncomingRequest, options: ProcessOptions) -> InvocationResult {
        let ctx = options
            .context
            .clone()
            .unwrap_or_else(|| RequestContext::from_request(req));
        self.contexts.track(&ctx).await;
        let trace = self.tracer.start_trace(&ctx.correlation_id, "request");

        let pipeline = scope::with_scope(
            ctx.clone(),
            self.run(req, &options, ctx.clone(), trace.as_ref()),
        );
        let (result, intent_name) = match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let err = InvocationError::new(
                    ErrorCode::InternalError,
                    panic_message(panic.as_ref()),
                );
                (
                    InvocationResult::fail(ctx.correlation_id.clone(), err, ctx.elapsed_ms()),
                    None,
                )
            }
        };

        let status = result.http_status();
        let outcome_tag = if result.success { "success" } else { "failure" };
        self.metrics
            .record(
                "request",
                result.duration_ms,
                &[
                    ("intent", intent_name.as_deref().unwrap_or("unresolved")),
                    ("outcome", outcome_tag),
                ],
            )
            .await;

        let outcome = if result.success {
            RequestOutcome::ok(status)
        } else {
            RequestOutcome::failed(
                status,
                result
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_default(),
            )
        };
        ctx.finalize(&outcome);
        self.contexts.remove(&ctx.correlation_id).await;
        trace.end();
        result
    }

    /// [`RequestProcessor::process`] piped through the response builder:
    /// what a framework adapter mounts as its handler.
    pub async fn handle(&self, req: &IncomingRequest, options: ProcessOptions) -> ApiResponse {
        let result = self.process(req, options).await;
        response::from_invocation_result(result, None)
    }

    /// Invoke a single tool directly, bypassing intent classification
    /// and every gate. Same lookup and containment semantics as a plan
    /// step, but no deadline is applied.
    pub async fn invoke_tool(
        &self,
        tool_id: &str,
        input: Value,
        ctx: &RequestContext,
    ) -> Result<Value, InvocationError> {
        let trace = self.tracer.start_trace(&ctx.correlation_id, "invoke_tool");
        let result = self
            .run_tool(tool_id, input, None, ctx, None, trace.as_ref())
            .await;
        trace.end();
        result
    }

    // -------------------------------------------------------------------------
    // Pipeline stages
    // -------------------------------------------------------------------------

    async fn run(
        &self,
        req: &IncomingRequest,
        options: &ProcessOptions,
        ctx: RequestContext,
        trace: &dyn TraceHandle,
    ) -> (InvocationResult, Option<String>) {
        // Intent classification
        let span = trace.start_span("intent");
        let Some(intent) = self.intents.resolve(req).await else {
            let message = format!("no intent matches {} {}", req.method, req.path);
            span.error(&message);
            let err = InvocationError::new(ErrorCode::RouteNotFound, message);
            return (
                InvocationResult::fail(ctx.correlation_id.clone(), err, ctx.elapsed_ms()),
                None,
            );
        };
        span.end();
        let intent_name = intent.name();
        let mut ctx = ctx.with_intent(&intent.action, &intent.resource, &intent.tools);

        // Authentication
        if intent.auth_required {
            let span = trace.start_span("auth");
            let auth_type = options.auth_type.as_deref().or(intent.auth_type.as_deref());
            match self.auth.authenticate(req, auth_type).await {
                AuthOutcome::Granted(info) => {
                    ctx = ctx.with_auth(&info);
                    span.end();
                }
                AuthOutcome::Denied { code, message } => {
                    span.error(&message);
                    let code =
                        code.unwrap_or_else(|| ErrorCode::Unauthorized.as_str().to_string());
                    let err = InvocationError::raw(code, message);
                    return (
                        InvocationResult::fail(ctx.correlation_id.clone(), err, ctx.elapsed_ms()),
                        Some(intent_name),
                    );
                }
            }
        }

        // Input validation
        if let (Some(schema), Some(body)) = (&options.input_schema, &req.body) {
            let span = trace.start_span("validate");
            match self.validator.validate(schema, body).await {
                ValidationOutcome::Valid => span.end(),
                ValidationOutcome::Invalid { errors } => {
                    span.error("input validation failed");
                    let err =
                        InvocationError::new(ErrorCode::ValidationError, "input validation failed")
                            .with_details(json!({ "errors": errors }));
                    return (
                        InvocationResult::fail(ctx.correlation_id.clone(), err, ctx.elapsed_ms()),
                        Some(intent_name),
                    );
                }
            }
        }

        // Rate limiting — only the intent's primary tool is throttled.
        if !options.skip_rate_limit {
            if let Some(primary) = intent.primary_tool() {
                let span = trace.start_span("rate_limit");
                let tier = self
                    .registry
                    .get(primary)
                    .await
                    .map(|tool| tool.spec.rate_limit)
                    .unwrap_or_default();
                let limit = self.config.rate_limits.tiers.budget_for(tier);
                let key = format!("{}:{}", rate_limit_subject(&ctx, req), primary);
                let decision = self.metrics.check_rate_limit(&key, limit).await;
                if !decision.allowed {
                    span.error("rate limit exceeded");
                    let err = InvocationError::new(
                        ErrorCode::RateLimited,
                        format!("rate limit exceeded for tool '{primary}'"),
                    )
                    .with_details(json!({
                        "limit": decision.limit,
                        "remaining": decision.remaining,
                        "resetAt": decision.reset_at,
                    }));
                    return (
                        InvocationResult::fail(ctx.correlation_id.clone(), err, ctx.elapsed_ms()),
                        Some(intent_name),
                    );
                }
                span.end();
            }
        }

        // Plan execution
        let span = trace.start_span("execute");
        match self.run_plan(&intent, req, &ctx, options, trace).await {
            Ok(data) => {
                span.end();
                (
                    InvocationResult::ok(ctx.correlation_id.clone(), data, ctx.elapsed_ms()),
                    Some(intent_name),
                )
            }
            Err(err) => {
                span.error(&err.message);
                (
                    InvocationResult::fail(ctx.correlation_id.clone(), err, ctx.elapsed_ms()),
                    Some(intent_name),
                )
            }
        }
    }

    // -------------------------------------------------------------------------
    // Plan execution
    // -------------------------------------------------------------------------

    async fn run_plan(
        &self,
        intent: &ResolvedIntent,
        req: &IncomingRequest,
        ctx: &RequestContext,
        options: &ProcessOptions,
        trace: &dyn TraceHandle,
    ) -> Result<Value, InvocationError> {
        let max_steps = self.config.processor.max_plan_steps;
        if intent.execution_plan.len() > max_steps {
            return Err(InvocationError::new(
                ErrorCode::InternalError,
                format!(
                    "execution plan has {} steps, above the configured maximum of {max_steps}",
                    intent.execution_plan.len()
                ),
            ));
        }

        let phases = group_into_phases(&intent.execution_plan);
        let mut completed = PhaseResults::default();
        let input = req.assembled_input();

        for (order, steps) in phases {
            // Every step's dependencies must be satisfied before any
            // step in the phase starts.
            for step in &steps {
                let missing = completed.missing_dependencies(step);
                if !missing.is_empty() {
                    return Err(InvocationError::new(
                        ErrorCode::InternalError,
                        format!(
                            "step '{}' in phase {} depends on unsatisfied phase(s) {:?}",
                            step.tool_id, order, missing
                        ),
                    ));
                }
            }

            let prepared: Vec<(&ExecutionStep, Option<Value>)> = steps
                .iter()
                .map(|step| (*step, completed.previous_for(step)))
                .collect();

            let mut phase_results: Vec<(String, Value)> = Vec::with_capacity(prepared.len());
            if let [(step, previous)] = prepared.as_slice() {
                let value = self
                    .run_tool(
                        &step.tool_id,
                        input.clone(),
                        previous.clone(),
                        ctx,
                        Some(self.step_deadline(step, options)),
                        trace,
                    )
                    .await?;
                phase_results.push((step.tool_id.clone(), value));
            } else {
                // Fan out. The phase settles only when every step has;
                // the first failure (in step order) then fails the plan.
                let settled = join_all(prepared.iter().map(|(step, previous)| {
                    let input = input.clone();
                    let previous = previous.clone();
                    async move {
                        let value = self
                            .run_tool(
                                &step.tool_id,
                                input,
                                previous,
                                ctx,
                                Some(self.step_deadline(step, options)),
                                trace,
                            )
                            .await;
                        (step.tool_id.clone(), value)
                    }
                }))
                .await;

                let mut first_err = None;
                for (tool_id, value) in settled {
                    match value {
                        Ok(v) => phase_results.push((tool_id, v)),
                        Err(e) => {
                            if first_err.is_none() {
                                first_err = Some(e);
                            }
                        }
                    }
                }
                if let Some(err) = first_err {
                    return Err(err);
                }
            }
            completed.insert_phase(order, phase_results);
        }

        Ok(completed.final_output())
    }

    fn step_deadline(&self, step: &ExecutionStep, options: &ProcessOptions) -> Duration {
        step.timeout
            .or(options.timeout)
            .unwrap_or(self.config.processor.step_timeout)
    }

    /// Look up, invoke, and contain one tool handler. `deadline: None`
    /// awaits the handler with no time limit.
    async fn run_tool(
        &self,
        tool_id: &str,
        input: Value,
        previous: Option<Value>,
        ctx: &RequestContext,
        deadline: Option<Duration>,
        trace: &dyn TraceHandle,
    ) -> Result<Value, InvocationError> {
        let span = trace.start_span(&format!("tool.{tool_id}"));
        let Some(tool) = self.registry.get_enabled(tool_id).await else {
            let err = InvocationError::new(
                ErrorCode::ToolDisabled,
                format!("tool '{tool_id}' is absent or disabled"),
            );
            span.error(&err.message);
            return Err(err);
        };

        let token = CancellationToken::new();
        let tool_ctx = ctx.tool_context(previous, token.clone());
        let started = Instant::now();
        let handler_fut = AssertUnwindSafe((tool.handler)(input, tool_ctx)).catch_unwind();

        let (result, outcome_tag) = match deadline {
            Some(limit) => match tokio::time::timeout(limit, handler_fut).await {
                Ok(settled) => settle(tool_id, settled),
                Err(_) => {
                    // The handler future is already dropped; the token
                    // tells any work it spawned to stop too.
                    token.cancel();
                    (
                        Err(InvocationError::new(
                            ErrorCode::ToolExecutionError,
                            format!(
                                "tool '{}' timed out after {}ms",
                                tool_id,
                                limit.as_millis()
                            ),
                        )),
                        "timeout",
                    )
                }
            },
            None => settle(tool_id, handler_fut.await),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.metrics
            .record(
                "tool",
                duration_ms,
                &[("tool", tool_id), ("outcome", outcome_tag)],
            )
            .await;
        match &result {
            Ok(_) => {
                span.end();
                debug!(tool_id, duration_ms, "tool invocation completed");
            }
            Err(err) => {
                span.error(&err.message);
                warn!(
                    tool_id,
                    duration_ms,
                    code = %err.code,
                    error = %err.message,
                    "tool invocation failed"
                );
            }
        }
        result
    }
}

/// Identity a rate limit budget is charged to: resolved user, else
/// caller address, else a shared anonymous bucket.
fn rate_limit_subject<'a>(ctx: &'a RequestContext, req: &'a IncomingRequest) -> &'a str {
    ctx.user_id
        .as_deref()
        .or(req.ip.as_deref())
        .unwrap_or("anonymous")
}

type Settled = Result<crate::types::Result<Value>, Box<dyn Any + Send>>;

fn settle(tool_id: &str, settled: Settled) -> (Result<Value, InvocationError>, &'static str) {
    match settled {
        Ok(Ok(value)) => (Ok(value), "success"),
        Ok(Err(err)) => (Err(InvocationError::from(err)), "failure"),
        Err(panic) => (
            Err(InvocationError::new(
                ErrorCode::ToolExecutionError,
                format!("tool '{}' panicked: {}", tool_id, panic_message(panic.as_ref())),
            )),
            "failure",
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
