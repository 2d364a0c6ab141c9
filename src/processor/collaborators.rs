//! Collaborator interfaces the processor consumes.
//!
//! Intent classification, authentication, input validation, metrics, and
//! tracing are all external concerns: the processor only sees these
//! traits. Default implementations live alongside so the pipeline runs
//! out of the box — a JSON Schema validator, an in-process sliding-window
//! metrics recorder, and log-backed/no-op tracers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::plan::ResolvedIntent;
use crate::context::AuthInfo;
use crate::types::{CorrelationId, IncomingRequest};

// =============================================================================
// Interfaces
// =============================================================================

/// Maps `(method, path)` onto a semantic intent, or `None` when no route
/// matches.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(&self, req: &IncomingRequest) -> Option<ResolvedIntent>;
}

/// Resolves credentials from request headers against an auth type.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn authenticate(&self, req: &IncomingRequest, auth_type: Option<&str>) -> AuthOutcome;
}

/// Validates a request body against a schema, reporting field-level
/// errors.
#[async_trait]
pub trait InputValidator: Send + Sync {
    async fn validate(&self, schema: &Value, body: &Value) -> ValidationOutcome;
}

/// Records durations and answers rate limit questions.
#[async_trait]
pub trait MetricsRecorder: Send + Sync {
    /// Record a named duration with open tags.
    async fn record(&self, name: &str, duration_ms: u64, tags: &[(&str, &str)]);

    /// Whether `key` may spend one more unit of its `limit` budget. An
    /// allowed decision counts the spend.
    async fn check_rate_limit(&self, key: &str, limit: u32) -> RateLimitDecision;
}

/// Creates one trace per request; traces hand out spans per stage.
pub trait Tracer: Send + Sync {
    fn start_trace(&self, correlation_id: &CorrelationId, name: &str) -> Box<dyn TraceHandle>;
}

/// One request-wide trace.
pub trait TraceHandle: Send + Sync {
    fn start_span(&self, name: &str) -> Box<dyn SpanHandle>;
    fn end(&self);
}

/// One pipeline-stage span.
pub trait SpanHandle: Send + Sync {
    fn end(&self);
    fn error(&self, message: &str);
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of an authentication attempt.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// Credentials resolved; identity facts to fold into the context.
    Granted(AuthInfo),
    /// Credentials missing or rejected. `code` is the resolver's wire
    /// code; the processor falls back to `UNAUTHORIZED` when absent.
    Denied {
        code: Option<String>,
        message: String,
    },
}

impl AuthOutcome {
    pub fn denied(message: impl Into<String>) -> Self {
        Self::Denied {
            code: None,
            message: message.into(),
        }
    }

    pub fn denied_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Denied {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Result of input validation.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Valid,
    Invalid { errors: Vec<FieldError> },
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Answer to a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

// =============================================================================
// Default validator (JSON Schema)
// =============================================================================

/// [`InputValidator`] backed by JSON Schema. Field paths are reported
/// dotted (`prompt`, `author.age`); a failure with no instance path,
/// such as a missing required property, reports as `body`. A schema
/// that fails to compile is reported as a validation failure, never a
/// panic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

#[async_trait]
impl InputValidator for SchemaValidator {
    async fn validate(&self, schema: &Value, body: &Value) -> ValidationOutcome {
        let validator = match jsonschema::validator_for(schema) {
            Ok(validator) => validator,
            Err(err) => {
                warn!(error = %err, "input schema failed to compile");
                return ValidationOutcome::Invalid {
                    errors: vec![FieldError {
                        field: "schema".to_string(),
                        message: err.to_string(),
                    }],
                };
            }
        };

        let errors: Vec<FieldError> = validator
            .iter_errors(body)
            .map(|err| FieldError {
                field: dotted_path(&err.instance_path.to_string()),
                message: err.to_string(),
            })
            .collect();

        if errors.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid { errors }
        }
    }
}

/// JSON Pointer to a dotted field path: `/author/age` becomes
/// `author.age`, array indices stay as segments. An empty pointer means
/// the failure concerns the body as a whole.
fn dotted_path(pointer: &str) -> String {
    if pointer.is_empty() {
        return "body".to_string();
    }
    pointer
        .split('/')
        .skip(1)
        // RFC 6901 unescape; ~1 before ~0 so "~01" decodes to "~1".
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

// =============================================================================
// Default metrics (sliding window)
// =============================================================================

/// Running totals for one metric name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricAggregate {
    pub count: u64,
    pub total_ms: u64,
}

/// In-process [`MetricsRecorder`]: duration aggregates per metric name
/// and a sliding-window counter per rate limit key.
#[derive(Debug)]
pub struct SlidingWindowMetrics {
    window: Duration,
    aggregates: Mutex<HashMap<String, MetricAggregate>>,
    windows: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl SlidingWindowMetrics {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            aggregates: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Aggregate recorded so far under `name`.
    pub async fn aggregate(&self, name: &str) -> Option<MetricAggregate> {
        self.aggregates.lock().await.get(name).cloned()
    }

    fn chrono_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::seconds(60))
    }
}

impl Default for SlidingWindowMetrics {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl MetricsRecorder for SlidingWindowMetrics {
    async fn record(&self, name: &str, duration_ms: u64, tags: &[(&str, &str)]) {
        let rendered: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
        debug!(metric = name, duration_ms, tags = %rendered.join(","), "metric recorded");

        let mut aggregates = self.aggregates.lock().await;
        let entry = aggregates.entry(name.to_string()).or_default();
        entry.count += 1;
        entry.total_ms += duration_ms;
    }

    async fn check_rate_limit(&self, key: &str, limit: u32) -> RateLimitDecision {
        let now = Utc::now();
        let window = self.chrono_window();
        let mut windows = self.windows.lock().await;
        let timestamps = windows.entry(key.to_string()).or_default();

        // Expire entries that slid out of the window.
        let cutoff = now - window;
        while let Some(&ts) = timestamps.front() {
            if ts < cutoff {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let used = timestamps.len() as u32;
        let reset_at = timestamps.front().map_or(now + window, |ts| *ts + window);

        if used >= limit {
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
            };
        }

        timestamps.push_back(now);
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(used + 1),
            reset_at,
        }
    }
}

// =============================================================================
// Default tracers
// =============================================================================

/// [`Tracer`] that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopTrace;
struct NoopSpan;

impl Tracer for NoopTracer {
    fn start_trace(&self, _correlation_id: &CorrelationId, _name: &str) -> Box<dyn TraceHandle> {
        Box::new(NoopTrace)
    }
}

impl TraceHandle for NoopTrace {
    fn start_span(&self, _name: &str) -> Box<dyn SpanHandle> {
        Box::new(NoopSpan)
    }

    fn end(&self) {}
}

impl SpanHandle for NoopSpan {
    fn end(&self) {}

    fn error(&self, _message: &str) {}
}

/// [`Tracer`] that mirrors trace and span lifecycles onto the log
/// stream, tagged with the correlation ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

struct LogTrace {
    correlation_id: String,
    name: String,
    started: Instant,
}

struct LogSpan {
    correlation_id: String,
    name: String,
    started: Instant,
}

impl Tracer for LogTracer {
    fn start_trace(&self, correlation_id: &CorrelationId, name: &str) -> Box<dyn TraceHandle> {
        debug!(correlation_id = %correlation_id, trace = name, "trace started");
        Box::new(LogTrace {
            correlation_id: correlation_id.as_str().to_string(),
            name: name.to_string(),
            started: Instant::now(),
        })
    }
}

impl TraceHandle for LogTrace {
    fn start_span(&self, name: &str) -> Box<dyn SpanHandle> {
        debug!(correlation_id = %self.correlation_id, span = name, "span started");
        Box::new(LogSpan {
            correlation_id: self.correlation_id.clone(),
            name: name.to_string(),
            started: Instant::now(),
        })
    }

    fn end(&self) {
        debug!(
            correlation_id = %self.correlation_id,
            trace = %self.name,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "trace ended"
        );
    }
}

impl SpanHandle for LogSpan {
    fn end(&self) {
        debug!(
            correlation_id = %self.correlation_id,
            span = %self.name,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "span ended"
        );
    }

    fn error(&self, message: &str) {
        warn!(
            correlation_id = %self.correlation_id,
            span = %self.name,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            error = message,
            "span failed"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
