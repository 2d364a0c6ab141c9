//! Wire response envelope and builder.
//!
//! Every response leaving the plane has the same shape: `success`, one of
//! `data`/`error`, optional `meta`, a correlation ID, and a fresh
//! ISO-8601 timestamp. The envelope itself carries no HTTP status; the
//! transport asks [`ResponseBuilder::http_status`] (or
//! [`ApiResponse::http_status`]) and the fixed code table decides.
//!
//! Correlation IDs resolve in order: explicitly set on the builder, then
//! the ambient request scope, then freshly generated — so even a response
//! built far from the request plumbing still correlates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::scope;
use crate::types::{CorrelationId, InvocationError, InvocationResult};

pub use crate::types::{status_for_code, ErrorCode};

// =============================================================================
// Envelope
// =============================================================================

/// The wire-level response envelope. Built once per request, never
/// mutated after being sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    pub correlation_id: CorrelationId,
    pub timestamp: DateTime<Utc>,
}

impl ApiResponse {
    /// HTTP status this envelope maps to: 200 on success, otherwise the
    /// error code's slot in the fixed table.
    pub fn http_status(&self) -> u16 {
        match &self.error {
            None => 200,
            Some(err) => err.http_status(),
        }
    }
}

/// Response metadata: duration, pagination, rate limit state, plus any
/// adapter-specific keys flattened alongside them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseMeta {
    pub fn is_empty(&self) -> bool {
        self.duration.is_none()
            && self.pagination.is_none()
            && self.rate_limit.is_none()
            && self.extra.is_empty()
    }
}

/// Pagination block with derived page math.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// Compute the derived fields: `total_pages = ceil(total / page_size)`,
    /// `has_next = page < total_pages`, `has_prev = page > 1`. A zero
    /// page size yields zero pages rather than dividing by zero.
    pub fn compute(page: u32, page_size: u32, total: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(page_size))
        };
        Self {
            page,
            page_size,
            total,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Rate limit state reflected back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitMeta {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

// =============================================================================
// Pure constructors
// =============================================================================

fn resolve_correlation(explicit: Option<CorrelationId>) -> CorrelationId {
    explicit
        .or_else(scope::correlation_id)
        .unwrap_or_else(CorrelationId::generate)
}

/// Successful envelope around `data`, stamped now.
pub fn success_response(
    data: Value,
    correlation_id: Option<CorrelationId>,
    meta: Option<ResponseMeta>,
) -> ApiResponse {
    ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        meta: meta.filter(|m| !m.is_empty()),
        correlation_id: resolve_correlation(correlation_id),
        timestamp: Utc::now(),
    }
}

/// Failure envelope. `code` defaults to `INTERNAL_ERROR` when omitted.
pub fn error_response(
    message: impl Into<String>,
    code: Option<&str>,
    correlation_id: Option<CorrelationId>,
    details: Option<Value>,
) -> ApiResponse {
    let mut error = InvocationError::raw(code.unwrap_or("INTERNAL_ERROR"), message);
    error.details = details;
    ApiResponse {
        success: false,
        data: None,
        error: Some(error),
        meta: None,
        correlation_id: resolve_correlation(correlation_id),
        timestamp: Utc::now(),
    }
}

/// Map an [`InvocationResult`] 1:1 onto the wire envelope, moving the
/// duration into `meta`. An explicit `correlation_id` overrides the
/// result's own.
pub fn from_invocation_result(
    result: InvocationResult,
    correlation_id: Option<CorrelationId>,
) -> ApiResponse {
    let meta = ResponseMeta {
        duration: Some(result.duration_ms),
        ..Default::default()
    };
    ApiResponse {
        success: result.success,
        data: result.data,
        error: result.error,
        meta: Some(meta),
        correlation_id: correlation_id.unwrap_or(result.correlation_id),
        timestamp: Utc::now(),
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Per-request, single-use fluent builder for [`ApiResponse`].
///
/// Setting data after an error (or vice versa) overwrites the outcome:
/// the builder reflects the last call, it is not an append-only log.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    success: bool,
    data: Option<Value>,
    error: Option<InvocationError>,
    meta: ResponseMeta,
    correlation_id: Option<CorrelationId>,
    status_override: Option<u16>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// Mark the response successful with this payload.
    pub fn data(mut self, data: Value) -> Self {
        self.success = true;
        self.data = Some(data);
        self.error = None;
        self
    }

    /// Mark the response failed with this message and code.
    pub fn error(mut self, message: impl Into<String>, code: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(InvocationError::raw(code, message));
        self.data = None;
        self
    }

    /// Attach structured details to the current error. No-op when no
    /// error is set.
    pub fn error_details(mut self, details: Value) -> Self {
        if let Some(err) = &mut self.error {
            err.details = Some(details);
        }
        self
    }

    /// Insert one metadata key.
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.extra.insert(key.into(), value);
        self
    }

    /// Record elapsed milliseconds in `meta.duration`.
    pub fn duration(mut self, duration_ms: u64) -> Self {
        self.meta.duration = Some(duration_ms);
        self
    }

    /// Attach a pagination block with derived page math.
    pub fn pagination(mut self, page: u32, page_size: u32, total: u64) -> Self {
        self.meta.pagination = Some(Pagination::compute(page, page_size, total));
        self
    }

    /// Reflect rate limit state in `meta.rateLimit`.
    pub fn rate_limit(mut self, limit: u32, remaining: u32, reset_at: DateTime<Utc>) -> Self {
        self.meta.rate_limit = Some(RateLimitMeta {
            limit,
            remaining,
            reset_at,
        });
        self
    }

    /// Pin the correlation ID instead of resolving it at build time.
    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Override the HTTP status the response reports.
    pub fn status(mut self, code: u16) -> Self {
        self.status_override = Some(code);
        self
    }

    /// HTTP status: the override if set, else the error code's slot in
    /// the table, else 200.
    pub fn http_status(&self) -> u16 {
        if let Some(status) = self.status_override {
            return status;
        }
        match &self.error {
            None => 200,
            Some(err) => err.http_status(),
        }
    }

    /// Finalize the envelope, stamping the timestamp and resolving the
    /// correlation ID.
    pub fn build(self) -> ApiResponse {
        ApiResponse {
            success: self.success,
            data: self.data,
            error: self.error,
            meta: if self.meta.is_empty() {
                None
            } else {
                Some(self.meta)
            },
            correlation_id: resolve_correlation(self.correlation_id),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Convenience wrappers
// =============================================================================

/// Builder for a single-item success response.
pub fn wrap_item(item: Value) -> ResponseBuilder {
    ResponseBuilder::new().data(item)
}

/// Builder for a list response, optionally paginated as
/// `(page, page_size, total)`.
pub fn wrap_list(items: Vec<Value>, pagination: Option<(u32, u32, u64)>) -> ResponseBuilder {
    let builder = ResponseBuilder::new().data(Value::Array(items));
    match pagination {
        Some((page, page_size, total)) => builder.pagination(page, page_size, total),
        None => builder,
    }
}

/// Builder for a creation response — status 201.
pub fn wrap_created(item: Value) -> ResponseBuilder {
    ResponseBuilder::new().data(item).status(201)
}

/// Builder for a deletion acknowledgement: `{"deleted": true}`.
pub fn wrap_deleted() -> ResponseBuilder {
    ResponseBuilder::new().data(json!({"deleted": true}))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{scope, ContextOptions, RequestContext};
    use crate::types::InvocationResult;

    #[test]
    fn test_data_builds_success_envelope() {
        let response = ResponseBuilder::new().data(json!({"x": 1})).build();
        assert!(response.success);
        assert_eq!(response.data, Some(json!({"x": 1})));
        assert!(response.error.is_none());
        assert!(response.meta.is_none());
        assert!(CorrelationId::is_valid(response.correlation_id.as_str()));
    }

    #[test]
    fn test_error_builds_failure_envelope() {
        let builder = ResponseBuilder::new().error("bad", "VALIDATION_ERROR");
        assert_eq!(builder.http_status(), 400);

        let response = builder.build();
        assert!(!response.success);
        let err = response.error.unwrap();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert_eq!(err.message, "bad");
    }

    #[test]
    fn test_unknown_code_maps_to_500() {
        let builder = ResponseBuilder::new().error("??", "not-a-real-code");
        assert_eq!(builder.http_status(), 500);
    }

    #[test]
    fn test_last_outcome_wins() {
        let response = ResponseBuilder::new()
            .error("bad", "VALIDATION_ERROR")
            .data(json!({"recovered": true}))
            .build();
        assert!(response.success);
        assert!(response.error.is_none());

        let response = ResponseBuilder::new()
            .data(json!(1))
            .error("broke", "INTERNAL_ERROR")
            .build();
        assert!(!response.success);
        assert!(response.data.is_none());
    }

    #[test]
    fn test_error_details() {
        let response = ResponseBuilder::new()
            .error("bad", "VALIDATION_ERROR")
            .error_details(json!({"errors": [{"field": "title"}]}))
            .build();
        let err = response.error.unwrap();
        assert_eq!(err.details.unwrap()["errors"][0]["field"], json!("title"));
    }

    #[test]
    fn test_pagination_math() {
        let p = Pagination::compute(2, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(p.has_prev);

        let p = Pagination::compute(3, 10, 25);
        assert!(!p.has_next);

        let p = Pagination::compute(1, 10, 10);
        assert_eq!(p.total_pages, 1);
        assert!(!p.has_next);
        assert!(!p.has_prev);

        let p = Pagination::compute(1, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);

        let p = Pagination::compute(1, 0, 100);
        assert_eq!(p.total_pages, 0);
    }

    #[test]
    fn test_wire_keys_are_camel_case() {
        let response = ResponseBuilder::new()
            .data(json!([]))
            .pagination(1, 20, 45)
            .duration(12)
            .build();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["meta"]["pagination"]["pageSize"], json!(20));
        assert_eq!(value["meta"]["pagination"]["totalPages"], json!(3));
        assert_eq!(value["meta"]["pagination"]["hasNext"], json!(true));
        assert_eq!(value["meta"]["duration"], json!(12));
        assert!(value.get("correlationId").is_some());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_rate_limit_meta() {
        let reset = Utc::now();
        let response = ResponseBuilder::new()
            .error("slow down", "RATE_LIMITED")
            .rate_limit(50, 0, reset)
            .build();
        let meta = response.meta.unwrap();
        let rl = meta.rate_limit.unwrap();
        assert_eq!(rl.limit, 50);
        assert_eq!(rl.remaining, 0);
        assert_eq!(rl.reset_at, reset);
    }

    #[test]
    fn test_meta_extra_is_flattened() {
        let response = ResponseBuilder::new()
            .data(json!(1))
            .meta("cache", json!("hit"))
            .build();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["meta"]["cache"], json!("hit"));
    }

    #[test]
    fn test_free_constructors() {
        let ok = success_response(json!({"x": 1}), None, None);
        assert!(ok.success);
        assert!(ok.meta.is_none());

        let err = error_response("boom", None, None, None);
        let e = err.error.unwrap();
        assert_eq!(e.code, "INTERNAL_ERROR");

        let err = error_response("nope", Some("FORBIDDEN"), None, Some(json!({"need": "admin"})));
        let e = err.error.unwrap();
        assert_eq!(e.code, "FORBIDDEN");
        assert_eq!(e.details.unwrap()["need"], json!("admin"));
    }

    #[test]
    fn test_from_invocation_result() {
        let cid = CorrelationId::from_string("req-1-2".to_string()).unwrap();
        let result = InvocationResult::ok(cid.clone(), json!({"content": "done"}), 42);
        let response = from_invocation_result(result, None);
        assert!(response.success);
        assert_eq!(response.correlation_id, cid);
        assert_eq!(response.http_status(), 200);
        assert_eq!(response.meta.unwrap().duration, Some(42));

        let result = InvocationResult::fail(
            cid.clone(),
            InvocationError::new(ErrorCode::ToolDisabled, "off"),
            5,
        );
        let response = from_invocation_result(result, None);
        assert_eq!(response.http_status(), 503);
    }

    #[test]
    fn test_wrappers() {
        let created = wrap_created(json!({"id": 7}));
        assert_eq!(created.http_status(), 201);
        assert!(created.build().success);

        let deleted = wrap_deleted().build();
        assert_eq!(deleted.data, Some(json!({"deleted": true})));

        let listed = wrap_list(vec![json!(1), json!(2)], Some((1, 2, 4))).build();
        let meta = listed.meta.unwrap();
        assert_eq!(meta.pagination.unwrap().total_pages, 2);

        let plain = wrap_list(vec![], None).build();
        assert!(plain.meta.is_none());
        assert_eq!(plain.data, Some(json!([])));
    }

    #[test]
    fn test_builder_picks_up_ambient_correlation() {
        let ctx = RequestContext::create(ContextOptions {
            correlation_id: Some("req-7-abc".to_string()),
            ..Default::default()
        });
        let response = scope::with_scope_sync(ctx, || ResponseBuilder::new().data(json!(1)).build());
        assert_eq!(response.correlation_id.as_str(), "req-7-abc");
    }

    #[test]
    fn test_explicit_correlation_beats_ambient() {
        let ctx = RequestContext::create(ContextOptions {
            correlation_id: Some("req-7-abc".to_string()),
            ..Default::default()
        });
        let pinned = CorrelationId::from_string("req-8-def".to_string()).unwrap();
        let response = scope::with_scope_sync(ctx, || {
            ResponseBuilder::new().correlation_id(pinned).data(json!(1)).build()
        });
        assert_eq!(response.correlation_id.as_str(), "req-8-def");
    }
}
