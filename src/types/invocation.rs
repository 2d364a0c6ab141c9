//! Invocation results.
//!
//! [`InvocationResult`] is what the request processor hands back for every
//! request: exactly one of `data` or `error` is populated, and the
//! correlation ID and elapsed time always ride along. The wire shape uses
//! camelCase keys to match the public envelope contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::errors::{status_for_code, Error, ErrorCode};
use crate::types::ids::CorrelationId;

/// Outcome of processing one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    /// Whether the request succeeded end to end.
    pub success: bool,

    /// Correlation ID of the request that produced this result.
    pub correlation_id: CorrelationId,

    /// Payload on success; `None` on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Failure detail; `None` on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,

    /// End-to-end elapsed time in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

impl InvocationResult {
    /// Successful result carrying `data`.
    pub fn ok(correlation_id: CorrelationId, data: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            correlation_id,
            data: Some(data),
            error: None,
            duration_ms,
        }
    }

    /// Failed result carrying `error`.
    pub fn fail(correlation_id: CorrelationId, error: InvocationError, duration_ms: u64) -> Self {
        Self {
            success: false,
            correlation_id,
            data: None,
            error: Some(error),
            duration_ms,
        }
    }

    /// HTTP status this result surfaces as (200 on success).
    pub fn http_status(&self) -> u16 {
        match &self.error {
            None => 200,
            Some(err) => err.http_status(),
        }
    }
}

/// Wire-level failure detail: a code from the error taxonomy, a
/// human-readable message, and optional structured details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl InvocationError {
    /// Error with a code from the closed taxonomy.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            details: None,
        }
    }

    /// Error with a caller-supplied code string. Collaborators report
    /// codes this way; unknown codes surface as HTTP 500.
    pub fn raw(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details (field errors, budget counters, ...).
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status for this error's code.
    pub fn http_status(&self) -> u16 {
        status_for_code(&self.code)
    }
}

impl From<Error> for InvocationError {
    fn from(err: Error) -> Self {
        let code = err.code();
        let message = match err {
            Error::Validation(m)
            | Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::NotFound(m)
            | Error::RouteNotFound(m)
            | Error::Conflict(m)
            | Error::RateLimited(m)
            | Error::ToolDisabled(m)
            | Error::ToolExecution(m)
            | Error::Timeout(m)
            | Error::Database(m)
            | Error::ExternalService(m)
            | Error::Unavailable(m)
            | Error::Internal(m) => m,
            Error::Serialization(e) => e.to_string(),
        };
        Self::new(code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cid() -> CorrelationId {
        CorrelationId::from_string("req-1-2".to_string()).unwrap()
    }

    #[test]
    fn test_ok_and_fail_shapes() {
        let ok = InvocationResult::ok(cid(), json!({"x": 1}), 12);
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert_eq!(ok.http_status(), 200);

        let fail = InvocationResult::fail(
            cid(),
            InvocationError::new(ErrorCode::RateLimited, "slow down"),
            3,
        );
        assert!(!fail.success);
        assert!(fail.data.is_none());
        assert_eq!(fail.http_status(), 429);
    }

    #[test]
    fn test_wire_keys_are_camel_case() {
        let result = InvocationResult::ok(cid(), json!(1), 7);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["correlationId"], json!("req-1-2"));
        assert_eq!(value["duration"], json!(7));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_raw_code_passthrough() {
        let err = InvocationError::raw("UPSTREAM_MELTDOWN", "boom");
        assert_eq!(err.http_status(), 500);
        let err = InvocationError::raw("TOKEN_EXPIRED", "stale");
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn test_details_attach() {
        let err = InvocationError::new(ErrorCode::ValidationError, "bad input")
            .with_details(json!({"errors": [{"field": "prompt"}]}));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["details"]["errors"][0]["field"], json!("prompt"));
    }

    #[test]
    fn test_from_error_strips_display_prefix() {
        let err: InvocationError = Error::tool_disabled("search is off").into();
        assert_eq!(err.code, "TOOL_DISABLED");
        assert_eq!(err.message, "search is off");
        assert_eq!(err.http_status(), 503);
    }
}
