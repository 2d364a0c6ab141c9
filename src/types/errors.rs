//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Every
//! error maps onto a wire-level [`ErrorCode`], which in turn maps onto a
//! fixed HTTP status table — the single source of truth for how failures
//! surface to clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the toolplane runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing input (maps to `VALIDATION_ERROR`).
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid credentials (maps to `UNAUTHORIZED`).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (maps to `FORBIDDEN`).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (maps to `NOT_FOUND`).
    #[error("not found: {0}")]
    NotFound(String),

    /// No intent matches the request (maps to `ROUTE_NOT_FOUND`).
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// Duplicate resource or conflicting state (maps to `CONFLICT`).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Request budget exceeded (maps to `RATE_LIMITED`).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Tool exists but is disabled (maps to `TOOL_DISABLED`).
    #[error("tool disabled: {0}")]
    ToolDisabled(String),

    /// Tool handler failed (maps to `TOOL_EXECUTION_ERROR`).
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// Deadline exceeded; surfaces under `TOOL_EXECUTION_ERROR` like any
    /// other step failure, keeping the wire taxonomy closed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Storage-layer failure reported by a tool (maps to `DATABASE_ERROR`).
    #[error("database error: {0}")]
    Database(String),

    /// Upstream service failure reported by a tool (maps to
    /// `EXTERNAL_SERVICE_ERROR`).
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Dependency unavailable (maps to `SERVICE_UNAVAILABLE`).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Anything unexpected (maps to `INTERNAL_ERROR`).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors (maps to `INTERNAL_ERROR`).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn route_not_found(msg: impl Into<String>) -> Self {
        Self::RouteNotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn tool_disabled(msg: impl Into<String>) -> Self {
        Self::ToolDisabled(msg.into())
    }

    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wire-level code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::ValidationError,
            Error::Unauthorized(_) => ErrorCode::Unauthorized,
            Error::Forbidden(_) => ErrorCode::Forbidden,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::RouteNotFound(_) => ErrorCode::RouteNotFound,
            Error::Conflict(_) => ErrorCode::Conflict,
            Error::RateLimited(_) => ErrorCode::RateLimited,
            Error::ToolDisabled(_) => ErrorCode::ToolDisabled,
            Error::ToolExecution(_) => ErrorCode::ToolExecutionError,
            Error::Timeout(_) => ErrorCode::ToolExecutionError,
            Error::Database(_) => ErrorCode::DatabaseError,
            Error::ExternalService(_) => ErrorCode::ExternalServiceError,
            Error::Unavailable(_) => ErrorCode::ServiceUnavailable,
            Error::Internal(_) => ErrorCode::InternalError,
            Error::Serialization(_) => ErrorCode::InternalError,
        }
    }

    /// HTTP status the error surfaces as.
    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }
}

// =============================================================================
// Wire error codes
// =============================================================================

/// Wire-level error codes — the closed set this crate itself emits.
///
/// Collaborators may report codes outside this set (those pass through the
/// result envelope verbatim); [`status_for_code`] maps any unrecognized
/// string to 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400
    ValidationError,
    InvalidInput,
    MissingField,
    InvalidFormat,
    // 401
    Unauthorized,
    MissingApiKey,
    InvalidApiKey,
    MissingOauthToken,
    InvalidOauthToken,
    TokenExpired,
    // 403
    Forbidden,
    InsufficientPermissions,
    // 404
    NotFound,
    ResourceNotFound,
    RouteNotFound,
    // 409
    Conflict,
    DuplicateResource,
    // 429
    RateLimited,
    QuotaExceeded,
    // 500
    InternalError,
    DatabaseError,
    ExternalServiceError,
    ToolExecutionError,
    // 503
    ServiceUnavailable,
    ToolDisabled,
}

impl ErrorCode {
    /// Wire representation (SCREAMING_SNAKE_CASE).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::MissingApiKey => "MISSING_API_KEY",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::MissingOauthToken => "MISSING_OAUTH_TOKEN",
            ErrorCode::InvalidOauthToken => "INVALID_OAUTH_TOKEN",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::RouteNotFound => "ROUTE_NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::DuplicateResource => "DUPLICATE_RESOURCE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            ErrorCode::ToolExecutionError => "TOOL_EXECUTION_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::ToolDisabled => "TOOL_DISABLED",
        }
    }

    /// Parse a wire code. Returns `None` for anything outside the set.
    pub fn parse(s: &str) -> Option<Self> {
        let code = match s {
            "VALIDATION_ERROR" => ErrorCode::ValidationError,
            "INVALID_INPUT" => ErrorCode::InvalidInput,
            "MISSING_FIELD" => ErrorCode::MissingField,
            "INVALID_FORMAT" => ErrorCode::InvalidFormat,
            "UNAUTHORIZED" => ErrorCode::Unauthorized,
            "MISSING_API_KEY" => ErrorCode::MissingApiKey,
            "INVALID_API_KEY" => ErrorCode::InvalidApiKey,
            "MISSING_OAUTH_TOKEN" => ErrorCode::MissingOauthToken,
            "INVALID_OAUTH_TOKEN" => ErrorCode::InvalidOauthToken,
            "TOKEN_EXPIRED" => ErrorCode::TokenExpired,
            "FORBIDDEN" => ErrorCode::Forbidden,
            "INSUFFICIENT_PERMISSIONS" => ErrorCode::InsufficientPermissions,
            "NOT_FOUND" => ErrorCode::NotFound,
            "RESOURCE_NOT_FOUND" => ErrorCode::ResourceNotFound,
            "ROUTE_NOT_FOUND" => ErrorCode::RouteNotFound,
            "CONFLICT" => ErrorCode::Conflict,
            "DUPLICATE_RESOURCE" => ErrorCode::DuplicateResource,
            "RATE_LIMITED" => ErrorCode::RateLimited,
            "QUOTA_EXCEEDED" => ErrorCode::QuotaExceeded,
            "INTERNAL_ERROR" => ErrorCode::InternalError,
            "DATABASE_ERROR" => ErrorCode::DatabaseError,
            "EXTERNAL_SERVICE_ERROR" => ErrorCode::ExternalServiceError,
            "TOOL_EXECUTION_ERROR" => ErrorCode::ToolExecutionError,
            "SERVICE_UNAVAILABLE" => ErrorCode::ServiceUnavailable,
            "TOOL_DISABLED" => ErrorCode::ToolDisabled,
            _ => return None,
        };
        Some(code)
    }

    /// HTTP status for this code. Total over the enumeration.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat => 400,

            ErrorCode::Unauthorized
            | ErrorCode::MissingApiKey
            | ErrorCode::InvalidApiKey
            | ErrorCode::MissingOauthToken
            | ErrorCode::InvalidOauthToken
            | ErrorCode::TokenExpired => 401,

            ErrorCode::Forbidden | ErrorCode::InsufficientPermissions => 403,

            ErrorCode::NotFound | ErrorCode::ResourceNotFound | ErrorCode::RouteNotFound => 404,

            ErrorCode::Conflict | ErrorCode::DuplicateResource => 409,

            ErrorCode::RateLimited | ErrorCode::QuotaExceeded => 429,

            ErrorCode::InternalError
            | ErrorCode::DatabaseError
            | ErrorCode::ExternalServiceError
            | ErrorCode::ToolExecutionError => 500,

            ErrorCode::ServiceUnavailable | ErrorCode::ToolDisabled => 503,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP status for an arbitrary wire code string.
///
/// Total: unrecognized codes map to 500, never panics.
pub fn status_for_code(code: &str) -> u16 {
    ErrorCode::parse(code).map_or(500, |c| c.http_status())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(status_for_code("VALIDATION_ERROR"), 400);
        assert_eq!(status_for_code("MISSING_API_KEY"), 401);
        assert_eq!(status_for_code("INSUFFICIENT_PERMISSIONS"), 403);
        assert_eq!(status_for_code("ROUTE_NOT_FOUND"), 404);
        assert_eq!(status_for_code("DUPLICATE_RESOURCE"), 409);
        assert_eq!(status_for_code("RATE_LIMITED"), 429);
        assert_eq!(status_for_code("TOOL_EXECUTION_ERROR"), 500);
        assert_eq!(status_for_code("TOOL_DISABLED"), 503);
    }

    #[test]
    fn test_unknown_code_defaults_to_500() {
        assert_eq!(status_for_code("not-a-real-code"), 500);
        assert_eq!(status_for_code(""), 500);
        assert_eq!(status_for_code("validation_error"), 500); // case-sensitive
    }

    #[test]
    fn test_parse_round_trip() {
        let codes = [
            ErrorCode::ValidationError,
            ErrorCode::TokenExpired,
            ErrorCode::RateLimited,
            ErrorCode::ToolDisabled,
            ErrorCode::ExternalServiceError,
        ];
        for code in codes {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("BOGUS"), None);
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(Error::validation("x").code(), ErrorCode::ValidationError);
        assert_eq!(Error::timeout("x").code(), ErrorCode::ToolExecutionError);
        assert_eq!(Error::tool_disabled("x").code(), ErrorCode::ToolDisabled);
        assert_eq!(Error::rate_limited("x").http_status(), 429);
        assert_eq!(Error::internal("x").http_status(), 500);
    }

    #[test]
    fn test_serde_wire_format() {
        let json = serde_json::to_string(&ErrorCode::ToolExecutionError).unwrap();
        assert_eq!(json, "\"TOOL_EXECUTION_ERROR\"");
        let back: ErrorCode = serde_json::from_str("\"RATE_LIMITED\"").unwrap();
        assert_eq!(back, ErrorCode::RateLimited);
    }
}
