//! Framework-agnostic request shape.
//!
//! The pipeline never sees a concrete HTTP framework type. Adapters copy
//! whatever their framework parsed into an [`IncomingRequest`] and hand it
//! to the processor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One incoming request, reduced to the fields the pipeline consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingRequest {
    /// HTTP method (`GET`, `POST`, ...).
    pub method: String,

    /// Request path, e.g. `/api/generate`.
    pub path: String,

    /// Header map as received. Lookups go through [`IncomingRequest::header`],
    /// which is case-insensitive.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Parsed body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Route parameters extracted by the framework's router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,

    /// Query string parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,

    /// Caller address, when the adapter knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            params: None,
            query: None,
            ip: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Case-insensitive header lookup. Empty values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// First non-empty correlation header: `x-correlation-id`, then
    /// `x-request-id`.
    pub fn correlation_header(&self) -> Option<&str> {
        self.header("x-correlation-id")
            .or_else(|| self.header("x-request-id"))
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// Tool input assembled from the body merged with route params and
    /// query values. Params and query overwrite body keys on collision;
    /// a non-object body is passed through untouched when there is
    /// nothing to merge.
    pub fn assembled_input(&self) -> Value {
        let mut merged = match &self.body {
            Some(Value::Object(map)) => map.clone(),
            Some(other) if self.params.is_none() && self.query.is_none() => {
                return other.clone();
            }
            Some(other) => {
                let mut map = Map::new();
                map.insert("body".to_string(), other.clone());
                map
            }
            None => Map::new(),
        };
        if let Some(params) = &self.params {
            for (k, v) in params {
                merged.insert(k.clone(), v.clone());
            }
        }
        if let Some(query) = &self.query {
            for (k, v) in query {
                merged.insert(k.clone(), v.clone());
            }
        }
        Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = IncomingRequest::new("GET", "/api/tools")
            .with_header("X-Correlation-ID", "req-1-2")
            .with_header("User-Agent", "test/1.0");
        assert_eq!(req.header("x-correlation-id"), Some("req-1-2"));
        assert_eq!(req.user_agent(), Some("test/1.0"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn test_empty_header_counts_as_absent() {
        let req = IncomingRequest::new("GET", "/")
            .with_header("x-correlation-id", "")
            .with_header("x-request-id", "req-9-a");
        assert_eq!(req.correlation_header(), Some("req-9-a"));
    }

    #[test]
    fn test_correlation_header_precedence() {
        let req = IncomingRequest::new("GET", "/")
            .with_header("x-request-id", "second")
            .with_header("x-correlation-id", "req-1-f");
        assert_eq!(req.correlation_header(), Some("req-1-f"));
    }

    #[test]
    fn test_assembled_input_merges_params_and_query() {
        let mut params = Map::new();
        params.insert("id".to_string(), json!("42"));
        let mut query = Map::new();
        query.insert("verbose".to_string(), json!("true"));

        let req = IncomingRequest::new("POST", "/api/items/42")
            .with_body(json!({"name": "widget", "id": "ignored"}))
            .with_params(params)
            .with_query(query);

        let input = req.assembled_input();
        assert_eq!(input["name"], json!("widget"));
        assert_eq!(input["id"], json!("42")); // params win over body
        assert_eq!(input["verbose"], json!("true"));
    }

    #[test]
    fn test_assembled_input_passes_scalar_body_through() {
        let req = IncomingRequest::new("POST", "/").with_body(json!("raw"));
        assert_eq!(req.assembled_input(), json!("raw"));
    }

    #[test]
    fn test_assembled_input_empty() {
        let req = IncomingRequest::new("GET", "/");
        assert_eq!(req.assembled_input(), json!({}));
    }
}
