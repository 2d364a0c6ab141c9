//! Strongly-typed identifiers.
//!
//! Correlation IDs tie every log line, tool invocation, and response
//! envelope back to the request that produced them. Freshly minted IDs
//! use the `req-<base36 millis>-<hex suffix>` form; IDs supplied by
//! upstream proxies are accepted when they match that form or parse as
//! a UUID, and replaced otherwise.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation identifier threaded through a request's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh ID: `req-<base36 unix millis>-<first 8 hex of a v4 UUID>`.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u128;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("req-{}-{}", to_base36(millis), &suffix[..8]))
    }

    /// Wrap a caller-supplied ID, rejecting only the empty string.
    ///
    /// Use [`CorrelationId::is_valid`] first when the string comes from an
    /// untrusted header.
    pub fn from_string(s: String) -> Result<Self, &'static str> {
        if s.is_empty() {
            return Err("CorrelationId cannot be empty");
        }
        Ok(Self(s))
    }

    /// Whether `s` is an acceptable correlation ID.
    ///
    /// Accepts the native `req-<base36>-<hex>` form (both segments
    /// non-empty) and any string the `uuid` crate parses.
    pub fn is_valid(s: &str) -> bool {
        if let Some(rest) = s.strip_prefix("req-") {
            let mut parts = rest.splitn(2, '-');
            let ts = parts.next().unwrap_or("");
            let suffix = parts.next().unwrap_or("");
            return !ts.is_empty()
                && !suffix.is_empty()
                && ts.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
                && suffix.chars().all(|c| c.is_ascii_hexdigit());
        }
        uuid::Uuid::parse_str(s).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase base-36 rendering of `n` (digits then letters).
fn to_base36(mut n: u128) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    // ALPHABET is pure ASCII
    String::from_utf8(out).unwrap_or_default()
}
