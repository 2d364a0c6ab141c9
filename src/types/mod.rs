//! Core types for the toolplane runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: the correlation identifier threaded through every layer
//! - **Errors**: application errors, wire codes, and the HTTP status table
//! - **Invocation**: the result envelope the processor produces
//! - **Request**: the framework-agnostic request shape adapters feed in
//! - **Config**: configuration structures with runnable defaults

mod config;
mod errors;
mod ids;
mod invocation;
mod request;

pub use config::{
    Config, ContextConfig, ObservabilityConfig, ProcessorConfig, RateLimitConfig, RateLimitTier,
    TierBudgets,
};
pub use errors::{status_for_code, Error, ErrorCode, Result};
pub use ids::CorrelationId;
pub use invocation::{InvocationError, InvocationResult};
pub use request::IncomingRequest;
