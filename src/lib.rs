//! # Toolplane - Control-Plane Tool Invocation Pipeline
//!
//! Framework-agnostic request orchestration providing:
//! - Correlation-aware request contexts with task-local ambient access
//! - A registry of invokable tools with categories, health, and enablement
//! - A staged pipeline: intent, auth, validation, rate limit, execution
//! - Phase-ordered execution plans with dependency chaining and fan-out
//! - A uniform response envelope with pagination and rate limit metadata
//!
//! ## Architecture
//!
//! The processor owns the pipeline; everything pluggable sits behind a
//! collaborator trait:
//! ```text
//!                  ┌────────────────────────────────────┐
//!   request     →  │         RequestProcessor           │
//!                  │  ┌────────┐ ┌──────┐ ┌──────────┐  │
//!                  │  │ Intent │ │ Auth │ │Validation│  │
//!                  │  └────────┘ └──────┘ └──────────┘  │
//!                  │  ┌──────────┐ ┌─────────────────┐  │
//!                  │  │RateLimit │ │  Plan Executor  │  │
//!                  │  └──────────┘ └────────┬────────┘  │
//!                  └───────────────────────┬┴───────────┘
//!                                          ▼
//!                                    ToolRegistry
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod context;
pub mod processor;
pub mod registry;
pub mod response;
pub mod types;

// Internal utilities
pub mod observability;

pub use processor::{ProcessOptions, RequestProcessor};
pub use registry::SharedRegistry;
pub use response::{ApiResponse, ResponseBuilder};
pub use types::{Config, Error, Result};
