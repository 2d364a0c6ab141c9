//! Tool registry — the process-wide catalog of invokable capabilities.
//!
//! Each tool couples metadata (category, rate-limit tier, auth
//! requirement) with an async handler and an enable flag. The registry is
//! an explicit owned object: construct one at startup, wrap it in a
//! [`SharedRegistry`], and hand clones of the handle to whoever needs it.
//! Nothing here is a module-level singleton.

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::context::ToolContext;
use crate::types::{Error, RateLimitTier, Result};

// =============================================================================
// Tool metadata
// =============================================================================

/// Capability category. The named set covers everything the plane ships
/// with; [`ToolCategory::Other`] keeps the enumeration open for adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Ai,
    Search,
    Storage,
    Email,
    Auth,
    Data,
    #[serde(untagged)]
    Other(String),
}

impl ToolCategory {
    pub fn as_str(&self) -> &str {
        match self {
            ToolCategory::Ai => "ai",
            ToolCategory::Search => "search",
            ToolCategory::Storage => "storage",
            ToolCategory::Email => "email",
            ToolCategory::Auth => "auth",
            ToolCategory::Data => "data",
            ToolCategory::Other(name) => name,
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tool metadata supplied at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    #[serde(default)]
    pub rate_limit: RateLimitTier,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
}

impl ToolSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category,
            rate_limit: RateLimitTier::default(),
            requires_auth: false,
            auth_type: None,
        }
    }

    pub fn with_rate_limit(mut self, tier: RateLimitTier) -> Self {
        self.rate_limit = tier;
        self
    }

    pub fn with_auth(mut self, auth_type: impl Into<String>) -> Self {
        self.requires_auth = true;
        self.auth_type = Some(auth_type.into());
        self
    }
}

/// Async handler invoked when a tool executes.
pub type ToolHandler =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Optional async health probe for a tool.
pub type HealthCheck = Arc<dyn Fn() -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// Wrap an async closure into a [`ToolHandler`] without the boxing
/// ceremony at every call site.
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |input, ctx| f(input, ctx).boxed())
}

/// Wrap an async closure into a [`HealthCheck`].
pub fn health_check<F, Fut>(f: F) -> HealthCheck
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Registration extras beyond spec and handler.
#[derive(Clone)]
pub struct RegisterOptions {
    pub enabled: bool,
    pub health_check: Option<HealthCheck>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            health_check: None,
        }
    }
}

impl fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("enabled", &self.enabled)
            .field("health_check", &self.health_check.is_some())
            .finish()
    }
}

/// A registered tool: spec, handler, enable flag, bookkeeping.
#[derive(Clone)]
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub handler: ToolHandler,
    pub enabled: bool,
    pub registered_at: DateTime<Utc>,
    pub health_check: Option<HealthCheck>,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("spec", &self.spec)
            .field("enabled", &self.enabled)
            .field("registered_at", &self.registered_at)
            .field("health_check", &self.health_check.is_some())
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// In-memory tool registry with a category index.
///
/// Mutations are plain synchronous map operations; wrap the registry in a
/// [`SharedRegistry`] to share it across tasks.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: HashMap<String, RegisteredTool>,
    by_category: HashMap<String, HashSet<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with default options (enabled, no health check).
    pub fn register(&mut self, spec: ToolSpec, handler: ToolHandler) -> Result<()> {
        self.register_with(spec, handler, RegisterOptions::default())
    }

    /// Register a tool. Re-registering an existing id overwrites the
    /// previous entry — logged as a warning, not an error, so catalogs can
    /// be re-applied idempotently.
    pub fn register_with(
        &mut self,
        spec: ToolSpec,
        handler: ToolHandler,
        options: RegisterOptions,
    ) -> Result<()> {
        if spec.id.is_empty() {
            return Err(Error::validation("tool id cannot be empty"));
        }

        if let Some(previous) = self.entries.remove(&spec.id) {
            warn!(tool_id = %spec.id, "re-registering tool, previous definition overwritten");
            self.drop_from_index(&previous.spec);
        }

        self.by_category
            .entry(spec.category.as_str().to_string())
            .or_default()
            .insert(spec.id.clone());

        debug!(tool_id = %spec.id, category = %spec.category, "tool registered");
        self.entries.insert(
            spec.id.clone(),
            RegisteredTool {
                spec,
                handler,
                enabled: options.enabled,
                registered_at: Utc::now(),
                health_check: options.health_check,
            },
        );
        Ok(())
    }

    /// Remove a tool and its category-index membership. Returns `false`
    /// if the id was unknown.
    pub fn unregister(&mut self, tool_id: &str) -> bool {
        match self.entries.remove(tool_id) {
            Some(entry) => {
                self.drop_from_index(&entry.spec);
                true
            }
            None => false,
        }
    }

    fn drop_from_index(&mut self, spec: &ToolSpec) {
        let category = spec.category.as_str();
        if let Some(ids) = self.by_category.get_mut(category) {
            ids.remove(&spec.id);
            if ids.is_empty() {
                self.by_category.remove(category);
            }
        }
    }

    /// Get a tool regardless of its enable state.
    pub fn get(&self, tool_id: &str) -> Option<&RegisteredTool> {
        self.entries.get(tool_id)
    }

    /// Get a tool only if it exists and is enabled. Execution paths must
    /// use this, never [`ToolRegistry::get`].
    pub fn get_enabled(&self, tool_id: &str) -> Option<&RegisteredTool> {
        self.entries.get(tool_id).filter(|t| t.enabled)
    }

    pub fn has_tool(&self, tool_id: &str) -> bool {
        self.entries.contains_key(tool_id)
    }

    /// Flip a tool to enabled. Returns `false` if the id is unknown.
    pub fn enable(&mut self, tool_id: &str) -> bool {
        match self.entries.get_mut(tool_id) {
            Some(entry) => {
                entry.enabled = true;
                true
            }
            None => false,
        }
    }

    /// Flip a tool to disabled without removing it. Returns `false` if
    /// the id is unknown.
    pub fn disable(&mut self, tool_id: &str) -> bool {
        match self.entries.get_mut(tool_id) {
            Some(entry) => {
                entry.enabled = false;
                true
            }
            None => false,
        }
    }

    /// All tools in a category, sorted by id.
    pub fn tools_by_category(&self, category: &ToolCategory) -> Vec<&RegisteredTool> {
        let mut tools: Vec<&RegisteredTool> = self
            .by_category
            .get(category.as_str())
            .map(|ids| ids.iter().filter_map(|id| self.entries.get(id)).collect())
            .unwrap_or_default();
        tools.sort_by(|a, b| a.spec.id.cmp(&b.spec.id));
        tools
    }

    /// Enabled tools in a category, sorted by id.
    pub fn enabled_tools_by_category(&self, category: &ToolCategory) -> Vec<&RegisteredTool> {
        self.tools_by_category(category)
            .into_iter()
            .filter(|t| t.enabled)
            .collect()
    }

    /// Tools that require authentication, sorted by id.
    pub fn tools_requiring_auth(&self) -> Vec<&RegisteredTool> {
        let mut tools: Vec<&RegisteredTool> = self
            .entries
            .values()
            .filter(|t| t.spec.requires_auth)
            .collect();
        tools.sort_by(|a, b| a.spec.id.cmp(&b.spec.id));
        tools
    }

    /// Case-insensitive substring search over tool names and
    /// descriptions, sorted by id.
    pub fn search(&self, query: &str) -> Vec<&RegisteredTool> {
        let needle = query.to_lowercase();
        let mut tools: Vec<&RegisteredTool> = self
            .entries
            .values()
            .filter(|t| {
                t.spec.name.to_lowercase().contains(&needle)
                    || t.spec.description.to_lowercase().contains(&needle)
            })
            .collect();
        tools.sort_by(|a, b| a.spec.id.cmp(&b.spec.id));
        tools
    }

    /// All tool ids, sorted.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All tool specs, sorted by id.
    pub fn list_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.entries.values().map(|t| t.spec.clone()).collect();
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        specs
    }

    /// Counts for the observability surface. Not used on the hot path.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            if entry.enabled {
                stats.enabled += 1;
            } else {
                stats.disabled += 1;
            }
            *stats
                .by_category
                .entry(entry.spec.category.as_str().to_string())
                .or_insert(0) += 1;
            let auth_key = entry.spec.auth_type.as_deref().unwrap_or("none");
            *stats.by_auth_type.entry(auth_key.to_string()).or_insert(0) += 1;
        }
        stats
    }

    /// Wipe all state. Intended only for test isolation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_category.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry counts broken down by enable state, category, and auth type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_auth_type: BTreeMap<String, usize>,
}

// =============================================================================
// Shared handle
// =============================================================================

/// Cloneable handle to a registry shared across tasks.
///
/// Lock scopes are kept tight: no guard is ever held across an await, so
/// a slow health probe cannot block registration.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<ToolRegistry>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_registry(registry: ToolRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    pub async fn register(&self, spec: ToolSpec, handler: ToolHandler) -> Result<()> {
        self.inner.write().await.register(spec, handler)
    }

    pub async fn register_with(
        &self,
        spec: ToolSpec,
        handler: ToolHandler,
        options: RegisterOptions,
    ) -> Result<()> {
        self.inner.write().await.register_with(spec, handler, options)
    }

    pub async fn unregister(&self, tool_id: &str) -> bool {
        self.inner.write().await.unregister(tool_id)
    }

    pub async fn get(&self, tool_id: &str) -> Option<RegisteredTool> {
        self.inner.read().await.get(tool_id).cloned()
    }

    pub async fn get_enabled(&self, tool_id: &str) -> Option<RegisteredTool> {
        self.inner.read().await.get_enabled(tool_id).cloned()
    }

    pub async fn enable(&self, tool_id: &str) -> bool {
        self.inner.write().await.enable(tool_id)
    }

    pub async fn disable(&self, tool_id: &str) -> bool {
        self.inner.write().await.disable(tool_id)
    }

    pub async fn list_specs(&self) -> Vec<ToolSpec> {
        self.inner.read().await.list_specs()
    }

    pub async fn stats(&self) -> RegistryStats {
        self.inner.read().await.stats()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Probe one tool's health. Unknown ids are unhealthy; tools without
    /// a registered check are healthy by default.
    pub async fn check_health(&self, tool_id: &str) -> bool {
        let probe = {
            let registry = self.inner.read().await;
            match registry.get(tool_id) {
                Some(entry) => entry.health_check.clone(),
                None => return false,
            }
        };
        run_health_check(tool_id, probe).await
    }

    /// Probe every tool concurrently, returning id → healthy.
    pub async fn check_all_health(&self) -> HashMap<String, bool> {
        let probes: Vec<(String, Option<HealthCheck>)> = {
            let registry = self.inner.read().await;
            registry
                .entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.health_check.clone()))
                .collect()
        };

        let results = join_all(probes.into_iter().map(|(id, probe)| async move {
            let healthy = run_health_check(&id, probe).await;
            (id, healthy)
        }))
        .await;

        results.into_iter().collect()
    }
}

/// Run a tool's health probe. A missing probe is healthy; a probe that
/// errors or panics is logged and treated as unhealthy, never propagated.
async fn run_health_check(tool_id: &str, probe: Option<HealthCheck>) -> bool {
    let Some(check) = probe else {
        return true;
    };
    match AssertUnwindSafe(check()).catch_unwind().await {
        Ok(Ok(healthy)) => healthy,
        Ok(Err(err)) => {
            warn!(tool_id = %tool_id, error = %err, "tool health check failed");
            false
        }
        Err(_) => {
            warn!(tool_id = %tool_id, "tool health check panicked");
            false
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
