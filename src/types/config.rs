//! Configuration structures.
//!
//! Configuration is plain data: nested structs with serde derives and
//! sensible defaults, so a zero-config [`Config::default()`] is always
//! runnable and files only override what they name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Global pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Request processor configuration.
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Rate limit window and per-tier budgets.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Correlation context bookkeeping.
    #[serde(default)]
    pub contexts: ContextConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Request processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Per-step execution deadline applied when neither the step nor the
    /// caller supplies one.
    #[serde(with = "humantime_serde")]
    pub step_timeout: Duration,

    /// Upper bound on the number of steps a single execution plan may
    /// carry before the processor refuses to run it.
    pub max_plan_steps: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            max_plan_steps: 64,
        }
    }
}

/// Rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sliding window over which invocations are counted.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Per-tier invocation budgets within one window.
    pub tiers: TierBudgets,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            tiers: TierBudgets::default(),
        }
    }
}

/// Invocation budgets per rate limit tier, counted per identity and tool
/// over one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBudgets {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    /// "Unlimited" still carries a ceiling so a runaway client cannot
    /// starve the plane.
    pub unlimited: u32,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            low: 10,
            medium: 50,
            high: 200,
            unlimited: 10_000,
        }
    }
}

impl TierBudgets {
    /// Budget for a tier.
    pub fn budget_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Low => self.low,
            RateLimitTier::Medium => self.medium,
            RateLimitTier::High => self.high,
            RateLimitTier::Unlimited => self.unlimited,
        }
    }
}

/// Rate limit tier a tool is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitTier {
    Low,
    #[default]
    Medium,
    High,
    Unlimited,
}

impl RateLimitTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Low => "low",
            RateLimitTier::Medium => "medium",
            RateLimitTier::High => "high",
            RateLimitTier::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Correlation context bookkeeping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Age past which an unfinalized context is considered leaked and
    /// eligible for sweeping.
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(300),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.processor.step_timeout, Duration::from_secs(30));
        assert_eq!(config.processor.max_plan_steps, 64);
        assert_eq!(config.rate_limits.window, Duration::from_secs(60));
        assert_eq!(config.contexts.stale_after, Duration::from_secs(300));
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_tier_budgets() {
        let budgets = TierBudgets::default();
        assert_eq!(budgets.budget_for(RateLimitTier::Low), 10);
        assert_eq!(budgets.budget_for(RateLimitTier::Medium), 50);
        assert_eq!(budgets.budget_for(RateLimitTier::High), 200);
        assert_eq!(budgets.budget_for(RateLimitTier::Unlimited), 10_000);
        assert_eq!(RateLimitTier::default(), RateLimitTier::Medium);
    }

    #[test]
    fn test_partial_overrides_keep_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"processor": {"step_timeout": "5s"}}"#,
        )
        .unwrap();
        assert_eq!(config.processor.step_timeout, Duration::from_secs(5));
        assert_eq!(config.processor.max_plan_steps, 64);
        assert_eq!(config.rate_limits.tiers.medium, 50);
    }

    #[test]
    fn test_tier_wire_format() {
        assert_eq!(
            serde_json::to_string(&RateLimitTier::Unlimited).unwrap(),
            "\"unlimited\""
        );
        let tier: RateLimitTier = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(tier, RateLimitTier::High);
    }
}
