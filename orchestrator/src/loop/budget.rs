//! The per-session spending envelope and context-window accounting.
//!
//! `max_iterations` is the one budget dimension [`crate::config::ConcurrencyConfig`]
//! already exposes as a per-tier knob; the rest (tokens, dollars, wall
//! clock) aren't configurable yet, so they're fixed constants here.

use std::time::Duration;

use store::ModelTier;

use crate::config::ConcurrencyConfig;

/// Context window assumed for cost/usage-percent reporting. Both tiers
/// currently resolve to Claude models with a 200k-token window.
const CONTEXT_WINDOW_TOKENS: u64 = 200_000;

#[derive(Debug, Clone, Copy)]
pub struct BudgetEnvelope {
    pub max_iterations: u32,
    pub max_tokens: u64,
    pub max_cents: u64,
    pub wall_clock_deadline: Duration,
}

impl BudgetEnvelope {
    pub fn for_tier(tier: ModelTier, concurrency: &ConcurrencyConfig) -> Self {
        match tier {
            ModelTier::Capable => Self {
                max_iterations: concurrency.capable_iteration_budget,
                max_tokens: 200_000,
                max_cents: 500,
                wall_clock_deadline: Duration::from_secs(30 * 60),
            },
            ModelTier::Fast => Self {
                max_iterations: concurrency.fast_iteration_budget,
                max_tokens: 60_000,
                max_cents: 100,
                wall_clock_deadline: Duration::from_secs(10 * 60),
            },
        }
    }
}

/// Running totals checked against the envelope each iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetUsage {
    pub iterations: u32,
    pub tokens: u64,
    pub cents: u64,
}

impl BudgetUsage {
    pub fn exceeds(&self, envelope: &BudgetEnvelope, elapsed: Duration) -> bool {
        self.iterations >= envelope.max_iterations
            || self.tokens >= envelope.max_tokens
            || self.cents >= envelope.max_cents
            || elapsed >= envelope.wall_clock_deadline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStatus {
    Ok,
    Warning,
    Critical,
}

/// `{used_tokens, max_tokens, usage_percent, status}`, computed fresh
/// each iteration from the running context size, not the budget.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ContextReport {
    pub used_tokens: u64,
    pub max_tokens: u64,
    pub usage_percent: f64,
    pub status: ContextStatus,
}

impl ContextReport {
    pub fn new(used_tokens: u64) -> Self {
        let max_tokens = CONTEXT_WINDOW_TOKENS;
        let usage_percent = (used_tokens as f64 / max_tokens as f64) * 100.0;
        let status = if usage_percent >= 90.0 {
            ContextStatus::Critical
        } else if usage_percent >= 70.0 {
            ContextStatus::Warning
        } else {
            ContextStatus::Ok
        };
        Self { used_tokens, max_tokens, usage_percent, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capable_tier_pulls_its_iteration_cap_from_concurrency_config() {
        let concurrency = ConcurrencyConfig { capable_iteration_budget: 60, ..Default::default() };
        let envelope = BudgetEnvelope::for_tier(ModelTier::Capable, &concurrency);
        assert_eq!(envelope.max_iterations, 60);
        assert_eq!(envelope.max_tokens, 200_000);
    }

    #[test]
    fn usage_exceeding_any_single_dimension_trips_the_budget() {
        let envelope = BudgetEnvelope::for_tier(ModelTier::Fast, &ConcurrencyConfig::default());
        let usage = BudgetUsage { iterations: 0, tokens: envelope.max_tokens, cents: 0 };
        assert!(usage.exceeds(&envelope, Duration::ZERO));
    }

    #[test]
    fn usage_under_every_dimension_does_not_trip_the_budget() {
        let envelope = BudgetEnvelope::for_tier(ModelTier::Fast, &ConcurrencyConfig::default());
        let usage = BudgetUsage { iterations: 1, tokens: 10, cents: 1 };
        assert!(!usage.exceeds(&envelope, Duration::from_secs(1)));
    }

    #[test]
    fn context_report_classifies_usage_bands() {
        assert_eq!(ContextReport::new(10_000).status, ContextStatus::Ok);
        assert_eq!(ContextReport::new(150_000).status, ContextStatus::Warning);
        assert_eq!(ContextReport::new(195_000).status, ContextStatus::Critical);
    }
}
