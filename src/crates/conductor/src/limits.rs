//! Resource limits enforced before and during execution
//!
//! Before preparation: per-user concurrent run cap, per-user submission
//! rate, per-user daily token budget and a maximum blueprint size. During
//! execution the executor enforces the per-run step cap and wall-clock
//! deadline configured here; tool-call and loop bounds live with their
//! nodes.

use dashmap::DashMap;
use skein_core::blueprint::WorkflowBlueprint;
use skein_core::error::{Result, WorkflowError};
use std::sync::Arc;
use std::time::Duration;
use tooling::rate_limit::KeyedRateLimiter;

/// Limit settings for one engine instance
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Concurrent runs allowed per user
    pub max_concurrent_per_user: u32,
    /// Tokens a user may consume per UTC day
    pub daily_token_budget: u64,
    /// Node visits allowed in one run
    pub max_steps_per_run: u32,
    /// Nodes allowed in one blueprint
    pub max_blueprint_nodes: usize,
    /// Run submissions allowed per user per minute
    pub executions_per_minute: usize,
    /// Wall-clock deadline for one run
    pub run_deadline: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_user: 4,
            daily_token_budget: 500_000,
            max_steps_per_run: 100,
            max_blueprint_nodes: 50,
            executions_per_minute: 30,
            run_deadline: Duration::from_secs(300),
        }
    }
}

/// RAII slot for one in-flight run; releases on drop
#[derive(Debug)]
pub struct ConcurrencySlot {
    user_id: String,
    active: Arc<DashMap<String, u32>>,
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        if let Some(mut count) = self.active.get_mut(&self.user_id) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Enforces the pre-execution limits
#[derive(Clone)]
pub struct LimitEnforcer {
    config: LimitsConfig,
    active: Arc<DashMap<String, u32>>,
    daily_tokens: Arc<DashMap<(String, String), u64>>,
    rate: KeyedRateLimiter,
}

impl LimitEnforcer {
    /// Enforcer with the given settings
    pub fn new(config: LimitsConfig) -> Self {
        let rate = KeyedRateLimiter::new(config.executions_per_minute, Duration::from_secs(60));
        Self {
            config,
            active: Arc::new(DashMap::new()),
            daily_tokens: Arc::new(DashMap::new()),
            rate,
        }
    }

    /// The settings this enforcer applies
    pub fn config(&self) -> &LimitsConfig {
        &self.config
    }

    fn today() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Admit one run for `user_id`, reserving a concurrency slot.
    ///
    /// Checks the submission rate, the concurrent-run cap and the daily
    /// token budget, in that order. The returned slot must be held for the
    /// duration of the run.
    pub async fn admit(&self, user_id: &str) -> Result<ConcurrencySlot> {
        if !self.rate.check(user_id).await {
            return Err(WorkflowError::limit(format!(
                "user '{user_id}' exceeded {} executions per minute",
                self.config.executions_per_minute
            )));
        }

        {
            let mut count = self.active.entry(user_id.to_string()).or_insert(0);
            if *count >= self.config.max_concurrent_per_user {
                return Err(WorkflowError::limit(format!(
                    "user '{user_id}' already has {} concurrent executions",
                    *count
                )));
            }
            *count += 1;
        }

        let spent = self.tokens_spent_today(user_id);
        if spent >= self.config.daily_token_budget {
            // Give the slot back before refusing.
            if let Some(mut count) = self.active.get_mut(user_id) {
                *count = count.saturating_sub(1);
            }
            return Err(WorkflowError::limit(format!(
                "user '{user_id}' exhausted the daily token budget of {}",
                self.config.daily_token_budget
            )));
        }

        Ok(ConcurrencySlot {
            user_id: user_id.to_string(),
            active: self.active.clone(),
        })
    }

    /// Reject oversized blueprints before compilation
    pub fn check_blueprint(&self, blueprint: &WorkflowBlueprint) -> Result<()> {
        if blueprint.nodes.len() > self.config.max_blueprint_nodes {
            return Err(WorkflowError::limit(format!(
                "blueprint has {} nodes, limit is {}",
                blueprint.nodes.len(),
                self.config.max_blueprint_nodes
            )));
        }
        Ok(())
    }

    /// Charge a finished run's tokens against the user's daily budget
    pub fn record_usage(&self, user_id: &str, tokens: u64) {
        *self
            .daily_tokens
            .entry((user_id.to_string(), Self::today()))
            .or_insert(0) += tokens;
    }

    /// Tokens the user has consumed today
    pub fn tokens_spent_today(&self, user_id: &str) -> u64 {
        self.daily_tokens
            .get(&(user_id.to_string(), Self::today()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Current in-flight run count for a user
    pub fn active_count(&self, user_id: &str) -> u32 {
        self.active.get(user_id).map(|v| *v).unwrap_or(0)
    }
}
