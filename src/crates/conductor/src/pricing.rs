//! Cost derivation
//!
//! Pricing is an injected collaborator: the engine asks a [`CostModel`]
//! to price a run's canonical token totals at completion. The in-memory
//! [`StaticPriceTable`] ships with a small default table; unknown
//! provider/model pairs price at zero rather than failing the run.

use dashmap::DashMap;
use skein_core::usage::UsageTotals;

/// Per-token rates for one provider/model pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRate {
    /// Cost per prompt token
    pub input_per_token: f64,
    /// Cost per completion token
    pub output_per_token: f64,
}

impl ModelRate {
    /// Rate with the given per-token costs
    pub fn new(input_per_token: f64, output_per_token: f64) -> Self {
        Self {
            input_per_token,
            output_per_token,
        }
    }

    /// Price a run's totals at this rate
    pub fn price(&self, totals: &UsageTotals) -> f64 {
        totals.prompt_tokens as f64 * self.input_per_token
            + totals.completion_tokens as f64 * self.output_per_token
    }
}

/// Pricing port consulted at run completion
pub trait CostModel: Send + Sync {
    /// Cost of `totals` for a provider/model pair
    fn cost(&self, provider: &str, model: &str, totals: &UsageTotals) -> f64;
}

/// In-memory price table with per-entry overrides
#[derive(Debug, Default)]
pub struct StaticPriceTable {
    rates: DashMap<(String, String), ModelRate>,
}

impl StaticPriceTable {
    /// Empty table; everything prices at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with well-known rates
    pub fn with_defaults() -> Self {
        let table = Self::new();
        table.set("openai", "gpt-4o", ModelRate::new(2.5e-6, 10.0e-6));
        table.set("openai", "gpt-4o-mini", ModelRate::new(0.15e-6, 0.6e-6));
        table.set("anthropic", "claude-sonnet", ModelRate::new(3.0e-6, 15.0e-6));
        table.set("anthropic", "claude-haiku", ModelRate::new(0.8e-6, 4.0e-6));
        table
    }

    /// Insert or replace a rate
    pub fn set(&self, provider: &str, model: &str, rate: ModelRate) {
        self.rates
            .insert((provider.to_string(), model.to_string()), rate);
    }

    /// Rate for a pair, when known
    pub fn rate(&self, provider: &str, model: &str) -> Option<ModelRate> {
        self.rates
            .get(&(provider.to_string(), model.to_string()))
            .map(|r| *r)
    }
}

impl CostModel for StaticPriceTable {
    fn cost(&self, provider: &str, model: &str, totals: &UsageTotals) -> f64 {
        match self.rate(provider, model) {
            Some(rate) => rate.price(totals),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(prompt: u64, completion: u64) -> UsageTotals {
        UsageTotals {
            prompt_tokens: prompt,
            completion_tokens: completion,
            tokens_used: prompt + completion,
        }
    }

    #[test]
    fn prices_with_split_rates() {
        let table = StaticPriceTable::new();
        table.set("x", "m", ModelRate::new(0.001, 0.002));

        let cost = table.cost("x", "m", &totals(100, 50));
        assert!((cost - (0.1 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn unknown_models_price_at_zero() {
        let table = StaticPriceTable::new();
        assert_eq!(table.cost("x", "unknown", &totals(1000, 1000)), 0.0);
    }

    #[test]
    fn overrides_replace_defaults() {
        let table = StaticPriceTable::with_defaults();
        assert!(table.rate("openai", "gpt-4o").is_some());

        table.set("openai", "gpt-4o", ModelRate::new(1.0, 1.0));
        let cost = table.cost("openai", "gpt-4o", &totals(2, 3));
        assert!((cost - 5.0).abs() < 1e-9);
    }
}
