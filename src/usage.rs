//! Token accounting and cost estimation.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Per-million-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for Pricing {
    /// claude-sonnet-4 list price: $3 in / $15 out.
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

/// Tokens reported by the provider for one call, or summed over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Estimated spend in USD.
    ///
    /// Multiplies before dividing so whole-million counts come out exact.
    pub fn estimated_cost(&self, pricing: &Pricing) -> f64 {
        (self.input_tokens as f64 * pricing.input_per_million
            + self.output_tokens as f64 * pricing.output_per_million)
            / 1_000_000.0
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// The `token_usage` block of a persisted batch artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageReport {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl TokenUsageReport {
    pub fn new(usage: TokenUsage, pricing: &Pricing) -> Self {
        let cost = usage.estimated_cost(pricing);
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens(),
            estimated_cost_usd: (cost * 10_000.0).round() / 10_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_million_each_costs_eighteen_dollars() {
        let usage = TokenUsage::new(1_000_000, 1_000_000);
        assert_eq!(usage.estimated_cost(&Pricing::default()), 18.0);
    }

    #[test]
    fn totals_and_small_costs() {
        let usage = TokenUsage::new(1000, 200);
        assert_eq!(usage.total_tokens(), 1200);
        let expected = 1000.0 * 3.0 / 1e6 + 200.0 * 15.0 / 1e6;
        assert!((usage.estimated_cost(&Pricing::default()) - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_usage_is_free() {
        let usage = TokenUsage::default();
        assert_eq!(usage.total_tokens(), 0);
        assert_eq!(usage.estimated_cost(&Pricing::default()), 0.0);
    }

    #[test]
    fn accumulates_additively() {
        let mut total = TokenUsage::default();
        total += TokenUsage::new(1500, 250);
        total += TokenUsage::new(1200, 180);
        assert_eq!(total, TokenUsage::new(2700, 430));
    }

    #[test]
    fn report_rounds_cost_to_four_places() {
        let report = TokenUsageReport::new(TokenUsage::new(1234, 567), &Pricing::default());
        assert_eq!(report.total_tokens, 1801);
        // 0.003702 + 0.008505 = 0.012207
        assert_eq!(report.estimated_cost_usd, 0.0122);
    }
}
