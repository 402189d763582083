//! Spend guarding for a run.
//!
//! A [`CostEstimator`] prices a request before it is sent and, when the
//! backend reports usage, after it completes. The [`BudgetTracker`] keeps
//! the running totals; it is owned by the orchestrator, which is its only
//! writer.

use crate::gateway::GatewayRequest;
use crate::usage::Usage;

/// Prices provider calls.
pub trait CostEstimator: Send + Sync {
    /// Projected cost of a request before dispatch.
    fn estimate(&self, request: &GatewayRequest) -> f64;

    /// Cost derived from reported usage, if this estimator can compute one.
    fn actual(&self, usage: &Usage) -> Option<f64>;
}

/// Token-based pricing with per-million rates.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRateEstimator {
    /// Cost per million input tokens.
    pub input_per_million: f64,
    /// Cost per million output tokens.
    pub output_per_million: f64,
    /// Output tokens assumed per contract field when estimating.
    pub expected_output_tokens_per_field: u64,
}

impl Default for TokenRateEstimator {
    fn default() -> Self {
        Self {
            input_per_million: 0.15,
            output_per_million: 0.60,
            expected_output_tokens_per_field: 64,
        }
    }
}

impl TokenRateEstimator {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
            ..Default::default()
        }
    }

    pub fn with_expected_output_tokens(mut self, tokens_per_field: u64) -> Self {
        self.expected_output_tokens_per_field = tokens_per_field;
        self
    }

    fn price(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Approximate token count of a text (four characters per token).
fn approx_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

impl CostEstimator for TokenRateEstimator {
    fn estimate(&self, request: &GatewayRequest) -> f64 {
        let schema_len = request.contract.to_json_schema().to_string();
        let input = approx_tokens(&request.prompt) + approx_tokens(&schema_len);
        let fields = request.contract.fields.len() as u64;
        self.price(input, fields * self.expected_output_tokens_per_field)
    }

    fn actual(&self, usage: &Usage) -> Option<f64> {
        Some(self.price(usage.input_tokens, usage.output_tokens))
    }
}

/// Fixed cost per call, ignoring reported usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatRateEstimator {
    pub cost_per_call: f64,
}

impl FlatRateEstimator {
    pub fn new(cost_per_call: f64) -> Self {
        Self { cost_per_call }
    }
}

impl CostEstimator for FlatRateEstimator {
    fn estimate(&self, _request: &GatewayRequest) -> f64 {
        self.cost_per_call
    }

    fn actual(&self, _usage: &Usage) -> Option<f64> {
        None
    }
}

/// Identifier of an outstanding reservation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reservation {
    amount: f64,
}

/// Running spend totals for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetTracker {
    limit: Option<f64>,
    spent: f64,
    reserved: f64,
}

impl BudgetTracker {
    pub fn new(limit: Option<f64>) -> Self {
        Self {
            limit,
            spent: 0.0,
            reserved: 0.0,
        }
    }

    /// Reserve `estimate` if it fits under the limit.
    ///
    /// Returns `None` when `spent + reserved + estimate` would exceed it.
    pub fn try_reserve(&mut self, estimate: f64) -> Option<Reservation> {
        let estimate = estimate.max(0.0);
        if let Some(limit) = self.limit {
            if self.spent + self.reserved + estimate > limit {
                return None;
            }
        }
        self.reserved += estimate;
        Some(Reservation { amount: estimate })
    }

    /// Convert a reservation into spend; `actual` replaces the estimate when known.
    pub fn settle(&mut self, reservation: Reservation, actual: Option<f64>) {
        self.release(reservation);
        self.spent += actual.unwrap_or(reservation.amount).max(0.0);
    }

    /// Drop a reservation without spending it.
    pub fn release(&mut self, reservation: Reservation) {
        self.reserved = (self.reserved - reservation.amount).max(0.0);
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn reserved(&self) -> f64 {
        self.reserved
    }

    pub fn limit(&self) -> Option<f64> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputSpec;
    use crate::contract::build_contract;

    fn request(prompt: &str) -> GatewayRequest {
        let output = OutputSpec::text("Summary", "p");
        GatewayRequest {
            integration_name: "mock".into(),
            model: "m".into(),
            temperature: 0.2,
            prompt: prompt.into(),
            contract: build_contract(&[&output]),
        }
    }

    #[test]
    fn test_unlimited_budget_always_reserves() {
        let mut tracker = BudgetTracker::new(None);
        for _ in 0..100 {
            assert!(tracker.try_reserve(1_000.0).is_some());
        }
    }

    #[test]
    fn test_reservations_count_against_limit() {
        let mut tracker = BudgetTracker::new(Some(1.0));
        let first = tracker.try_reserve(0.4).unwrap();
        let _second = tracker.try_reserve(0.4).unwrap();
        assert!(tracker.try_reserve(0.4).is_none());

        tracker.release(first);
        assert!(tracker.try_reserve(0.4).is_some());
    }

    #[test]
    fn test_settle_uses_actual_when_known() {
        let mut tracker = BudgetTracker::new(Some(1.0));
        let reservation = tracker.try_reserve(0.5).unwrap();
        tracker.settle(reservation, Some(0.1));
        assert_eq!(tracker.reserved(), 0.0);
        assert!((tracker.spent() - 0.1).abs() < 1e-12);

        let reservation = tracker.try_reserve(0.5).unwrap();
        tracker.settle(reservation, None);
        assert!((tracker.spent() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_budget_refuses_priced_calls() {
        let mut tracker = BudgetTracker::new(Some(0.0));
        assert!(tracker.try_reserve(0.01).is_none());
        assert!(tracker.try_reserve(0.0).is_some());
    }

    #[test]
    fn test_token_estimator_grows_with_prompt() {
        let estimator = TokenRateEstimator::default();
        let short = estimator.estimate(&request("hi"));
        let long = estimator.estimate(&request(&"word ".repeat(500)));
        assert!(short > 0.0);
        assert!(long > short);

        let cost = estimator.actual(&Usage::new(1_000_000, 0)).unwrap();
        assert!((cost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_flat_estimator() {
        let estimator = FlatRateEstimator::new(0.25);
        assert_eq!(estimator.estimate(&request("anything")), 0.25);
        assert_eq!(estimator.actual(&Usage::new(10, 10)), None);
    }
}
