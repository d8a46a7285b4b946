//! Engine configuration shared read-only by every asset processor in a run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::OrderSide;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("initial_capital must be positive and finite, got {0}")]
    InitialCapital(f64),

    #[error("{field} must be a finite rate in [0, 1), got {value}")]
    Rate { field: &'static str, value: f64 },

    #[error("{field} must be positive and finite, got {value}")]
    Limit { field: &'static str, value: f64 },
}

/// Capital, costs and exposure limits for a backtest.
///
/// Deserializes with defaults for missing fields so partial TOML sections work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Fraction of fill notional charged per fill.
    pub commission: f64,
    /// Multiplicative price adjustment against the trader.
    pub slippage: f64,
    pub max_leverage: f64,
    /// Maximum absolute notional as a fraction of current equity (before leverage).
    pub position_limit: f64,
    pub allow_short: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission: 0.001,
            slippage: 0.0,
            max_leverage: 1.0,
            position_limit: 1.0,
            allow_short: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::InitialCapital(self.initial_capital));
        }
        for (field, value) in [("commission", self.commission), ("slippage", self.slippage)] {
            if !(value.is_finite() && (0.0..1.0).contains(&value)) {
                return Err(ConfigError::Rate { field, value });
            }
        }
        for (field, value) in [
            ("max_leverage", self.max_leverage),
            ("position_limit", self.position_limit),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Limit { field, value });
            }
        }
        Ok(())
    }

    /// Largest absolute notional allowed at the given equity.
    pub fn max_notional(&self, equity: f64) -> f64 {
        (equity * self.position_limit * self.max_leverage).max(0.0)
    }

    /// Execution price after slippage: buys pay up, sells receive less.
    pub fn fill_price(&self, side: OrderSide, price: f64) -> f64 {
        match side {
            OrderSide::Buy => price * (1.0 + self.slippage),
            OrderSide::Sell => price * (1.0 - self.slippage),
        }
    }

    pub fn commission_for(&self, price: f64, quantity: f64) -> f64 {
        (price * quantity).abs() * self.commission
    }

    /// Convenience for tests and scenarios: no costs.
    pub fn frictionless() -> Self {
        Self {
            commission: 0.0,
            slippage: 0.0,
            ..Self::default()
        }
    }
}
