//! Strategies: per-bar signal generation.
//!
//! A strategy sees only market history (`bars[..=i]`) and answers with zero or
//! more signals. It never sees position state; the asset processor turns
//! signals into orders. A per-bar failure is a `Result::Err`, not an unwind.

pub mod buy_and_hold;
pub mod registry;
pub mod sma_cross;

pub use buy_and_hold::BuyAndHold;
pub use registry::{RegistryError, StrategyRegistry};
pub use sma_cross::SmaCross;

use thiserror::Error;

use crate::domain::{Bar, ParamSet, Signal};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("{0}")]
    Evaluation(String),
}

/// Per-bar signal generator.
///
/// # Invariants
/// - `next()` must be deterministic for the same bar sequence.
/// - `history` always ends with the current bar and is never empty.
pub trait Strategy: Send + Sync {
    fn next(&self, history: &[Bar]) -> Result<Vec<Signal>, StrategyError>;

    fn name(&self) -> &str {
        "custom"
    }
}

/// Builds a strategy instance from a parameter set.
pub trait StrategyFactory: Send + Sync {
    fn build(&self, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&ParamSet) -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync,
{
    fn build(&self, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError> {
        self(params)
    }
}

// ─── Parameter helpers ───────────────────────────────────────────────

/// Read a float parameter, falling back to `default` when absent.
pub fn param_f64(params: &ParamSet, name: &str, default: f64) -> f64 {
    params.get_f64(name).unwrap_or(default)
}

/// Read a required positive integer parameter.
pub fn require_period(params: &ParamSet, name: &str) -> Result<usize, StrategyError> {
    let value = params
        .get(name)
        .ok_or_else(|| StrategyError::MissingParam(name.to_string()))?;
    match value.as_i64() {
        Some(v) if v > 0 => Ok(v as usize),
        _ => Err(StrategyError::InvalidParam {
            name: name.to_string(),
            reason: format!("expected a positive integer, got {value}"),
        }),
    }
}

/// Read an optional percentage parameter; must be positive and below 100.
pub fn optional_pct(params: &ParamSet, name: &str) -> Result<Option<f64>, StrategyError> {
    match params.get_f64(name) {
        None => Ok(None),
        Some(v) if v.is_finite() && v > 0.0 && v < 100.0 => Ok(Some(v)),
        Some(v) => Err(StrategyError::InvalidParam {
            name: name.to_string(),
            reason: format!("expected a percentage in (0, 100), got {v}"),
        }),
    }
}

/// Read a positive order size, defaulting to 1.
pub fn order_size(params: &ParamSet) -> Result<f64, StrategyError> {
    let size = param_f64(params, "size", 1.0);
    if size.is_finite() && size > 0.0 {
        Ok(size)
    } else {
        Err(StrategyError::InvalidParam {
            name: "size".to_string(),
            reason: format!("expected a positive size, got {size}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl Strategy for Silent {
        fn next(&self, _history: &[Bar]) -> Result<Vec<Signal>, StrategyError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn default_name() {
        assert_eq!(Silent.name(), "custom");
    }

    #[test]
    fn closure_is_a_factory() {
        let factory = |_: &ParamSet| -> Result<Box<dyn Strategy>, StrategyError> {
            Ok(Box::new(Silent))
        };
        let strategy = factory.build(&ParamSet::new()).unwrap();
        assert_eq!(strategy.name(), "custom");
    }

    #[test]
    fn period_helpers() {
        let params = ParamSet::new()
            .with("fast", 10i64)
            .with("slow", 0i64)
            .with("half", 2.5);
        assert_eq!(require_period(&params, "fast"), Ok(10));
        assert!(matches!(
            require_period(&params, "slow"),
            Err(StrategyError::InvalidParam { .. })
        ));
        assert!(matches!(
            require_period(&params, "half"),
            Err(StrategyError::InvalidParam { .. })
        ));
        assert_eq!(
            require_period(&params, "missing"),
            Err(StrategyError::MissingParam("missing".into()))
        );
    }

    #[test]
    fn pct_and_size_helpers() {
        let params = ParamSet::new().with("stop_loss_pct", 2.0).with("size", -1.0);
        assert_eq!(optional_pct(&params, "stop_loss_pct"), Ok(Some(2.0)));
        assert_eq!(optional_pct(&params, "take_profit_pct"), Ok(None));
        assert!(order_size(&params).is_err());
        assert_eq!(order_size(&ParamSet::new()), Ok(1.0));
    }
}
