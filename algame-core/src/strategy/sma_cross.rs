//! Simple moving average crossover (long only).
//!
//! - Bullish cross (fast crosses above slow): close anything open, then buy.
//! - Bearish cross: close.

use super::{optional_pct, order_size, require_period, Strategy, StrategyError};
use crate::domain::{Bar, ParamSet, Signal};

#[derive(Debug, Clone)]
pub struct SmaCross {
    fast: usize,
    slow: usize,
    size: f64,
    stop_loss_pct: Option<f64>,
    take_profit_pct: Option<f64>,
}

impl SmaCross {
    pub fn new(fast: usize, slow: usize, size: f64) -> Result<Self, StrategyError> {
        if fast == 0 || fast >= slow {
            return Err(StrategyError::InvalidParam {
                name: "fast".to_string(),
                reason: format!("need 0 < fast < slow, got fast={fast} slow={slow}"),
            });
        }
        Ok(Self {
            fast,
            slow,
            size,
            stop_loss_pct: None,
            take_profit_pct: None,
        })
    }

    /// Params: `fast`, `slow` (required), `size`, `stop_loss_pct`, `take_profit_pct`.
    pub fn from_params(params: &ParamSet) -> Result<Self, StrategyError> {
        let mut strategy = Self::new(
            require_period(params, "fast")?,
            require_period(params, "slow")?,
            order_size(params)?,
        )?;
        strategy.stop_loss_pct = optional_pct(params, "stop_loss_pct")?;
        strategy.take_profit_pct = optional_pct(params, "take_profit_pct")?;
        Ok(strategy)
    }

    fn sma(bars: &[Bar], period: usize) -> Option<f64> {
        if bars.len() < period {
            return None;
        }
        let sum: f64 = bars[bars.len() - period..].iter().map(|b| b.close).sum();
        Some(sum / period as f64)
    }

    /// `Some(true)` on a bullish cross at the last bar, `Some(false)` on a bearish one.
    fn cross(&self, bars: &[Bar]) -> Option<bool> {
        if bars.len() < self.slow + 1 {
            return None;
        }
        let prev = &bars[..bars.len() - 1];
        let fast_now = Self::sma(bars, self.fast)?;
        let slow_now = Self::sma(bars, self.slow)?;
        let fast_prev = Self::sma(prev, self.fast)?;
        let slow_prev = Self::sma(prev, self.slow)?;

        if fast_prev <= slow_prev && fast_now > slow_now {
            Some(true)
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Some(false)
        } else {
            None
        }
    }
}

impl Strategy for SmaCross {
    fn next(&self, history: &[Bar]) -> Result<Vec<Signal>, StrategyError> {
        let Some(close) = history.last().map(|b| b.close) else {
            return Ok(Vec::new());
        };
        match self.cross(history) {
            Some(true) => {
                let mut entry = Signal::buy(self.size);
                entry.stop_loss = self.stop_loss_pct.map(|p| close * (1.0 - p / 100.0));
                entry.take_profit = self.take_profit_pct.map(|p| close * (1.0 + p / 100.0));
                Ok(vec![Signal::close(), entry])
            }
            Some(false) => Ok(vec![Signal::close()]),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &str {
        "sma_cross"
    }
}
