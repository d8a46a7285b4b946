//! Buy-and-hold: enter once on the first bar, hold until end of data.

use super::{order_size, Strategy, StrategyError};
use crate::domain::{Bar, ParamSet, Signal};

/// Buys `size` units on the first bar.
///
/// Optional absolute `stop_loss` / `take_profit` prices ride along on the entry.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    size: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

impl BuyAndHold {
    pub fn new(size: f64) -> Self {
        Self {
            size,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    /// Params: `size` (default 1), optional `stop_loss`, `take_profit`.
    pub fn from_params(params: &ParamSet) -> Result<Self, StrategyError> {
        Ok(Self {
            size: order_size(params)?,
            stop_loss: params.get_f64("stop_loss"),
            take_profit: params.get_f64("take_profit"),
        })
    }
}

impl Strategy for BuyAndHold {
    fn next(&self, history: &[Bar]) -> Result<Vec<Signal>, StrategyError> {
        if history.len() != 1 {
            return Ok(Vec::new());
        }
        let mut signal = Signal::buy(self.size);
        signal.stop_loss = self.stop_loss;
        signal.take_profit = self.take_profit;
        Ok(vec![signal])
    }

    fn name(&self) -> &str {
        "buy_and_hold"
    }
}
