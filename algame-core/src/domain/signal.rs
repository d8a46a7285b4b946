//! Signals: what a strategy asks for on a bar.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    /// Flatten the current position. `size` is ignored.
    Close,
}

/// A typed strategy signal: `{buy|sell|close, size, stop_loss?, take_profit?}`.
///
/// `limit` and `stop` turn the resulting order into a resting limit/stop order
/// instead of a market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    pub size: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub stop: Option<f64>,
}

impl Signal {
    fn new(action: SignalAction, size: f64) -> Self {
        Self {
            action,
            size,
            stop_loss: None,
            take_profit: None,
            limit: None,
            stop: None,
        }
    }

    pub fn buy(size: f64) -> Self {
        Self::new(SignalAction::Buy, size)
    }

    pub fn sell(size: f64) -> Self {
        Self::new(SignalAction::Sell, size)
    }

    pub fn close() -> Self {
        Self::new(SignalAction::Close, 0.0)
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_limit(mut self, price: f64) -> Self {
        self.limit = Some(price);
        self
    }

    pub fn with_stop(mut self, price: f64) -> Self {
        self.stop = Some(price);
        self
    }
}
