//! Fill: one execution against a position.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::order::{OrderId, OrderSide};

/// Result of executing (part of) an order or a protective exit.
///
/// `price` already includes slippage; `commission` is `|price * quantity| * rate`.
/// `order_id` is `None` for stop-loss, take-profit and end-of-data liquidations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: Option<OrderId>,
    pub timestamp: NaiveDateTime,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}
