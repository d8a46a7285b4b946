//! Orders: directives to change exposure, and their validation rules.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier assigned by the owning position at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order lifecycle. `Filled` and `Cancelled` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled { reason: String },
}

/// Validation failures raised at submit time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("order size must be positive and finite, got {0}")]
    InvalidSize(f64),

    #[error("order {field} must be positive and finite, got {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("{side:?} stop {stop} and limit {limit} can never trigger together")]
    UnreachableStopLimit {
        side: OrderSide,
        stop: f64,
        limit: f64,
    },

    #[error("{side:?} stop-loss {stop_loss} is on the wrong side of take-profit {take_profit}")]
    InvertedBracket {
        side: OrderSide,
        stop_loss: f64,
        take_profit: f64,
    },

    #[error("order {0} is not pending")]
    NotPending(OrderId),
}

/// A single order owned by one position.
///
/// An order with neither `limit` nor `stop` is a market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: OrderSide,
    pub size: f64,
    pub limit: Option<f64>,
    pub stop: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub created_at: NaiveDateTime,
    pub status: OrderStatus,
}

impl Order {
    /// A pending market order. The id is replaced when the order is submitted.
    pub fn market(side: OrderSide, size: f64, created_at: NaiveDateTime) -> Self {
        Self {
            id: OrderId(0),
            side,
            size,
            limit: None,
            stop: None,
            stop_loss: None,
            take_profit: None,
            created_at,
            status: OrderStatus::Pending,
        }
    }

    pub fn with_limit(mut self, limit: f64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_stop(mut self, stop: f64) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_stop_loss(mut self, stop_loss: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: f64) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, OrderStatus::Pending)
    }

    pub fn is_market(&self) -> bool {
        self.limit.is_none() && self.stop.is_none()
    }

    /// Check structural soundness. Called by the position on submit.
    pub fn validate(&self) -> Result<(), OrderError> {
        if !self.is_pending() {
            return Err(OrderError::NotPending(self.id));
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(OrderError::InvalidSize(self.size));
        }
        for (field, value) in [
            ("limit", self.limit),
            ("stop", self.stop),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(OrderError::InvalidPrice { field, value: v });
                }
            }
        }

        if let (Some(stop), Some(limit)) = (self.stop, self.limit) {
            let reachable = match self.side {
                OrderSide::Buy => stop <= limit,
                OrderSide::Sell => stop >= limit,
            };
            if !reachable {
                return Err(OrderError::UnreachableStopLimit {
                    side: self.side,
                    stop,
                    limit,
                });
            }
        }

        if let (Some(stop_loss), Some(take_profit)) = (self.stop_loss, self.take_profit) {
            let ordered = match self.side {
                OrderSide::Buy => stop_loss < take_profit,
                OrderSide::Sell => stop_loss > take_profit,
            };
            if !ordered {
                return Err(OrderError::InvertedBracket {
                    side: self.side,
                    stop_loss,
                    take_profit,
                });
            }
        }
        Ok(())
    }

    /// Whether the order's entry conditions hold at `price`.
    ///
    /// Buy stop: price >= stop. Buy limit: price <= limit. Sells are mirrored.
    /// Stop-limit orders need both conditions.
    pub fn triggers_at(&self, price: f64) -> bool {
        match self.side {
            OrderSide::Buy => {
                self.stop.map_or(true, |s| price >= s) && self.limit.map_or(true, |l| price <= l)
            }
            OrderSide::Sell => {
                self.stop.map_or(true, |s| price <= s) && self.limit.map_or(true, |l| price >= l)
            }
        }
    }
}
