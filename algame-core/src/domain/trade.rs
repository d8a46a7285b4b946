//! Trade: an immutable record of closed exposure.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::metrics::trade_return_pct;

/// Why a position (or part of it) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    EndOfData,
}

/// A closed round trip (or the closed part of one).
///
/// `size` is signed: positive for longs, negative for shorts, so
/// `pnl == (exit_price - entry_price) * size` holds for both.
/// `pnl` is gross; `fees` holds the entry and exit commission allotted to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub fees: f64,
    pub is_long: bool,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.fees
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl() > 0.0
    }

    /// Price return in percent, sign-adjusted for shorts.
    pub fn return_pct(&self) -> f64 {
        trade_return_pct(self.entry_price, self.exit_price, self.is_long)
    }

    pub fn holding_time(&self) -> chrono::Duration {
        self.exit_time - self.entry_time
    }
}
