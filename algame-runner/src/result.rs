//! Consolidated result of one multi-asset backtest.

use std::collections::BTreeMap;

use algame_core::domain::Trade;
use algame_core::engine::{AssetRun, EngineConfig};
use algame_core::metrics::PerformanceMetrics;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One point of the combined equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Per-asset bookkeeping carried into the combined result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub symbol: String,
    pub bars_processed: usize,
    pub strategy_errors: usize,
    pub rejected_orders: usize,
    pub trade_count: usize,
    pub final_equity: f64,
}

impl AssetSummary {
    pub(crate) fn from_run(run: &AssetRun, initial_capital: f64) -> Self {
        Self {
            symbol: run.symbol.clone(),
            bars_processed: run.bars_processed,
            strategy_errors: run.strategy_errors,
            rejected_orders: run.rejected_orders,
            trade_count: run.trades.len(),
            final_equity: run.final_equity().unwrap_or(initial_capital),
        }
    }
}

/// Combined backtest output. Built once by the orchestrator, never mutated.
///
/// `equity_curve`, `drawdowns` and `exposure` are aligned index by index.
/// The combined starting capital is `initial_capital * assets.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub equity_curve: Vec<EquitySample>,
    pub trades: Vec<Trade>,
    pub metrics: PerformanceMetrics,
    /// Percent below the running peak at each timestamp.
    pub drawdowns: Vec<f64>,
    /// Gross notional exposure as a fraction of equity at each timestamp.
    pub exposure: Vec<f64>,
    pub assets: Vec<AssetSummary>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub config: EngineConfig,
}

impl BacktestResult {
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|s| s.equity).collect()
    }

    pub fn final_equity(&self) -> f64 {
        self.metrics.final_equity
    }

    pub fn starting_capital(&self) -> f64 {
        self.config.initial_capital * self.assets.len() as f64
    }

    pub fn metrics_map(&self) -> BTreeMap<String, f64> {
        self.metrics.to_map()
    }

    pub fn total_strategy_errors(&self) -> usize {
        self.assets.iter().map(|a| a.strategy_errors).sum()
    }
}
