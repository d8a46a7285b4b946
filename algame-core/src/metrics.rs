//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, scalar
//! out. Percent-valued metrics carry a `_pct` suffix. Degenerate inputs (too
//! few bars, zero variance, no trades) yield 0.0 rather than NaN.
//!
//! Curve-based metrics take the *opening* curve: initial capital followed by the
//! per-bar equity values, so the first bar's move counts as a return.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::Trade;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return_pct: f64,
    pub annual_return_pct: f64,
    pub volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown_pct: f64,
    pub avg_drawdown_pct: f64,
    pub max_drawdown_duration: usize,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    pub avg_trade: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub total_fees: f64,
    pub exposure_pct: f64,
    pub final_equity: f64,
}

impl PerformanceMetrics {
    /// Every name accepted by [`PerformanceMetrics::get`].
    pub const NAMES: [&'static str; 22] = [
        "total_return_pct",
        "annual_return_pct",
        "volatility_pct",
        "sharpe_ratio",
        "sortino_ratio",
        "calmar_ratio",
        "max_drawdown_pct",
        "avg_drawdown_pct",
        "max_drawdown_duration",
        "win_rate_pct",
        "profit_factor",
        "trade_count",
        "avg_trade",
        "avg_win",
        "avg_loss",
        "largest_win",
        "largest_loss",
        "max_consecutive_wins",
        "max_consecutive_losses",
        "total_fees",
        "exposure_pct",
        "final_equity",
    ];

    /// Compute all metrics.
    ///
    /// `equity` and `exposure` are per-bar series of equal length; `exposure`
    /// holds fractions of equity. `trades` should be the run's closed trades.
    pub fn compute(initial_capital: f64, equity: &[f64], trades: &[Trade], exposure: &[f64]) -> Self {
        let mut curve = Vec::with_capacity(equity.len() + 1);
        curve.push(initial_capital);
        curve.extend_from_slice(equity);

        let drawdowns = drawdown_series(equity, initial_capital);
        let annual = annual_return_pct(&curve);
        let max_dd = max_drawdown_pct(&drawdowns);

        Self {
            total_return_pct: total_return_pct(&curve),
            annual_return_pct: annual,
            volatility_pct: volatility_pct(&curve),
            sharpe_ratio: sharpe_ratio(&curve),
            sortino_ratio: sortino_ratio(&curve),
            calmar_ratio: calmar_ratio(annual, max_dd),
            max_drawdown_pct: max_dd,
            avg_drawdown_pct: avg_drawdown_pct(&drawdowns),
            max_drawdown_duration: max_drawdown_duration(&drawdowns),
            win_rate_pct: win_rate_pct(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            avg_trade: avg_trade(trades),
            avg_win: avg_win(trades),
            avg_loss: avg_loss(trades),
            largest_win: largest_win(trades),
            largest_loss: largest_loss(trades),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            exposure_pct: mean_f64(exposure) * 100.0,
            final_equity: equity.last().copied().unwrap_or(initial_capital),
        }
    }

    /// Look a metric up by name. Counts are returned as floats.
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "total_return_pct" => self.total_return_pct,
            "annual_return_pct" => self.annual_return_pct,
            "volatility_pct" => self.volatility_pct,
            "sharpe_ratio" => self.sharpe_ratio,
            "sortino_ratio" => self.sortino_ratio,
            "calmar_ratio" => self.calmar_ratio,
            "max_drawdown_pct" => self.max_drawdown_pct,
            "avg_drawdown_pct" => self.avg_drawdown_pct,
            "max_drawdown_duration" => self.max_drawdown_duration as f64,
            "win_rate_pct" => self.win_rate_pct,
            "profit_factor" => self.profit_factor,
            "trade_count" => self.trade_count as f64,
            "avg_trade" => self.avg_trade,
            "avg_win" => self.avg_win,
            "avg_loss" => self.avg_loss,
            "largest_win" => self.largest_win,
            "largest_loss" => self.largest_loss,
            "max_consecutive_wins" => self.max_consecutive_wins as f64,
            "max_consecutive_losses" => self.max_consecutive_losses as f64,
            "total_fees" => self.total_fees,
            "exposure_pct" => self.exposure_pct,
            "final_equity" => self.final_equity,
            _ => return None,
        };
        Some(value)
    }

    /// Name → value view of every metric.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        Self::NAMES
            .iter()
            .filter_map(|&name| self.get(name).map(|v| (name.to_string(), v)))
            .collect()
    }
}

// ─── Return metrics ─────────────────────────────────────────────────

/// Total return in percent: (last / first - 1) * 100.
pub fn total_return_pct(curve: &[f64]) -> f64 {
    match (curve.first(), curve.last()) {
        (Some(&first), Some(&last)) if curve.len() >= 2 && first > 0.0 => {
            (last / first - 1.0) * 100.0
        }
        _ => 0.0,
    }
}

/// Compound annual growth in percent, assuming 252 bars per year.
pub fn annual_return_pct(curve: &[f64]) -> f64 {
    let (Some(&first), Some(&last)) = (curve.first(), curve.last()) else {
        return 0.0;
    };
    let periods = curve.len().saturating_sub(1);
    if periods == 0 || first <= 0.0 || last <= 0.0 {
        return 0.0;
    }
    let years = periods as f64 / TRADING_DAYS_PER_YEAR;
    ((last / first).powf(1.0 / years) - 1.0) * 100.0
}

/// Annualized standard deviation of bar returns, in percent.
pub fn volatility_pct(curve: &[f64]) -> f64 {
    std_dev(&period_returns(curve)) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
}

/// Annualized Sharpe ratio (risk-free rate 0).
///
/// Returns 0.0 if variance is zero or there are fewer than 2 returns.
pub fn sharpe_ratio(curve: &[f64]) -> f64 {
    let returns = period_returns(curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
pub fn sortino_ratio(curve: &[f64]) -> f64 {
    let returns = period_returns(curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq <= 0.0 {
        return 0.0;
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / downside_std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Calmar ratio: annual return / |max drawdown|, both in percent.
///
/// Returns 0.0 when there is no drawdown or the annual return is not positive.
pub fn calmar_ratio(annual_return_pct: f64, max_drawdown_pct: f64) -> f64 {
    if max_drawdown_pct >= 0.0 || annual_return_pct <= 0.0 {
        return 0.0;
    }
    annual_return_pct / max_drawdown_pct.abs()
}

// ─── Drawdowns ──────────────────────────────────────────────────────

/// Per-bar drawdown in percent, `(equity - peak) / peak * 100`, always <= 0.
///
/// The running peak starts at `starting_peak` (the initial capital).
pub fn drawdown_series(equity: &[f64], starting_peak: f64) -> Vec<f64> {
    let mut peak = starting_peak;
    equity
        .iter()
        .map(|&eq| {
            if eq > peak {
                peak = eq;
            }
            if peak > 0.0 {
                ((eq - peak) / peak * 100.0).min(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Deepest drawdown (a negative percent, or 0.0).
pub fn max_drawdown_pct(drawdowns: &[f64]) -> f64 {
    drawdowns.iter().copied().fold(0.0_f64, f64::min)
}

/// Mean drawdown over bars spent below a prior peak.
pub fn avg_drawdown_pct(drawdowns: &[f64]) -> f64 {
    let under: Vec<f64> = drawdowns.iter().copied().filter(|&d| d < 0.0).collect();
    mean_f64(&under)
}

/// Longest run of consecutive bars below a prior peak.
pub fn max_drawdown_duration(drawdowns: &[f64]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for &d in drawdowns {
        if d < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

// ─── Trade statistics ───────────────────────────────────────────────

/// Price return of one trade in percent, sign-adjusted for shorts.
pub fn trade_return_pct(entry_price: f64, exit_price: f64, is_long: bool) -> f64 {
    if entry_price <= 0.0 {
        return 0.0;
    }
    let raw = (exit_price / entry_price - 1.0) * 100.0;
    if is_long {
        raw
    } else {
        -raw
    }
}

/// Percentage of trades with positive net P&L.
pub fn win_rate_pct(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64 * 100.0
}

/// Gross net profits / gross net losses, capped at 100.0.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .map(Trade::net_pnl)
        .filter(|&p| p > 0.0)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .map(Trade::net_pnl)
        .filter(|&p| p < 0.0)
        .map(f64::abs)
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

pub fn avg_trade(trades: &[Trade]) -> f64 {
    let pnl: Vec<f64> = trades.iter().map(Trade::net_pnl).collect();
    mean_f64(&pnl)
}

pub fn avg_win(trades: &[Trade]) -> f64 {
    let wins: Vec<f64> = trades.iter().map(Trade::net_pnl).filter(|&p| p > 0.0).collect();
    mean_f64(&wins)
}

/// Mean of losing trades' net P&L (negative, or 0.0 without losers).
pub fn avg_loss(trades: &[Trade]) -> f64 {
    let losses: Vec<f64> = trades.iter().map(Trade::net_pnl).filter(|&p| p < 0.0).collect();
    mean_f64(&losses)
}

pub fn largest_win(trades: &[Trade]) -> f64 {
    trades.iter().map(Trade::net_pnl).fold(0.0_f64, f64::max)
}

pub fn largest_loss(trades: &[Trade]) -> f64 {
    trades.iter().map(Trade::net_pnl).fold(0.0_f64, f64::min)
}

/// Longest streak of winners (`winners = true`) or non-winners.
pub fn max_consecutive(trades: &[Trade], winners: bool) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple bar-over-bar returns. A non-positive base yields a 0.0 return.
pub fn period_returns(curve: &[f64]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Pearson correlation; `None` when undefined (fewer than 2 points or zero variance).
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean_f64(xs);
    let my = mean_f64(ys);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx < 1e-300 || vy < 1e-300 {
        return None;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
