//! Backtest orchestrator: fan out one asset processor per symbol, fan in one
//! `BacktestResult`.
//!
//! Inputs are validated before any parallel work. Workers borrow the config
//! and bar slices and return owned `AssetRun`s; there is no shared mutable
//! state during simulation. Results are collected in symbol order regardless
//! of completion order.

use std::collections::{BTreeMap, BTreeSet};

use algame_core::domain::{validate_series, Bar, BarError, ParamSet};
use algame_core::engine::{
    AssetProcessor, AssetRun, CancelToken, ConfigError, EngineConfig, ProcessError,
};
use algame_core::metrics::{drawdown_series, PerformanceMetrics};
use algame_core::strategy::{RegistryError, Strategy, StrategyRegistry};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::pool::WorkerPool;
use crate::result::{AssetSummary, BacktestResult, EquitySample};

/// Bar series keyed by symbol.
pub type Dataset = BTreeMap<String, Vec<Bar>>;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid engine config: {0}")]
    Config(#[from] ConfigError),

    #[error("no assets to backtest")]
    NoAssets,

    #[error("invalid data for {symbol}: {source}")]
    Data {
        symbol: String,
        #[source]
        source: BarError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("asset {symbol} failed: {source}")]
    Asset {
        symbol: String,
        #[source]
        source: ProcessError,
    },

    #[error("backtest cancelled")]
    Cancelled,
}

/// Validate the engine config and every series. Reports the first problem.
pub fn validate_inputs(data: &Dataset, config: &EngineConfig) -> Result<(), BacktestError> {
    config.validate()?;
    if data.is_empty() {
        return Err(BacktestError::NoAssets);
    }
    for (symbol, bars) in data {
        validate_series(bars).map_err(|source| BacktestError::Data {
            symbol: symbol.clone(),
            source,
        })?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: StrategyRegistry,
    pool: WorkerPool,
    parallel: bool,
}

impl Orchestrator {
    pub fn new(registry: StrategyRegistry, pool: WorkerPool) -> Self {
        Self {
            registry,
            pool,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution across assets.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Build a registered strategy from `params` and backtest it.
    pub fn run_named(
        &self,
        strategy: &str,
        params: &ParamSet,
        data: &Dataset,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<BacktestResult, BacktestError> {
        validate_inputs(data, config)?;
        let strategy = self.registry.build(strategy, params)?;
        self.run_logged(strategy.as_ref(), data, config, cancel)
    }

    /// Backtest a strategy object across every asset in `data`.
    pub fn run(
        &self,
        strategy: &dyn Strategy,
        data: &Dataset,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<BacktestResult, BacktestError> {
        validate_inputs(data, config)?;
        self.run_logged(strategy, data, config, cancel)
    }

    fn run_logged(
        &self,
        strategy: &dyn Strategy,
        data: &Dataset,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<BacktestResult, BacktestError> {
        info!(
            strategy = strategy.name(),
            assets = data.len(),
            workers = self.pool.workers(),
            "backtest started"
        );
        let result = self
            .pool
            .install(|| self.run_validated(strategy, data, config, cancel))?;
        info!(
            trades = result.trades.len(),
            final_equity = result.final_equity(),
            total_return_pct = result.metrics.total_return_pct,
            "backtest finished"
        );
        Ok(result)
    }

    /// Simulate already-validated inputs. Must be called inside the pool.
    pub(crate) fn run_validated(
        &self,
        strategy: &dyn Strategy,
        data: &Dataset,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<BacktestResult, BacktestError> {
        let assets: Vec<(&str, &[Bar])> = data
            .iter()
            .map(|(symbol, bars)| (symbol.as_str(), bars.as_slice()))
            .collect();

        let simulate = |(symbol, bars): &(&str, &[Bar])| {
            AssetProcessor::new(symbol, bars, config, strategy).run(cancel)
        };
        let outcomes: Vec<Result<AssetRun, ProcessError>> = if self.parallel {
            assets.par_iter().map(simulate).collect()
        } else {
            assets.iter().map(simulate).collect()
        };

        if cancel.is_cancelled() {
            return Err(BacktestError::Cancelled);
        }

        let mut runs = Vec::with_capacity(outcomes.len());
        for ((symbol, _), outcome) in assets.iter().zip(outcomes) {
            match outcome {
                Ok(run) => runs.push(run),
                Err(ProcessError::Cancelled { .. }) => return Err(BacktestError::Cancelled),
                Err(source) => {
                    return Err(BacktestError::Asset {
                        symbol: symbol.to_string(),
                        source,
                    })
                }
            }
        }
        debug!(assets = runs.len(), "fan-in");
        combine(strategy.name(), runs, config)
    }
}

// ─── Fan-in ──────────────────────────────────────────────────────────

/// Per-asset cursor for the outer join.
struct Carry<'a> {
    run: &'a AssetRun,
    next: usize,
    equity: f64,
    notional: f64,
}

/// Merge asset runs into one result.
///
/// Equity is outer-joined on timestamp and summed; an asset without a point at
/// a timestamp contributes its last known equity (initial capital before its
/// first bar). Notional is carried the same way, zero before the first bar.
pub fn combine(
    strategy: &str,
    runs: Vec<AssetRun>,
    config: &EngineConfig,
) -> Result<BacktestResult, BacktestError> {
    let timestamps: BTreeSet<NaiveDateTime> = runs
        .iter()
        .flat_map(|run| run.points.iter().map(|p| p.timestamp))
        .collect();
    let (Some(&start), Some(&end)) = (timestamps.first(), timestamps.last()) else {
        return Err(BacktestError::NoAssets);
    };

    let mut equity_curve = Vec::with_capacity(timestamps.len());
    let mut exposure = Vec::with_capacity(timestamps.len());
    {
        let mut carries: Vec<Carry<'_>> = runs
            .iter()
            .map(|run| Carry {
                run,
                next: 0,
                equity: config.initial_capital,
                notional: 0.0,
            })
            .collect();

        for &ts in &timestamps {
            let mut equity = 0.0;
            let mut notional = 0.0;
            for carry in &mut carries {
                while let Some(point) = carry.run.points.get(carry.next) {
                    if point.timestamp > ts {
                        break;
                    }
                    carry.equity = point.equity;
                    carry.notional = point.notional;
                    carry.next += 1;
                }
                equity += carry.equity;
                notional += carry.notional;
            }
            equity_curve.push(EquitySample {
                timestamp: ts,
                equity,
            });
            exposure.push(if equity > 0.0 { notional / equity } else { 0.0 });
        }
    }

    let starting_capital = config.initial_capital * runs.len() as f64;
    let assets: Vec<AssetSummary> = runs
        .iter()
        .map(|run| AssetSummary::from_run(run, config.initial_capital))
        .collect();

    let mut trades: Vec<_> = runs.into_iter().flat_map(|run| run.trades).collect();
    trades.sort_by(|a, b| {
        a.entry_time
            .cmp(&b.entry_time)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let values: Vec<f64> = equity_curve.iter().map(|s| s.equity).collect();
    let metrics = PerformanceMetrics::compute(starting_capital, &values, &trades, &exposure);
    let drawdowns = drawdown_series(&values, starting_capital);

    Ok(BacktestResult {
        strategy: strategy.to_string(),
        equity_curve,
        trades,
        metrics,
        drawdowns,
        exposure,
        assets,
        start,
        end,
        config: config.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use algame_core::engine::EquityPoint;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn asset_run(symbol: &str, points: &[(u32, f64, f64)]) -> AssetRun {
        AssetRun {
            symbol: symbol.to_string(),
            points: points
                .iter()
                .map(|&(day, equity, notional)| EquityPoint {
                    timestamp: ts(day),
                    equity,
                    notional,
                })
                .collect(),
            trades: Vec::new(),
            bars_processed: points.len(),
            strategy_errors: 0,
            rejected_orders: 0,
        }
    }

    fn config(capital: f64) -> EngineConfig {
        EngineConfig {
            initial_capital: capital,
            ..EngineConfig::frictionless()
        }
    }

    #[test]
    fn single_asset_is_identity() {
        let run = asset_run("A", &[(1, 100.0, 0.0), (2, 110.0, 50.0), (3, 90.0, 0.0)]);
        let result = combine("s", vec![run], &config(100.0)).unwrap();
        assert_eq!(result.equity_values(), vec![100.0, 110.0, 90.0]);
        assert_eq!(result.start, ts(1));
        assert_eq!(result.end, ts(3));
        assert!((result.exposure[1] - 50.0 / 110.0).abs() < 1e-12);
    }

    #[test]
    fn missing_timestamps_forward_fill_from_initial_capital() {
        let a = asset_run("A", &[(1, 101.0, 10.0), (3, 103.0, 10.0)]);
        let b = asset_run("B", &[(2, 95.0, 20.0), (3, 96.0, 0.0)]);
        let result = combine("s", vec![a, b], &config(100.0)).unwrap();

        // day 1: A=101, B not started -> 100
        // day 2: A carries 101, B=95
        // day 3: A=103, B=96
        assert_eq!(result.equity_values(), vec![201.0, 196.0, 199.0]);
        assert!((result.exposure[0] - 10.0 / 201.0).abs() < 1e-12);
        assert!((result.exposure[1] - 30.0 / 196.0).abs() < 1e-12);
        assert_eq!(result.starting_capital(), 200.0);
        assert_eq!(result.drawdowns.len(), 3);
    }

    #[test]
    fn duplicate_timestamps_take_last_point() {
        let a = asset_run("A", &[(1, 100.0, 0.0), (1, 105.0, 0.0), (2, 107.0, 0.0)]);
        let result = combine("s", vec![a], &config(100.0)).unwrap();
        assert_eq!(result.equity_values(), vec![105.0, 107.0]);
    }

    #[test]
    fn no_points_is_an_error() {
        assert!(matches!(
            combine("s", Vec::new(), &config(100.0)),
            Err(BacktestError::NoAssets)
        ));
    }

    #[test]
    fn validation_reports_symbol() {
        let mut data = Dataset::new();
        data.insert("GOOD".into(), vec![Bar::new(ts(1), 1.0, 1.0, 1.0, 1.0, 0)]);
        data.insert("BAD".into(), Vec::new());
        match validate_inputs(&data, &EngineConfig::default()) {
            Err(BacktestError::Data { symbol, source }) => {
                assert_eq!(symbol, "BAD");
                assert_eq!(source, BarError::EmptySeries);
            }
            other => panic!("expected data error, got {other:?}"),
        }
        assert!(matches!(
            validate_inputs(&Dataset::new(), &EngineConfig::default()),
            Err(BacktestError::NoAssets)
        ));
    }
}
