//! End-to-end engine scenarios through the public API.

use algame_core::domain::{Bar, ExitReason, ParamSet, Signal};
use algame_core::engine::{AssetProcessor, CancelToken, EngineConfig};
use algame_core::metrics::{drawdown_series, PerformanceMetrics};
use algame_core::strategy::{Strategy, StrategyError, StrategyRegistry};
use chrono::{Duration, NaiveDate};

fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(start + Duration::days(i as i64), c, c + 1.0, c - 1.0, c, 10_000))
        .collect()
}

fn run(strategy: &dyn Strategy, closes: &[f64], config: &EngineConfig) -> algame_core::AssetRun {
    let bars = make_bars(closes);
    AssetProcessor::new("TEST", &bars, config, strategy)
        .run(&CancelToken::new())
        .unwrap()
}

// ── Reference scenarios ──

#[test]
fn buy_at_first_bar_held_to_end() {
    let registry = StrategyRegistry::with_builtin();
    let strategy = registry
        .build("buy_and_hold", &ParamSet::new().with("size", 1.0))
        .unwrap();
    let result = run(
        strategy.as_ref(),
        &[100.0, 101.0, 99.0, 102.0, 98.0],
        &EngineConfig::frictionless(),
    );

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.entry_price, 100.0);
    assert_eq!(trade.exit_price, 98.0);
    assert!((trade.pnl - (-2.0)).abs() < 1e-10);
}

#[test]
fn stop_loss_exits_on_third_bar() {
    let registry = StrategyRegistry::with_builtin();
    let params = ParamSet::new().with("size", 1.0).with("stop_loss", 99.0);
    let strategy = registry.build("buy_and_hold", &params).unwrap();
    let result = run(
        strategy.as_ref(),
        &[100.0, 101.0, 99.0, 102.0, 98.0],
        &EngineConfig::frictionless(),
    );

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, 99.0);
    assert!((trade.pnl - (-1.0)).abs() < 1e-10);
}

#[test]
fn take_profit_before_new_entry_on_same_bar() {
    /// Enters on bar 0 with a target, then asks to buy again on every bar.
    struct Pyramid;
    impl Strategy for Pyramid {
        fn next(&self, history: &[Bar]) -> Result<Vec<Signal>, StrategyError> {
            if history.len() == 1 {
                Ok(vec![Signal::buy(1.0).with_take_profit(105.0)])
            } else {
                Ok(vec![Signal::buy(1.0)])
            }
        }
    }

    let result = run(&Pyramid, &[100.0, 103.0, 106.0], &EngineConfig::frictionless());
    // Bar 2: the 2-unit position hits its target first, then the new buy opens.
    assert_eq!(result.trades.len(), 2);
    assert_eq!(result.trades[0].exit_reason, ExitReason::TakeProfit);
    assert!((result.trades[0].size - 2.0).abs() < 1e-10);
    assert_eq!(result.trades[1].exit_reason, ExitReason::EndOfData);
}

// ── Costs ──

#[test]
fn commission_reduces_final_equity() {
    let registry = StrategyRegistry::with_builtin();
    let strategy = registry.build("buy_and_hold", &ParamSet::new()).unwrap();
    let config = EngineConfig {
        commission: 0.001,
        ..EngineConfig::frictionless()
    };
    let result = run(strategy.as_ref(), &[100.0, 110.0], &config);
    let fees = 100.0 * 0.001 + 110.0 * 0.001;
    let expected = config.initial_capital + 10.0 - fees;
    assert!((result.final_equity().unwrap() - expected).abs() < 1e-9);
    assert!((result.trades[0].fees - fees).abs() < 1e-12);
}

// ── Strategies end to end ──

#[test]
fn sma_cross_trades_a_v_shape() {
    let mut closes: Vec<f64> = (0..20).map(|i| 120.0 - i as f64).collect();
    closes.extend((0..20).map(|i| 101.0 + 2.0 * i as f64));
    closes.extend((0..20).map(|i| 140.0 - 3.0 * i as f64));

    let registry = StrategyRegistry::with_builtin();
    let params = ParamSet::new().with("fast", 3i64).with("slow", 8i64).with("size", 10.0);
    let strategy = registry.build("sma_cross", &params).unwrap();
    let result = run(strategy.as_ref(), &closes, &EngineConfig::default());

    assert!(!result.trades.is_empty());
    assert!(result.trades.iter().all(|t| t.is_long));
    assert_eq!(result.trades[0].exit_reason, ExitReason::Signal);

    let equity: Vec<f64> = result.points.iter().map(|p| p.equity).collect();
    let metrics = PerformanceMetrics::compute(100_000.0, &equity, &result.trades, &[]);
    assert_eq!(metrics.trade_count, result.trades.len());
    assert!(drawdown_series(&equity, 100_000.0).iter().all(|d| *d <= 0.0));
}
