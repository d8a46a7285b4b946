//! Asset processor: one asset's bar-by-bar simulation.
//!
//! Per bar, in order:
//! 1. evaluate protective exits and previously pending orders at the close
//! 2. ask the strategy for signals on `bars[..=i]`
//! 3. turn signals into orders, submit them and evaluate them at the same close
//! 4. record equity and notional exposure at the close
//!
//! Strategy errors and rejected orders are logged and counted, never fatal.
//! The open position is force-closed on the last bar.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::cancel::CancelToken;
use super::config::EngineConfig;
use super::position::Position;
use crate::domain::{validate_series, Bar, BarError, Order, OrderSide, Signal, SignalAction, Trade};
use crate::strategy::Strategy;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessError {
    #[error("invalid bar data for {symbol}: {source}")]
    Data {
        symbol: String,
        #[source]
        source: BarError,
    },

    #[error("equity for {symbol} became non-finite at bar {index} ({timestamp})")]
    NonFiniteEquity {
        symbol: String,
        index: usize,
        timestamp: NaiveDateTime,
    },

    #[error("processing of {symbol} was cancelled")]
    Cancelled { symbol: String },
}

/// Equity and gross notional exposure at one bar's close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    pub notional: f64,
}

/// Everything one asset produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRun {
    pub symbol: String,
    pub points: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub bars_processed: usize,
    pub strategy_errors: usize,
    pub rejected_orders: usize,
}

impl AssetRun {
    pub fn final_equity(&self) -> Option<f64> {
        self.points.last().map(|p| p.equity)
    }
}

/// Drives one asset. Borrows everything; owns only its `Position`.
pub struct AssetProcessor<'a> {
    symbol: &'a str,
    bars: &'a [Bar],
    config: &'a EngineConfig,
    strategy: &'a dyn Strategy,
}

impl<'a> AssetProcessor<'a> {
    pub fn new(
        symbol: &'a str,
        bars: &'a [Bar],
        config: &'a EngineConfig,
        strategy: &'a dyn Strategy,
    ) -> Self {
        Self {
            symbol,
            bars,
            config,
            strategy,
        }
    }

    pub fn run(&self, cancel: &CancelToken) -> Result<AssetRun, ProcessError> {
        validate_series(self.bars).map_err(|source| ProcessError::Data {
            symbol: self.symbol.to_string(),
            source,
        })?;

        let mut position = Position::new(self.symbol);
        let mut points = Vec::with_capacity(self.bars.len());
        let mut strategy_errors = 0;
        let mut rejected_orders = 0;

        for (index, bar) in self.bars.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(symbol = self.symbol, bar = index, "asset processing cancelled");
                return Err(ProcessError::Cancelled {
                    symbol: self.symbol.to_string(),
                });
            }

            position.evaluate(bar.close, bar.timestamp, self.config);

            match self.strategy.next(&self.bars[..=index]) {
                Ok(signals) => {
                    for signal in &signals {
                        let Some(order) = order_for(&position, signal, bar.timestamp) else {
                            continue;
                        };
                        match position.submit(order) {
                            Ok(_) => {
                                position.fill_pending(bar.close, bar.timestamp, self.config);
                            }
                            Err(err) => {
                                rejected_orders += 1;
                                warn!(
                                    symbol = self.symbol,
                                    bar = index,
                                    error = %err,
                                    "order from strategy signal rejected"
                                );
                            }
                        }
                    }
                }
                Err(err) => {
                    strategy_errors += 1;
                    warn!(
                        symbol = self.symbol,
                        bar = index,
                        strategy = self.strategy.name(),
                        error = %err,
                        "strategy failed on bar; treating as no signal"
                    );
                }
            }

            let equity = position.equity(bar.close, self.config.initial_capital);
            if !equity.is_finite() {
                return Err(ProcessError::NonFiniteEquity {
                    symbol: self.symbol.to_string(),
                    index,
                    timestamp: bar.timestamp,
                });
            }
            points.push(EquityPoint {
                timestamp: bar.timestamp,
                equity,
                notional: position.notional(bar.close),
            });
        }

        // validate_series guarantees at least one bar.
        if let (Some(last_bar), Some(last_point)) = (self.bars.last(), points.last_mut()) {
            if position.close(last_bar.close, last_bar.timestamp, self.config).is_some() {
                debug!(symbol = self.symbol, "open position closed at end of data");
            }
            last_point.equity = position.equity(last_bar.close, self.config.initial_capital);
            last_point.notional = 0.0;
        }

        Ok(AssetRun {
            symbol: self.symbol.to_string(),
            points,
            trades: position.into_trades(),
            bars_processed: self.bars.len(),
            strategy_errors,
            rejected_orders,
        })
    }
}

/// Translate a signal into an order against the current position.
///
/// `Close` becomes an opposite-side order for the full size, or nothing when flat.
fn order_for(position: &Position, signal: &Signal, timestamp: NaiveDateTime) -> Option<Order> {
    let (side, size) = match signal.action {
        SignalAction::Buy => (OrderSide::Buy, signal.size),
        SignalAction::Sell => (OrderSide::Sell, signal.size),
        SignalAction::Close if position.is_long() => (OrderSide::Sell, position.size()),
        SignalAction::Close if position.is_short() => (OrderSide::Buy, -position.size()),
        SignalAction::Close => return None,
    };

    let mut order = Order::market(side, size, timestamp);
    order.limit = signal.limit;
    order.stop = signal.stop;
    if signal.action != SignalAction::Close {
        order.stop_loss = signal.stop_loss;
        order.take_profit = signal.take_profit;
    }
    Some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExitReason;
    use crate::strategy::{BuyAndHold, StrategyError};
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64);
                Bar::new(ts, c, c + 1.0, c - 1.0, c, 1_000)
            })
            .collect()
    }

    struct Failing;

    impl Strategy for Failing {
        fn next(&self, history: &[Bar]) -> Result<Vec<Signal>, StrategyError> {
            if history.len() % 2 == 0 {
                Err(StrategyError::Evaluation("boom".into()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    struct BadOrders;

    impl Strategy for BadOrders {
        fn next(&self, _history: &[Bar]) -> Result<Vec<Signal>, StrategyError> {
            Ok(vec![Signal::buy(-1.0)])
        }
    }

    #[test]
    fn buy_and_hold_scenario() {
        let bars = make_bars(&[100.0, 101.0, 99.0, 102.0, 98.0]);
        let config = EngineConfig::frictionless();
        let strategy = BuyAndHold::new(1.0);
        let run = AssetProcessor::new("SPY", &bars, &config, &strategy)
            .run(&CancelToken::new())
            .unwrap();

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.exit_price, 98.0);
        assert!((trade.pnl + 2.0).abs() < 1e-10);
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);

        assert_eq!(run.points.len(), 5);
        assert!((run.points[1].equity - 100_001.0).abs() < 1e-9);
        assert!((run.final_equity().unwrap() - 99_998.0).abs() < 1e-9);
        assert_eq!(run.points[4].notional, 0.0);
        assert!((run.points[0].notional - 100.0).abs() < 1e-10);
    }

    #[test]
    fn stop_loss_scenario() {
        let bars = make_bars(&[100.0, 101.0, 99.0, 102.0, 98.0]);
        let config = EngineConfig::frictionless();
        let strategy = BuyAndHold::new(1.0).with_stop_loss(99.0);
        let run = AssetProcessor::new("SPY", &bars, &config, &strategy)
            .run(&CancelToken::new())
            .unwrap();

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_time, bars[2].timestamp);
        assert!((trade.pnl + 1.0).abs() < 1e-10);
        assert!((run.final_equity().unwrap() - 99_999.0).abs() < 1e-9);
    }

    #[test]
    fn strategy_errors_are_counted_not_fatal() {
        let bars = make_bars(&[100.0, 101.0, 102.0, 103.0]);
        let config = EngineConfig::default();
        let run = AssetProcessor::new("SPY", &bars, &config, &Failing)
            .run(&CancelToken::new())
            .unwrap();
        assert_eq!(run.strategy_errors, 2);
        assert_eq!(run.bars_processed, 4);
        assert!(run.trades.is_empty());
    }

    #[test]
    fn invalid_orders_are_counted() {
        let bars = make_bars(&[100.0, 101.0]);
        let config = EngineConfig::default();
        let run = AssetProcessor::new("SPY", &bars, &config, &BadOrders)
            .run(&CancelToken::new())
            .unwrap();
        assert_eq!(run.rejected_orders, 2);
        assert_eq!(run.final_equity(), Some(config.initial_capital));
    }

    #[test]
    fn invalid_series_rejected() {
        let config = EngineConfig::default();
        let err = AssetProcessor::new("SPY", &[], &config, &Failing)
            .run(&CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ProcessError::Data { .. }));
    }

    #[test]
    fn cancelled_token_stops_processing() {
        let bars = make_bars(&[100.0, 101.0]);
        let config = EngineConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = AssetProcessor::new("SPY", &bars, &config, &BuyAndHold::new(1.0))
            .run(&cancel)
            .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));
    }

    #[test]
    fn close_signal_when_flat_is_ignored() {
        struct CloseOnly;
        impl Strategy for CloseOnly {
            fn next(&self, _history: &[Bar]) -> Result<Vec<Signal>, StrategyError> {
                Ok(vec![Signal::close()])
            }
        }
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        let config = EngineConfig::default();
        let run = AssetProcessor::new("SPY", &bars, &config, &CloseOnly)
            .run(&CancelToken::new())
            .unwrap();
        assert_eq!(run.rejected_orders, 0);
        assert!(run.trades.is_empty());
    }
}
