//! algame core: domain types, the position state machine, the asset
//! processor, strategies and performance metrics.
//!
//! - Domain types (bars, orders, fills, trades, signals, parameter sets)
//! - Per-asset position/order/trade state machine with stop-loss and
//!   take-profit precedence
//! - Bar-by-bar asset processor
//! - Strategy trait, factories and an explicit registry
//! - Pure metric functions over equity curves and trade lists

pub mod domain;
pub mod engine;
pub mod metrics;
pub mod rng;
pub mod strategy;

pub use domain::{Bar, ParamSet, ParamValue, Signal, Trade};
pub use engine::{AssetProcessor, AssetRun, CancelToken, EngineConfig, Position};
pub use metrics::PerformanceMetrics;
pub use strategy::{Strategy, StrategyError, StrategyFactory, StrategyRegistry};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything handed to worker threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::ParamSet>();
        require_sync::<domain::ParamSet>();

        require_send::<EngineConfig>();
        require_sync::<EngineConfig>();
        require_send::<Position>();
        require_sync::<Position>();
        require_send::<AssetRun>();
        require_sync::<AssetRun>();
        require_send::<CancelToken>();
        require_sync::<CancelToken>();

        require_send::<Box<dyn Strategy>>();
        require_sync::<Box<dyn Strategy>>();
        require_send::<StrategyRegistry>();
        require_sync::<StrategyRegistry>();
        require_send::<PerformanceMetrics>();
        require_sync::<PerformanceMetrics>();
    }
}
