//! algame runner: multi-asset backtests and parameter optimization on top of
//! `algame-core`.
//!
//! - Orchestrator: validate, fan out one processor per asset, merge
//! - Parameter spaces: grid and random candidate generation with constraints
//! - Optimizer: one backtest per candidate, best selection, importance
//! - Shared worker pool, TOML run config, CSV bar loading

pub mod config;
pub mod data_loader;
pub mod optimizer;
pub mod orchestrator;
pub mod param_space;
pub mod pool;
pub mod result;
pub mod target;

pub use algame_core::engine::CancelToken;
pub use config::{BacktestSpec, RunConfig, RunConfigError, RunnerSettings};
pub use data_loader::{load_csv, load_dataset, LoadError};
pub use optimizer::{
    Evaluation, EvaluationOutcome, OptimizationResult, OptimizationSpec, OptimizeError, Optimizer,
};
pub use orchestrator::{validate_inputs, BacktestError, Dataset, Orchestrator};
pub use param_space::{
    Axis, CompareOp, Constraint, Operand, ParamAxis, ParamSpace, ParamSpaceError, SearchMethod,
};
pub use pool::{PoolError, WorkerPool};
pub use result::{AssetSummary, BacktestResult, EquitySample};
pub use target::{TargetError, TargetMetric};
