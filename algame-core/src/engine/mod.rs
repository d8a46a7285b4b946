//! Simulation engine: configuration, the per-asset position state machine,
//! and the asset processor that drives it bar by bar.

pub mod cancel;
pub mod config;
pub mod position;
pub mod processor;

pub use cancel::CancelToken;
pub use config::{ConfigError, EngineConfig};
pub use position::Position;
pub use processor::{AssetProcessor, AssetRun, EquityPoint, ProcessError};
