//! Run configuration loaded from TOML.
//!
//! ```toml
//! [engine]
//! initial_capital = 50000.0
//! commission = 0.0005
//!
//! [runner]
//! workers = 4
//!
//! [backtest]
//! strategy = "sma_cross"
//! params = { fast = 10, slow = 50 }
//! ```

use std::path::{Path, PathBuf};

use algame_core::domain::ParamSet;
use algame_core::engine::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimizer::OptimizationSpec;
use crate::param_space::ParamSpaceError;
use crate::pool::{default_workers, PoolError, WorkerPool};
use crate::target::{TargetError, TargetMetric};

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid run config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid [engine] section: {0}")]
    Engine(#[from] ConfigError),

    #[error("invalid [optimize] section: {0}")]
    Space(#[from] ParamSpaceError),

    #[error("invalid [optimize] section: {0}")]
    Target(#[from] TargetError),

    #[error("[runner] workers must be at least 1")]
    ZeroWorkers,

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Worker pool and execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Thread count; `None` means the available cores.
    pub workers: Option<usize>,
    pub parallel: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            workers: None,
            parallel: true,
        }
    }
}

impl RunnerSettings {
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }
}

/// A single named-strategy backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSpec {
    pub strategy: String,
    #[serde(default)]
    pub params: ParamSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub backtest: Option<BacktestSpec>,
    #[serde(default)]
    pub optimize: Option<OptimizationSpec>,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, RunConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        self.engine.validate()?;
        if self.runner.workers == Some(0) {
            return Err(RunConfigError::ZeroWorkers);
        }
        if let Some(spec) = &self.optimize {
            spec.space.validate()?;
            spec.method.validate()?;
            TargetMetric::new(&spec.target)?;
        }
        Ok(())
    }

    pub fn build_pool(&self) -> Result<WorkerPool, RunConfigError> {
        Ok(WorkerPool::new(self.runner.effective_workers())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_space::SearchMethod;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.runner, RunnerSettings::default());
        assert!(config.backtest.is_none());
        assert!(config.optimize.is_none());
    }

    #[test]
    fn full_file_parses() {
        let text = r#"
            [engine]
            initial_capital = 50000.0
            commission = 0.0
            allow_short = true

            [runner]
            workers = 2
            parallel = false

            [backtest]
            strategy = "sma_cross"
            params = { fast = 5, slow = 20, size = 10.0 }

            [optimize]
            strategy = "sma_cross"
            target = "total_return_pct"
            method = { method = "grid", max_evaluations = 10 }

            [optimize.space]
            constraints = ["fast < slow"]

            [[optimize.space.axes]]
            name = "fast"
            values = [5, 10]

            [[optimize.space.axes]]
            name = "slow"
            min = 20.0
            max = 60.0
            steps = 3
            integer = true
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        assert_eq!(config.engine.initial_capital, 50_000.0);
        assert!(config.engine.allow_short);
        assert_eq!(config.engine.slippage, EngineConfig::default().slippage);
        assert_eq!(config.runner.effective_workers(), 2);
        assert!(!config.runner.parallel);

        let backtest = config.backtest.as_ref().unwrap();
        assert_eq!(backtest.params.get_i64("fast"), Some(5));
        assert_eq!(backtest.params.get_f64("size"), Some(10.0));

        let optimize = config.optimize.as_ref().unwrap();
        assert_eq!(
            optimize.method,
            SearchMethod::Grid {
                max_evaluations: Some(10)
            }
        );
        assert_eq!(optimize.space.grid_size(), 6);
        assert_eq!(config.build_pool().unwrap().workers(), 2);
    }

    #[test]
    fn invalid_sections_are_rejected() {
        assert!(matches!(
            RunConfig::from_toml_str("[engine]\ninitial_capital = -1.0"),
            Err(RunConfigError::Engine(_))
        ));
        assert!(matches!(
            RunConfig::from_toml_str("[runner]\nworkers = 0"),
            Err(RunConfigError::ZeroWorkers)
        ));
        assert!(matches!(
            RunConfig::from_toml_str("[engine\n"),
            Err(RunConfigError::Parse(_))
        ));

        let bad_target = r#"
            [optimize]
            strategy = "sma_cross"
            target = "alpha"
            [optimize.space]
            [[optimize.space.axes]]
            name = "fast"
            values = [5]
        "#;
        assert!(matches!(
            RunConfig::from_toml_str(bad_target),
            Err(RunConfigError::Target(_))
        ));

        let bad_constraint = r#"
            [optimize]
            strategy = "sma_cross"
            [optimize.space]
            constraints = ["fast < slow"]
            [[optimize.space.axes]]
            name = "fast"
            values = [5]
        "#;
        assert!(matches!(
            RunConfig::from_toml_str(bad_constraint),
            Err(RunConfigError::Space(ParamSpaceError::UnknownParameter { .. }))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\ncommission = 0.002").unwrap();
        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.commission, 0.002);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            RunConfig::load(&missing),
            Err(RunConfigError::Io { .. })
        ));
    }
}
