//! algame CLI: backtest and optimize over CSV bar files.
//!
//! Commands:
//! - `backtest` runs one strategy across every file, one asset per file
//! - `optimize` searches a parameter space described in a TOML run file
//! - `strategies` lists the registered strategy names
//!
//! Results are printed to stdout as JSON. Logs go to stderr (`RUST_LOG`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use algame_core::domain::{ParamSet, ParamValue};
use algame_core::strategy::StrategyRegistry;
use algame_runner::{
    load_dataset, CancelToken, OptimizationSpec, Optimizer, Orchestrator, RunConfig, SearchMethod,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "algame", about = "algame: backtesting and parameter optimization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one strategy over one or more CSV files.
    Backtest {
        /// Bar files, one symbol per file (symbol = file stem).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// TOML run file ([engine], [runner], [backtest]).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Strategy name. Overrides [backtest].strategy.
        #[arg(long)]
        strategy: Option<String>,

        /// Strategy parameter as name=value. Repeatable; overrides [backtest].params.
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Worker threads. Overrides [runner].workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Write JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Optimize strategy parameters described by the [optimize] section.
    Optimize {
        /// Bar files, one symbol per file (symbol = file stem).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// TOML run file with an [optimize] section.
        #[arg(long)]
        config: PathBuf,

        /// Target metric. Overrides [optimize].target.
        #[arg(long)]
        target: Option<String>,

        /// Master seed. Overrides [optimize].seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Random search with this many draws instead of the configured method.
        #[arg(long)]
        random: Option<usize>,

        /// Worker threads. Overrides [runner].workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Write JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List registered strategies.
    Strategies,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            files,
            config,
            strategy,
            params,
            workers,
            output,
        } => run_backtest(&files, config.as_deref(), strategy, &params, workers, output.as_deref()),
        Commands::Optimize {
            files,
            config,
            target,
            seed,
            random,
            workers,
            output,
        } => run_optimize(&files, &config, target, seed, random, workers, output.as_deref()),
        Commands::Strategies => {
            for name in StrategyRegistry::with_builtin().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_run_config(path: Option<&Path>, workers: Option<usize>) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("loading run config {}", path.display()))?,
        None => RunConfig::default(),
    };
    if workers.is_some() {
        config.runner.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn orchestrator(config: &RunConfig) -> Result<Orchestrator> {
    let pool = config.build_pool()?;
    Ok(Orchestrator::new(StrategyRegistry::with_builtin(), pool)
        .with_parallelism(config.runner.parallel))
}

fn run_backtest(
    files: &[PathBuf],
    config_path: Option<&Path>,
    strategy: Option<String>,
    raw_params: &[String],
    workers: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_run_config(config_path, workers)?;
    let (configured_name, mut params) = match &config.backtest {
        Some(spec) => (Some(spec.strategy.clone()), spec.params.clone()),
        None => (None, ParamSet::new()),
    };
    let Some(name) = strategy.or(configured_name) else {
        bail!("no strategy given: pass --strategy or add a [backtest] section");
    };
    for raw in raw_params {
        let (key, value) = parse_param(raw)?;
        params.insert(key, value);
    }

    let data = load_dataset(files)?;
    let result = orchestrator(&config)?.run_named(
        &name,
        &params,
        &data,
        &config.engine,
        &CancelToken::new(),
    )?;

    info!(
        strategy = %name,
        params = %params,
        trades = result.metrics.trade_count,
        total_return_pct = result.metrics.total_return_pct,
        sharpe = result.metrics.sharpe_ratio,
        max_drawdown_pct = result.metrics.max_drawdown_pct,
        "backtest summary"
    );
    write_json(&result, output)
}

fn run_optimize(
    files: &[PathBuf],
    config_path: &Path,
    target: Option<String>,
    seed: Option<u64>,
    random: Option<usize>,
    workers: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_run_config(Some(config_path), workers)?;
    let Some(mut spec): Option<OptimizationSpec> = config.optimize.clone() else {
        bail!("{} has no [optimize] section", config_path.display());
    };
    if let Some(target) = target {
        spec.target = target;
    }
    if let Some(seed) = seed {
        spec.seed = seed;
    }
    if let Some(max_evaluations) = random {
        spec.method = SearchMethod::Random { max_evaluations };
    }

    let data = load_dataset(files)?;
    let optimizer = Optimizer::new(orchestrator(&config)?);
    let result = optimizer.optimize(&spec, &data, &config.engine, &CancelToken::new())?;

    info!(
        strategy = %result.strategy,
        target = %result.target,
        best = %result.best_params,
        value = result.best_value,
        attempted = result.attempted,
        failed = result.failed,
        "optimization summary"
    );
    write_json(&result, output)
}

/// `name=value`; integers stay integers.
fn parse_param(raw: &str) -> Result<(String, ParamValue)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("parameter '{raw}' is not of the form NAME=VALUE");
    };
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        bail!("parameter '{raw}' has an empty name");
    }
    if let Ok(v) = value.parse::<i64>() {
        return Ok((name.to_string(), ParamValue::Int(v)));
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok((name.to_string(), ParamValue::Float(v))),
        _ => bail!("parameter '{name}' has a non-numeric value '{value}'"),
    }
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!(path = %path.display(), "results written");
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_keep_integer_type() {
        assert_eq!(
            parse_param("fast=10").unwrap(),
            ("fast".to_string(), ParamValue::Int(10))
        );
        assert_eq!(
            parse_param(" size = 2.5 ").unwrap(),
            ("size".to_string(), ParamValue::Float(2.5))
        );
        assert!(parse_param("fast").is_err());
        assert!(parse_param("=3").is_err());
        assert!(parse_param("fast=abc").is_err());
        assert!(parse_param("fast=inf").is_err());
    }

    #[test]
    fn cli_parses_backtest() {
        let cli = Cli::try_parse_from([
            "algame",
            "backtest",
            "SPY.csv",
            "QQQ.csv",
            "--strategy",
            "sma_cross",
            "--param",
            "fast=5",
            "--param",
            "slow=20",
        ])
        .unwrap();
        match cli.command {
            Commands::Backtest {
                files,
                strategy,
                params,
                ..
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(strategy.as_deref(), Some("sma_cross"));
                assert_eq!(params, vec!["fast=5", "slow=20"]);
            }
            _ => panic!("expected backtest"),
        }
    }

    #[test]
    fn optimize_requires_config() {
        assert!(Cli::try_parse_from(["algame", "optimize", "SPY.csv"]).is_err());
    }
}
