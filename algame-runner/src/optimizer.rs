//! Optimization coordinator: one backtest per candidate parameter set.
//!
//! Candidates come from a `ParamSpace`. Every set is evaluated inside the
//! shared worker pool, so the per-set asset fan-out nests within the same
//! thread budget. Failed sets stay in the table but never win.

use std::collections::BTreeMap;

use algame_core::domain::ParamSet;
use algame_core::engine::{CancelToken, EngineConfig};
use algame_core::metrics::{pearson_correlation, PerformanceMetrics};
use algame_core::strategy::{RegistryError, StrategyFactory};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::orchestrator::{validate_inputs, BacktestError, Dataset, Orchestrator};
use crate::param_space::{ParamSpace, ParamSpaceError, SearchMethod};
use crate::target::{TargetError, TargetMetric};

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("invalid parameter space: {0}")]
    Space(#[from] ParamSpaceError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),

    #[error("parameter space produced no candidates after constraints")]
    NoCandidates,

    #[error("no evaluation succeeded ({failed} of {attempted} failed)")]
    NoSuccessfulEvaluation { attempted: usize, failed: usize },

    #[error("optimization cancelled")]
    Cancelled,
}

/// What to optimize and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSpec {
    /// Registered strategy name.
    pub strategy: String,
    pub space: ParamSpace,
    #[serde(default)]
    pub method: SearchMethod,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default)]
    pub seed: u64,
}

fn default_target() -> String {
    TargetMetric::default().name().to_string()
}

impl OptimizationSpec {
    pub fn new(strategy: impl Into<String>, space: ParamSpace) -> Self {
        Self {
            strategy: strategy.into(),
            space,
            method: SearchMethod::default(),
            target: default_target(),
            seed: 0,
        }
    }

    pub fn with_method(mut self, method: SearchMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Succeeded {
        metrics: PerformanceMetrics,
        value: f64,
    },
    Failed {
        error: String,
    },
}

/// One row of the optimization table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Position in enumeration order.
    pub index: usize,
    pub params: ParamSet,
    pub fingerprint: String,
    pub outcome: EvaluationOutcome,
}

impl Evaluation {
    pub fn value(&self) -> Option<f64> {
        match &self.outcome {
            EvaluationOutcome::Succeeded { value, .. } => Some(*value),
            EvaluationOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub strategy: String,
    pub target: String,
    pub best_index: usize,
    pub best_params: ParamSet,
    pub best_metrics: PerformanceMetrics,
    pub best_value: f64,
    /// Every evaluation, in enumeration order.
    pub evaluations: Vec<Evaluation>,
    /// Parameter name → share of the 100 importance points.
    pub importance: BTreeMap<String, f64>,
    pub attempted: usize,
    pub failed: usize,
}

impl OptimizationResult {
    /// Successful evaluations by descending target value, ties in enumeration order.
    pub fn ranked(&self) -> Vec<&Evaluation> {
        let mut ranked: Vec<&Evaluation> = self
            .evaluations
            .iter()
            .filter(|e| e.value().is_some_and(f64::is_finite))
            .collect();
        ranked.sort_by(|a, b| {
            let (va, vb) = (a.value().unwrap_or(0.0), b.value().unwrap_or(0.0));
            vb.total_cmp(&va).then_with(|| a.index.cmp(&b.index))
        });
        ranked
    }
}

#[derive(Debug, Clone)]
pub struct Optimizer {
    orchestrator: Orchestrator,
}

impl Optimizer {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Optimize a strategy from the orchestrator's registry.
    pub fn optimize(
        &self,
        spec: &OptimizationSpec,
        data: &Dataset,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<OptimizationResult, OptimizeError> {
        let factory = self.orchestrator.registry().get(&spec.strategy)?;
        self.optimize_with(factory.as_ref(), spec, data, config, cancel)
    }

    /// Optimize with an explicit factory. `spec.strategy` is used as a label only.
    pub fn optimize_with(
        &self,
        factory: &dyn StrategyFactory,
        spec: &OptimizationSpec,
        data: &Dataset,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<OptimizationResult, OptimizeError> {
        let candidates = spec.space.generate(&spec.method, spec.seed)?;
        let target = TargetMetric::new(&spec.target)?;
        validate_inputs(data, config)?;
        if candidates.is_empty() {
            return Err(OptimizeError::NoCandidates);
        }

        info!(
            strategy = %spec.strategy,
            target = target.name(),
            candidates = candidates.len(),
            workers = self.orchestrator.pool().workers(),
            "optimization started"
        );

        let evaluate = |(index, params): (usize, &ParamSet)| {
            self.evaluate(index, params, factory, target, data, config, cancel)
        };
        let evaluations: Vec<Evaluation> = self.orchestrator.pool().install(|| {
            if self.orchestrator.is_parallel() {
                candidates.par_iter().enumerate().map(evaluate).collect()
            } else {
                candidates.iter().enumerate().map(evaluate).collect()
            }
        });

        if cancel.is_cancelled() {
            return Err(OptimizeError::Cancelled);
        }

        let attempted = evaluations.len();
        let failed = evaluations.iter().filter(|e| !e.is_success()).count();

        let mut best: Option<(usize, f64)> = None;
        for (pos, evaluation) in evaluations.iter().enumerate() {
            if let Some(value) = evaluation.value().filter(|v| v.is_finite()) {
                if best.map_or(true, |(_, best_value)| value > best_value) {
                    best = Some((pos, value));
                }
            }
        }
        let Some((best_pos, best_value)) = best else {
            return Err(OptimizeError::NoSuccessfulEvaluation { attempted, failed });
        };
        let winner = &evaluations[best_pos];
        let EvaluationOutcome::Succeeded { metrics, .. } = &winner.outcome else {
            return Err(OptimizeError::NoSuccessfulEvaluation { attempted, failed });
        };

        let importance = parameter_importance(&spec.space, &evaluations);

        info!(
            best = %winner.params,
            value = best_value,
            attempted,
            failed,
            "optimization finished"
        );

        Ok(OptimizationResult {
            strategy: spec.strategy.clone(),
            target: target.name().to_string(),
            best_index: winner.index,
            best_params: winner.params.clone(),
            best_metrics: metrics.clone(),
            best_value,
            importance,
            attempted,
            failed,
            evaluations,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        index: usize,
        params: &ParamSet,
        factory: &dyn StrategyFactory,
        target: TargetMetric,
        data: &Dataset,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Evaluation {
        let outcome = if cancel.is_cancelled() {
            EvaluationOutcome::Failed {
                error: BacktestError::Cancelled.to_string(),
            }
        } else {
            match factory.build(params) {
                Err(err) => EvaluationOutcome::Failed {
                    error: format!("strategy construction failed: {err}"),
                },
                Ok(strategy) => {
                    match self
                        .orchestrator
                        .run_validated(strategy.as_ref(), data, config, cancel)
                    {
                        Ok(result) => EvaluationOutcome::Succeeded {
                            value: target.extract(&result.metrics),
                            metrics: result.metrics,
                        },
                        Err(err) => EvaluationOutcome::Failed {
                            error: err.to_string(),
                        },
                    }
                }
            }
        };

        if let EvaluationOutcome::Failed { error } = &outcome {
            if !cancel.is_cancelled() {
                warn!(index, params = %params, error = %error, "evaluation failed");
            }
        }

        Evaluation {
            index,
            params: params.clone(),
            fingerprint: params.fingerprint(),
            outcome,
        }
    }
}

// ─── Parameter importance ────────────────────────────────────────────

/// |Pearson r| between each axis and the target over successful runs,
/// scaled so the scores sum to 100. All-zero scores split evenly.
pub fn parameter_importance(space: &ParamSpace, evaluations: &[Evaluation]) -> BTreeMap<String, f64> {
    let scored: Vec<(&ParamSet, f64)> = evaluations
        .iter()
        .filter_map(|e| {
            e.value()
                .filter(|v| v.is_finite())
                .map(|value| (&e.params, value))
        })
        .collect();
    let targets: Vec<f64> = scored.iter().map(|(_, v)| *v).collect();

    let raw: Vec<(String, f64)> = space
        .names()
        .map(|name| {
            let xs: Vec<f64> = scored
                .iter()
                .map(|(params, _)| params.get_f64(name).unwrap_or(0.0))
                .collect();
            let score = pearson_correlation(&xs, &targets).map_or(0.0, f64::abs);
            (name.to_string(), score)
        })
        .collect();

    let total: f64 = raw.iter().map(|(_, s)| s).sum();
    if raw.is_empty() {
        return BTreeMap::new();
    }
    if total <= 0.0 {
        let share = 100.0 / raw.len() as f64;
        return raw.into_iter().map(|(name, _)| (name, share)).collect();
    }
    raw.into_iter()
        .map(|(name, score)| (name, score / total * 100.0))
        .collect()
}
