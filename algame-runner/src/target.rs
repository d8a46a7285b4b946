//! Optimization target: a validated performance metric name.

use std::fmt;
use std::str::FromStr;

use algame_core::metrics::PerformanceMetrics;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("unknown target metric '{name}' (available: {available})")]
    UnknownMetric { name: String, available: String },
}

/// Name of the metric an optimization maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetMetric(&'static str);

impl TargetMetric {
    pub fn new(name: &str) -> Result<Self, TargetError> {
        PerformanceMetrics::NAMES
            .iter()
            .find(|&&known| known == name)
            .map(|&known| Self(known))
            .ok_or_else(|| TargetError::UnknownMetric {
                name: name.to_string(),
                available: PerformanceMetrics::NAMES.join(", "),
            })
    }

    pub fn name(&self) -> &'static str {
        self.0
    }

    pub fn extract(&self, metrics: &PerformanceMetrics) -> f64 {
        metrics.get(self.0).unwrap_or(f64::NAN)
    }
}

impl Default for TargetMetric {
    fn default() -> Self {
        Self("sharpe_ratio")
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for TargetMetric {
    type Err = TargetError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::new(name)
    }
}

impl TryFrom<String> for TargetMetric {
    type Error = TargetError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(&name)
    }
}

impl From<TargetMetric> for String {
    fn from(target: TargetMetric) -> Self {
        target.0.to_string()
    }
}
