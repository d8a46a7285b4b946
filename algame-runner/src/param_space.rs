//! Parameter spaces and candidate generation for grid and random search.
//!
//! A space is an ordered list of axes plus constraints. Grid enumeration is
//! the Cartesian product with the first axis varying slowest. Random search
//! draws exactly `max_evaluations` points. Both drop (never clamp) points that
//! fail a constraint, and both are deterministic for a given seed.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use algame_core::domain::{ParamSet, ParamValue};
use algame_core::rng::RngHierarchy;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamSpaceError {
    #[error("parameter space has no axes")]
    Empty,

    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("duplicate parameter '{0}'")]
    DuplicateName(String),

    #[error("parameter '{0}' has no values")]
    EmptyValues(String),

    #[error("parameter '{0}' has a non-finite value")]
    NonFinite(String),

    #[error("parameter '{name}': min {min} is greater than max {max}")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("parameter '{name}': range {min}..={max} is too wide to sample")]
    UnboundedRange { name: String, min: f64, max: f64 },

    #[error("parameter '{0}': steps must be at least 1")]
    ZeroSteps(String),

    #[error("parameter '{name}': no integer between {min} and {max}")]
    EmptyIntegerRange { name: String, min: f64, max: f64 },

    #[error("constraint '{constraint}' references unknown parameter '{name}'")]
    UnknownParameter { constraint: String, name: String },

    #[error("max_evaluations must be at least 1")]
    ZeroEvaluations,

    #[error("invalid constraint '{0}': expected `left OP right`")]
    InvalidConstraint(String),
}

// ─── Axes ────────────────────────────────────────────────────────────

/// The values one parameter may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Axis {
    /// Explicit list, enumerated in the given order.
    Values { values: Vec<ParamValue> },
    /// `steps` evenly spaced values from `min` to `max` inclusive.
    Range {
        min: f64,
        max: f64,
        steps: usize,
        #[serde(default)]
        integer: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamAxis {
    pub name: String,
    #[serde(flatten)]
    pub axis: Axis,
}

impl ParamAxis {
    pub fn values(name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        Self {
            name: name.into(),
            axis: Axis::Values { values },
        }
    }

    pub fn range(name: impl Into<String>, min: f64, max: f64, steps: usize) -> Self {
        Self {
            name: name.into(),
            axis: Axis::Range {
                min,
                max,
                steps,
                integer: false,
            },
        }
    }

    pub fn int_range(name: impl Into<String>, min: f64, max: f64, steps: usize) -> Self {
        Self {
            name: name.into(),
            axis: Axis::Range {
                min,
                max,
                steps,
                integer: true,
            },
        }
    }

    fn validate(&self) -> Result<(), ParamSpaceError> {
        if self.name.trim().is_empty() {
            return Err(ParamSpaceError::EmptyName);
        }
        match &self.axis {
            Axis::Values { values } => {
                if values.is_empty() {
                    return Err(ParamSpaceError::EmptyValues(self.name.clone()));
                }
                if values.iter().any(|v| !v.as_f64().is_finite()) {
                    return Err(ParamSpaceError::NonFinite(self.name.clone()));
                }
            }
            &Axis::Range {
                min,
                max,
                steps,
                integer,
            } => {
                if !min.is_finite() || !max.is_finite() {
                    return Err(ParamSpaceError::NonFinite(self.name.clone()));
                }
                if min > max {
                    return Err(ParamSpaceError::InvalidRange {
                        name: self.name.clone(),
                        min,
                        max,
                    });
                }
                if !(max - min).is_finite() {
                    return Err(ParamSpaceError::UnboundedRange {
                        name: self.name.clone(),
                        min,
                        max,
                    });
                }
                if steps == 0 {
                    return Err(ParamSpaceError::ZeroSteps(self.name.clone()));
                }
                if integer && min.ceil() > max.floor() {
                    return Err(ParamSpaceError::EmptyIntegerRange {
                        name: self.name.clone(),
                        min,
                        max,
                    });
                }
            }
        }
        Ok(())
    }

    /// Grid values in enumeration order. Integer ranges are rounded and
    /// collapsed where neighbouring steps round to the same integer.
    pub fn grid_values(&self) -> Vec<ParamValue> {
        match &self.axis {
            Axis::Values { values } => values.clone(),
            &Axis::Range {
                min,
                max,
                steps,
                integer,
            } => {
                let points = linspace(min, max, steps);
                if !integer {
                    return points.into_iter().map(ParamValue::Float).collect();
                }
                let (lo, hi) = (min.ceil(), max.floor());
                let mut ints: Vec<i64> = points
                    .into_iter()
                    .map(|v| v.round().clamp(lo, hi) as i64)
                    .collect();
                ints.dedup();
                ints.into_iter().map(ParamValue::Int).collect()
            }
        }
    }

    /// One uniform draw from the axis.
    fn sample(&self, rng: &mut StdRng) -> ParamValue {
        match &self.axis {
            Axis::Values { values } => values[rng.gen_range(0..values.len())],
            &Axis::Range {
                min, max, integer, ..
            } => {
                if integer {
                    ParamValue::Int(rng.gen_range(min.ceil() as i64..=max.floor() as i64))
                } else if min == max {
                    ParamValue::Float(min)
                } else {
                    // Width is finite after validation, so this stays in [min, max].
                    ParamValue::Float(min + (max - min) * rng.gen::<f64>())
                }
            }
        }
    }
}

fn linspace(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps == 1 {
        return vec![min];
    }
    let width = max - min;
    let intervals = (steps - 1) as f64;
    (0..steps)
        .map(|i| {
            if i == steps - 1 {
                return max;
            }
            // Divide last so declared points like 0.3 come out exact.
            let scaled = width * i as f64;
            if scaled.is_finite() {
                min + scaled / intervals
            } else {
                min + width * (i as f64 / intervals)
            }
        })
        .collect()
}

// ─── Constraints ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
        }
    }

    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Eq => left == right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Param(String),
    Value(f64),
}

impl Operand {
    fn resolve(&self, params: &ParamSet) -> Option<f64> {
        match self {
            Self::Param(name) => params.get_f64(name),
            Self::Value(v) => Some(*v),
        }
    }

    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(v) = text.parse::<f64>() {
            return v.is_finite().then_some(Self::Value(v));
        }
        let valid = text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
        valid.then(|| Self::Param(text.to_string()))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(name) => f.write_str(name),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

/// `left OP right`, written in text form as e.g. `"fast < slow"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Constraint {
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
}

impl Constraint {
    pub fn new(left: Operand, op: CompareOp, right: Operand) -> Self {
        Self { left, op, right }
    }

    /// A set that lacks a referenced parameter never satisfies the constraint.
    pub fn holds(&self, params: &ParamSet) -> bool {
        match (self.left.resolve(params), self.right.resolve(params)) {
            (Some(left), Some(right)) => self.op.apply(left, right),
            _ => false,
        }
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        [&self.left, &self.right].into_iter().filter_map(|op| match op {
            Operand::Param(name) => Some(name.as_str()),
            Operand::Value(_) => None,
        })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op.symbol(), self.right)
    }
}

impl FromStr for Constraint {
    type Err = ParamSpaceError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        // Two-character operators first so `<=` is not read as `<`.
        const OPS: [(&str, CompareOp); 5] = [
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("==", CompareOp::Eq),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ];
        let invalid = || ParamSpaceError::InvalidConstraint(text.to_string());
        let (pos, symbol, op) = OPS
            .iter()
            .find_map(|&(symbol, op)| text.find(symbol).map(|pos| (pos, symbol, op)))
            .ok_or_else(invalid)?;
        let left = Operand::parse(&text[..pos]).ok_or_else(invalid)?;
        let right = Operand::parse(&text[pos + symbol.len()..]).ok_or_else(invalid)?;
        Ok(Self { left, op, right })
    }
}

impl TryFrom<String> for Constraint {
    type Error = ParamSpaceError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<Constraint> for String {
    fn from(constraint: Constraint) -> Self {
        constraint.to_string()
    }
}

// ─── Search method ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SearchMethod {
    /// Full grid, optionally subsampled down to `max_evaluations`.
    Grid {
        #[serde(default)]
        max_evaluations: Option<usize>,
    },
    /// Exactly `max_evaluations` independent draws.
    Random { max_evaluations: usize },
}

impl Default for SearchMethod {
    fn default() -> Self {
        Self::Grid {
            max_evaluations: None,
        }
    }
}

impl SearchMethod {
    pub fn validate(&self) -> Result<(), ParamSpaceError> {
        match *self {
            Self::Grid {
                max_evaluations: Some(0),
            }
            | Self::Random { max_evaluations: 0 } => Err(ParamSpaceError::ZeroEvaluations),
            _ => Ok(()),
        }
    }
}

// ─── Space ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpace {
    pub axes: Vec<ParamAxis>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl ParamSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, axis: ParamAxis) -> Self {
        self.axes.push(axis);
        self
    }

    pub fn with_values<V: Into<ParamValue>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.with_axis(ParamAxis::values(
            name,
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn with_range(self, name: impl Into<String>, min: f64, max: f64, steps: usize) -> Self {
        self.with_axis(ParamAxis::range(name, min, max, steps))
    }

    pub fn with_int_range(self, name: impl Into<String>, min: f64, max: f64, steps: usize) -> Self {
        self.with_axis(ParamAxis::int_range(name, min, max, steps))
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|a| a.name.as_str())
    }

    pub fn validate(&self) -> Result<(), ParamSpaceError> {
        if self.axes.is_empty() {
            return Err(ParamSpaceError::Empty);
        }
        let mut seen = HashSet::new();
        for axis in &self.axes {
            axis.validate()?;
            if !seen.insert(axis.name.as_str()) {
                return Err(ParamSpaceError::DuplicateName(axis.name.clone()));
            }
        }
        for constraint in &self.constraints {
            if let Some(name) = constraint.param_names().find(|n| !seen.contains(n)) {
                return Err(ParamSpaceError::UnknownParameter {
                    constraint: constraint.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Unconstrained grid size.
    pub fn grid_size(&self) -> usize {
        self.axes
            .iter()
            .map(|a| a.grid_values().len())
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }

    fn admits(&self, params: &ParamSet) -> bool {
        self.constraints.iter().all(|c| c.holds(params))
    }

    /// Candidate sets for `method`, deterministic for `seed`.
    pub fn generate(
        &self,
        method: &SearchMethod,
        seed: u64,
    ) -> Result<Vec<ParamSet>, ParamSpaceError> {
        self.validate()?;
        method.validate()?;
        let seeds = RngHierarchy::new(seed);
        let sets = match *method {
            SearchMethod::Grid { max_evaluations } => {
                let grid = self.grid();
                match max_evaluations {
                    Some(cap) if grid.len() > cap => {
                        let mut rng = seeds.rng_for("grid", 0);
                        let mut picked =
                            rand::seq::index::sample(&mut rng, grid.len(), cap).into_vec();
                        picked.sort_unstable();
                        picked.into_iter().map(|i| grid[i].clone()).collect()
                    }
                    _ => grid,
                }
            }
            SearchMethod::Random { max_evaluations } => {
                let mut rng = seeds.rng_for("random", 0);
                (0..max_evaluations)
                    .map(|_| {
                        self.axes
                            .iter()
                            .map(|axis| (axis.name.clone(), axis.sample(&mut rng)))
                            .collect::<ParamSet>()
                    })
                    .filter(|set| self.admits(set))
                    .collect()
            }
        };
        Ok(sets)
    }

    /// Constraint-filtered Cartesian product, first axis slowest.
    fn grid(&self) -> Vec<ParamSet> {
        let columns: Vec<Vec<ParamValue>> = self.axes.iter().map(|a| a.grid_values()).collect();
        let mut sets = Vec::new();
        let mut cursor = vec![0usize; columns.len()];
        loop {
            let set: ParamSet = self
                .axes
                .iter()
                .zip(&columns)
                .zip(&cursor)
                .map(|((axis, column), &i)| (axis.name.clone(), column[i]))
                .collect();
            if self.admits(&set) {
                sets.push(set);
            }

            // Odometer: advance the last axis, carry leftwards.
            let mut dim = columns.len();
            loop {
                if dim == 0 {
                    return sets;
                }
                dim -= 1;
                cursor[dim] += 1;
                if cursor[dim] < columns[dim].len() {
                    break;
                }
                cursor[dim] = 0;
            }
        }
    }
}
