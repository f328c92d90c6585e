//! Preprocessing recipes.
//!
//! A [`Recipe`] is an ordered list of step specifications. `prep` estimates every
//! step's parameters from training data only and returns a [`PreparedRecipe`],
//! whose `bake` is a pure function of those fitted parameters and the new data.

mod pca;
mod spline;
mod steps;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data::{DataError, Dataset};

pub use pca::PcaProjection;
pub use spline::SplineBasis;
pub use steps::{ColumnLevels, ColumnMoments, FittedStep, InteractionTerm, StepSpec, dummy_name};

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("column {0} is missing from the data")]
    MissingColumn(String),
    #[error("column {column} must be {expected}")]
    WrongType {
        column: String,
        expected: &'static str,
    },
    #[error("cannot fit a spline to {column}: {reason}")]
    DegenerateSpline { column: String, reason: String },
    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("no step in this recipe has a parameter named {0}")]
    UnknownParameter(String),
    #[error("parameter {name} is ambiguous; qualify it as one of {}", .candidates.join(", "))]
    AmbiguousParameter {
        name: String,
        candidates: Vec<String>,
    },
    #[error(transparent)]
    Data(DataError),
}

impl From<DataError> for RecipeError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::UnknownColumn(name) => RecipeError::MissingColumn(name),
            DataError::WrongType { name, expected } => RecipeError::WrongType {
                column: name,
                expected,
            },
            other => RecipeError::Data(other),
        }
    }
}

/// Which columns a step applies to.
///
/// Selectors resolve against the data as it looks when the step is fitted, so
/// columns created by earlier steps can be selected. Only `Names` can select
/// the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Names(Vec<String>),
    StartsWith(String),
    AllPredictors,
    AllNumericPredictors,
    AllNominalPredictors,
}

impl Selector {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn resolve(&self, data: &Dataset) -> Result<Vec<String>, RecipeError> {
        let predictors = data.predictor_names();
        let is_numeric = |name: &String| {
            data.column(name)
                .map(|column| column.is_numeric())
                .unwrap_or(false)
        };
        Ok(match self {
            Selector::Names(names) => {
                for name in names {
                    if !data.has_column(name) {
                        return Err(RecipeError::MissingColumn(name.clone()));
                    }
                }
                names.clone()
            }
            Selector::StartsWith(prefix) => predictors
                .into_iter()
                .filter(|name| name.starts_with(prefix.as_str()))
                .collect(),
            Selector::AllPredictors => predictors,
            Selector::AllNumericPredictors => predictors.into_iter().filter(is_numeric).collect(),
            Selector::AllNominalPredictors => predictors
                .into_iter()
                .filter(|name| !is_numeric(name))
                .collect(),
        })
    }
}

fn split_param_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((kind, param)) => (Some(kind), param),
        None => (None, name),
    }
}

/// Unfitted preprocessing pipeline for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub outcome: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl Recipe {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    /// Distinct tunable parameter names across all steps, in step order.
    ///
    /// A name offered by more than one kind of step is listed qualified with
    /// each step name (`other.threshold`, `pca.threshold`).
    pub fn tunable_params(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for step in &self.steps {
            for name in step.tunable_params() {
                let kinds = self.step_kinds_with(name);
                let listed = if kinds.len() > 1 {
                    format!("{}.{name}", step.name())
                } else {
                    (*name).to_string()
                };
                if !out.contains(&listed) {
                    out.push(listed);
                }
            }
        }
        out
    }

    /// Whether `set_param` could target at least one step with `name`.
    pub fn has_param(&self, name: &str) -> bool {
        let (kind, param) = split_param_name(name);
        self.steps.iter().any(|step| {
            kind.is_none_or(|kind| kind == step.name()) && step.tunable_params().contains(&param)
        })
    }

    /// Set a tunable parameter on every step that has it.
    ///
    /// `name` may be qualified with a step name (`pca.threshold`) to target
    /// only steps of that kind. An unqualified name offered by more than one
    /// kind of step is rejected, since the kinds read the value differently.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<(), RecipeError> {
        let (kind, param) = split_param_name(name);
        if kind.is_none() {
            let kinds = self.step_kinds_with(param);
            if kinds.len() > 1 {
                return Err(RecipeError::AmbiguousParameter {
                    name: name.to_string(),
                    candidates: kinds.iter().map(|kind| format!("{kind}.{param}")).collect(),
                });
            }
        }
        let mut touched = false;
        for step in &mut self.steps {
            if kind.is_some_and(|kind| kind != step.name()) {
                continue;
            }
            touched |= step.set_param(param, value)?;
        }
        if touched {
            Ok(())
        } else {
            Err(RecipeError::UnknownParameter(name.to_string()))
        }
    }

    /// Distinct step names whose steps take a parameter called `param`.
    fn step_kinds_with(&self, param: &str) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        for step in self.steps.iter().filter(|s| s.tunable_params().contains(&param)) {
            if !kinds.contains(&step.name()) {
                kinds.push(step.name());
            }
        }
        kinds
    }

    /// Fit every step on `training`, in order.
    ///
    /// Each step is fitted on the training data as baked by the steps before
    /// it. The training data itself is never modified.
    pub fn prep(&self, training: &Dataset) -> Result<PreparedRecipe, RecipeError> {
        if !training.has_column(&self.outcome) {
            return Err(RecipeError::MissingColumn(self.outcome.clone()));
        }
        let mut current = training.clone().with_outcome(&self.outcome)?;
        let mut fitted = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let step_fit = step.fit(&current)?;
            current = step_fit.apply(&current, &self.outcome)?;
            debug!(
                "prep: step {} fitted, {} columns after",
                step.name(),
                current.n_cols()
            );
            fitted.push(step_fit);
        }
        Ok(PreparedRecipe {
            outcome: self.outcome.clone(),
            steps: fitted,
            predictors: current.predictor_names(),
        })
    }
}

/// Recipe with every step parameter estimated from training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRecipe {
    pub outcome: String,
    pub steps: Vec<FittedStep>,
    /// Predictor columns produced on the training data, in order.
    pub predictors: Vec<String>,
}

impl PreparedRecipe {
    /// Apply the fitted steps to `data`.
    ///
    /// The outcome column is optional in `data`; when absent, outcome-only
    /// transformations are skipped. The result holds the outcome (if present)
    /// followed by the training predictor columns in training order.
    pub fn bake(&self, data: &Dataset) -> Result<Dataset, RecipeError> {
        let mut current = if data.has_column(&self.outcome) {
            data.clone().with_outcome(&self.outcome)?
        } else {
            data.clone()
        };
        for step in &self.steps {
            current = step.apply(&current, &self.outcome)?;
        }
        let mut columns = Vec::with_capacity(self.predictors.len() + 1);
        if current.has_column(&self.outcome) {
            columns.push((
                self.outcome.clone(),
                current.column(&self.outcome)?.clone(),
            ));
        }
        for name in &self.predictors {
            columns.push((name.clone(), current.column(name)?.clone()));
        }
        let mut out = Dataset::new(columns)?;
        if out.has_column(&self.outcome) {
            out = out.with_outcome(&self.outcome)?;
        }
        Ok(out)
    }

    pub fn n_predictors(&self) -> usize {
        self.predictors.len()
    }
}

#[cfg(test)]
mod tests;
