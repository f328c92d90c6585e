//! Model specifications, fitted models and evaluation metrics.
//!
//! Every model trains on a dense `f64` design matrix (rows are observations)
//! and a [`Target`]. Fitted models are plain serializable values; nothing is
//! mutated after training.

pub mod gbdt_stump;
pub mod knn;
pub mod linear;
pub mod logreg;
pub mod metrics;
mod spec;

use std::collections::BTreeSet;

use ndarray::Array2;
use thiserror::Error;

use crate::data::{DataError, Dataset, OutcomeKind};

pub use knn::WeightFunc;
pub use spec::{FittedModel, ModelSpec, Predictions};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training data is empty")]
    EmptyTrainingData,
    #[error("{rows} feature rows but {targets} outcome values")]
    LengthMismatch { rows: usize, targets: usize },
    #[error("{model} does not support {mode:?} outcomes")]
    ModeMismatch {
        model: &'static str,
        mode: OutcomeKind,
    },
    #[error("need at least 2 outcome classes, found {0}")]
    TooFewClasses(usize),
    #[error("training predictors contain missing or infinite values")]
    NonFiniteInput,
    #[error("normal equations are singular")]
    SingularSystem,
    #[error("invalid value for {name}: {reason}")]
    InvalidHyperparameter { name: String, reason: String },
    #[error("{model} has no tunable parameter named {name}")]
    UnknownParameter { model: &'static str, name: String },
    #[error("model expects {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Outcome values aligned with the rows of a design matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Numeric(Vec<f64>),
    Labels(Vec<String>),
}

impl Target {
    /// Extract the outcome column of `data`.
    pub fn from_dataset(data: &Dataset) -> Result<Self, DataError> {
        let name = data.outcome().ok_or(DataError::MissingOutcome)?;
        Ok(match data.outcome_kind()? {
            OutcomeKind::Regression => Target::Numeric(data.numeric(name)?.to_vec()),
            OutcomeKind::Classification => Target::Labels(data.nominal(name)?.to_vec()),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            Target::Numeric(values) => values.len(),
            Target::Labels(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Target::Numeric(_) => OutcomeKind::Regression,
            Target::Labels(_) => OutcomeKind::Classification,
        }
    }
}

/// Sorted class levels and per-row class codes.
pub(crate) fn encode_labels(labels: &[String]) -> (Vec<String>, Vec<usize>) {
    let levels: Vec<String> = labels
        .iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect();
    let codes = labels
        .iter()
        .map(|label| levels.binary_search(label).unwrap_or(0))
        .collect();
    (levels, codes)
}

/// Shared shape checks before any model trains.
pub(crate) fn check_training_input(x: &Array2<f64>, target: &Target) -> Result<(), ModelError> {
    if x.nrows() == 0 || target.is_empty() {
        return Err(ModelError::EmptyTrainingData);
    }
    if x.nrows() != target.len() {
        return Err(ModelError::LengthMismatch {
            rows: x.nrows(),
            targets: target.len(),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFiniteInput);
    }
    if let Target::Numeric(values) = target {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput);
        }
    }
    Ok(())
}

/// Per-column mean and standard deviation, with zero spread mapped to 1.
pub(crate) fn column_scaling(x: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
    let n = x.nrows().max(1) as f64;
    let mut means = Vec::with_capacity(x.ncols());
    let mut scales = Vec::with_capacity(x.ncols());
    for column in x.columns() {
        let mean = column.sum() / n;
        let var = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        means.push(mean);
        scales.push(if var > 1e-24 { var.sqrt() } else { 1.0 });
    }
    (means, scales)
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}
