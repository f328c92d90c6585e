//! Data splitting and resampling.
//!
//! Every scheme works on row indices only; the analysis/assessment datasets are
//! derived on demand from the original, which is never modified.
//! - `initial_split` / `initial_validation_split` carve out training, validation
//!   and test rows, optionally stratified on the outcome.
//! - `vfold_cv`, `bootstraps` and `mc_cv` build fold sets over training rows.

mod folds;
mod split;
pub mod strata;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{DataError, Dataset};

pub use folds::{BootstrapOptions, McCvOptions, VfoldOptions, bootstraps, mc_cv, vfold_cv};
pub use split::{
    SplitOptions, ThreeWaySplit, ValidationSplitOptions, initial_split, initial_validation_split,
};

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("proportion must be in (0, 1), got {0}")]
    InvalidProportion(f64),
    #[error("{name} must be at least {min}, got {value}")]
    InvalidCount {
        name: &'static str,
        min: usize,
        value: usize,
    },
    #[error("cannot make {v} folds from {n} rows")]
    TooFewRows { n: usize, v: usize },
    #[error("resample {id} has an empty assessment set")]
    EmptyAssessment { id: String },
    #[error("row index {index} out of range for {n_rows} rows")]
    IndexOutOfRange { index: usize, n_rows: usize },
    #[error("row {index} is in both the analysis and assessment sets")]
    Overlap { index: usize },
    #[error(transparent)]
    Data(#[from] DataError),
}

/// One analysis/assessment partition of a dataset's rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    id: String,
    analysis: Vec<usize>,
    assessment: Vec<usize>,
    n_rows: usize,
}

impl Split {
    /// Validate and build a split over `n_rows` rows.
    ///
    /// The analysis set may repeat an index (bootstrap), the assessment set may
    /// not, and no index may appear in both.
    pub fn new(
        id: impl Into<String>,
        analysis: Vec<usize>,
        assessment: Vec<usize>,
        n_rows: usize,
    ) -> Result<Self, ResampleError> {
        let mut held_out = BTreeSet::new();
        for &index in &assessment {
            if index >= n_rows {
                return Err(ResampleError::IndexOutOfRange { index, n_rows });
            }
            if !held_out.insert(index) {
                return Err(ResampleError::Overlap { index });
            }
        }
        for &index in &analysis {
            if index >= n_rows {
                return Err(ResampleError::IndexOutOfRange { index, n_rows });
            }
            if held_out.contains(&index) {
                return Err(ResampleError::Overlap { index });
            }
        }
        Ok(Self {
            id: id.into(),
            analysis,
            assessment,
            n_rows,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn analysis(&self) -> &[usize] {
        &self.analysis
    }

    pub fn assessment(&self) -> &[usize] {
        &self.assessment
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Rows used for fitting.
    pub fn analysis_data(&self, data: &Dataset) -> Result<Dataset, DataError> {
        data.take_rows(&self.analysis)
    }

    /// Rows held out for evaluation.
    pub fn assessment_data(&self, data: &Dataset) -> Result<Dataset, DataError> {
        data.take_rows(&self.assessment)
    }

    /// Alias of [`Split::analysis_data`] for train/test splits.
    pub fn training(&self, data: &Dataset) -> Result<Dataset, DataError> {
        self.analysis_data(data)
    }

    /// Alias of [`Split::assessment_data`] for train/test splits.
    pub fn testing(&self, data: &Dataset) -> Result<Dataset, DataError> {
        self.assessment_data(data)
    }
}

/// How a fold set was generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResampleKind {
    Vfold { v: usize, repeats: usize },
    Bootstrap { times: usize },
    MonteCarlo { prop: f64, times: usize },
    Validation,
}

/// Ordered collection of splits produced by one resampling scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSet {
    pub kind: ResampleKind,
    pub strata: Option<String>,
    splits: Vec<Split>,
}

impl FoldSet {
    pub fn new(kind: ResampleKind, strata: Option<String>, splits: Vec<Split>) -> Self {
        Self {
            kind,
            strata,
            splits,
        }
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.splits.iter().map(|s| s.id.clone()).collect()
    }

    /// Keep only the first `n` splits (racing and quick smoke runs).
    pub fn head(&self, n: usize) -> Self {
        Self {
            kind: self.kind.clone(),
            strata: self.strata.clone(),
            splits: self.splits.iter().take(n).cloned().collect(),
        }
    }
}

pub(crate) fn check_prop(prop: f64) -> Result<(), ResampleError> {
    if prop.is_finite() && prop > 0.0 && prop < 1.0 {
        Ok(())
    } else {
        Err(ResampleError::InvalidProportion(prop))
    }
}

pub(crate) fn default_breaks() -> usize {
    4
}

pub(crate) fn default_pool() -> f64 {
    0.1
}

pub(crate) fn default_seed() -> u64 {
    42
}

/// Strata ids for the configured column, or a single stratum.
pub(crate) fn strata_or_single(
    data: &Dataset,
    strata: Option<&str>,
    breaks: usize,
    pool: f64,
) -> Result<Vec<Vec<usize>>, ResampleError> {
    match strata {
        Some(column) => Ok(strata::group_rows(&strata::strata_for(
            data, column, breaks, pool,
        )?)),
        None => Ok(vec![(0..data.n_rows()).collect()]),
    }
}
