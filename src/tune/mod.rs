//! Resampled evaluation and hyperparameter search.
//!
//! - `fit_resamples` scores one workflow over a fold set.
//! - `grid_regular` / `grid_random` build candidate parameter sets.
//! - `tune_grid` scores every candidate on every resample; `tune_race_anova`
//!   drops candidates that are clearly worse than the current best once
//!   `burn_in` resamples have been scored.

mod grid;
mod race;
mod resamples;
mod search;

use thiserror::Error;

use crate::ml::metrics::MetricKind;
use crate::workflow::WorkflowError;

pub use grid::{ParamRange, ParamSet, Scale, grid_random, grid_regular};
pub use race::{RaceOptions, tune_race_anova};
pub use resamples::{ControlResamples, MetricSummary, ResampleMetric, ResampleResults, fit_resamples};
pub use search::{CandidateResult, CandidateSummary, TuneResults, finalize_workflow, tune_grid};

pub(crate) use resamples::{fit_split, metric_set, summarize};

#[derive(Debug, Error)]
pub enum TuneError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("invalid range for parameter {0}")]
    InvalidRange(String),
    #[error("candidate grid is empty")]
    EmptyGrid,
    #[error("workflow has no tunable parameter named {0}")]
    UnknownParameter(String),
    #[error("no completed candidate has a value for {0}")]
    NoResults(MetricKind),
    #[error("burn_in must be at least 2, got {0}")]
    InvalidBurnIn(usize),
    #[error("alpha must be in (0, 1), got {0}")]
    InvalidAlpha(f64),
}
