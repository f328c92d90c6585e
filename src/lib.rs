//! Resampling-based model development for tabular data.
/// Application directories for logs and default outputs.
pub mod app_dirs;
/// JSON artifacts passed between stages.
pub mod artifacts;
/// Comparing workflows evaluated on shared resamples.
pub mod compare;
/// Experiment configuration.
pub mod config;
/// In-memory datasets, loaders and simulations.
pub mod data;
/// End-to-end experiment runner.
pub mod experiment;
/// Small dense linear algebra helpers.
pub mod linalg;
/// Logging setup.
pub mod logging;
/// Models and metrics.
pub mod ml;
/// Preprocessing recipes.
pub mod recipe;
/// Data splitting and resampling.
pub mod resample;
/// Descriptive and inferential statistics helpers.
pub mod stats;
/// Resampled evaluation and hyperparameter tuning.
pub mod tune;
/// Recipe plus model as one fitted unit.
pub mod workflow;
