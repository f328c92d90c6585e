//! Deterministic gradient-boosted decision stumps.
//!
//! A lightweight booster with no external ML dependencies:
//! - Regression via squared-error boosting.
//! - Multi-class classification via softmax boosting.
//! - Histogram split search over equal-width feature bins.

mod model;
mod train;

pub use model::{BoostMode, GbdtStumpModel, Stump, softmax};
pub use train::{TrainOptions, train_gbdt_stump};
