use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::gbdt_stump::{self, BoostMode, GbdtStumpModel};
use super::knn::{self, KnnModel, KnnOutcome, WeightFunc};
use super::linear::{self, LinearModel};
use super::logreg::{self, LogRegModel};
use super::{ModelError, Target, argmax};
use crate::data::OutcomeKind;

/// Unfitted model: an algorithm plus its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelSpec {
    LinearReg {
        #[serde(default)]
        penalty: f64,
    },
    LogisticReg {
        #[serde(default)]
        penalty: f64,
        #[serde(default = "default_epochs")]
        epochs: usize,
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
        #[serde(default = "default_model_seed")]
        seed: u64,
        #[serde(default)]
        balance_classes: bool,
    },
    BoostTree {
        #[serde(default = "default_trees")]
        trees: usize,
        #[serde(default = "default_learning_rate")]
        learn_rate: f64,
        #[serde(default = "default_bins")]
        bins: usize,
    },
    NearestNeighbor {
        #[serde(default = "default_neighbors")]
        neighbors: usize,
        #[serde(default)]
        weight_func: WeightFunc,
    },
}

fn default_epochs() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_batch_size() -> usize {
    64
}

fn default_model_seed() -> u64 {
    42
}

fn default_trees() -> usize {
    100
}

fn default_bins() -> usize {
    32
}

fn default_neighbors() -> usize {
    5
}

impl ModelSpec {
    pub fn linear_reg() -> Self {
        ModelSpec::LinearReg { penalty: 0.0 }
    }

    pub fn logistic_reg() -> Self {
        ModelSpec::LogisticReg {
            penalty: 0.0,
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            seed: default_model_seed(),
            balance_classes: false,
        }
    }

    pub fn boost_tree() -> Self {
        ModelSpec::BoostTree {
            trees: default_trees(),
            learn_rate: default_learning_rate(),
            bins: default_bins(),
        }
    }

    pub fn nearest_neighbor() -> Self {
        ModelSpec::NearestNeighbor {
            neighbors: default_neighbors(),
            weight_func: WeightFunc::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::LinearReg { .. } => "linear_reg",
            ModelSpec::LogisticReg { .. } => "logistic_reg",
            ModelSpec::BoostTree { .. } => "boost_tree",
            ModelSpec::NearestNeighbor { .. } => "nearest_neighbor",
        }
    }

    pub fn supports(&self, mode: OutcomeKind) -> bool {
        match self {
            ModelSpec::LinearReg { .. } => mode == OutcomeKind::Regression,
            ModelSpec::LogisticReg { .. } => mode == OutcomeKind::Classification,
            ModelSpec::BoostTree { .. } | ModelSpec::NearestNeighbor { .. } => true,
        }
    }

    pub fn tunable_params(&self) -> &'static [&'static str] {
        match self {
            ModelSpec::LinearReg { .. } => &["penalty"],
            ModelSpec::LogisticReg { .. } => &["penalty", "epochs"],
            ModelSpec::BoostTree { .. } => &["trees", "learn_rate"],
            ModelSpec::NearestNeighbor { .. } => &["neighbors"],
        }
    }

    /// Set a tunable hyperparameter by name.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        let model = self.name();
        match (self, name) {
            (ModelSpec::LinearReg { penalty }, "penalty")
            | (ModelSpec::LogisticReg { penalty, .. }, "penalty") => {
                *penalty = non_negative(name, value)?;
            }
            (ModelSpec::LogisticReg { epochs, .. }, "epochs") => {
                *epochs = count(name, value)?;
            }
            (ModelSpec::BoostTree { trees, .. }, "trees") => {
                *trees = count(name, value)?;
            }
            (ModelSpec::BoostTree { learn_rate, .. }, "learn_rate") => {
                if !(value > 0.0) || !value.is_finite() {
                    return Err(invalid(name, "must be positive"));
                }
                *learn_rate = value;
            }
            (ModelSpec::NearestNeighbor { neighbors, .. }, "neighbors") => {
                *neighbors = count(name, value)?;
            }
            _ => {
                return Err(ModelError::UnknownParameter {
                    model,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Train on a numeric design matrix.
    pub fn fit(&self, x: &Array2<f64>, target: &Target) -> Result<FittedModel, ModelError> {
        if !self.supports(target.kind()) {
            return Err(ModelError::ModeMismatch {
                model: self.name(),
                mode: target.kind(),
            });
        }
        debug!(
            "fitting {} on {} rows x {} predictors",
            self.name(),
            x.nrows(),
            x.ncols()
        );
        Ok(match self {
            ModelSpec::LinearReg { penalty } => {
                let Target::Numeric(y) = target else {
                    return Err(ModelError::ModeMismatch {
                        model: self.name(),
                        mode: target.kind(),
                    });
                };
                super::check_training_input(x, target)?;
                FittedModel::LinearReg(linear::fit_linear(x, y, *penalty)?)
            }
            ModelSpec::LogisticReg {
                penalty,
                epochs,
                learning_rate,
                batch_size,
                seed,
                balance_classes,
            } => FittedModel::LogisticReg(logreg::train_logreg(
                x,
                target,
                &logreg::TrainOptions {
                    epochs: *epochs,
                    learning_rate: *learning_rate,
                    l2: *penalty,
                    batch_size: *batch_size,
                    seed: *seed,
                    balance_classes: *balance_classes,
                },
            )?),
            ModelSpec::BoostTree {
                trees,
                learn_rate,
                bins,
            } => FittedModel::BoostTree(gbdt_stump::train_gbdt_stump(
                x,
                target,
                &gbdt_stump::TrainOptions {
                    rounds: *trees,
                    learning_rate: *learn_rate,
                    bins: *bins,
                },
            )?),
            ModelSpec::NearestNeighbor {
                neighbors,
                weight_func,
            } => FittedModel::NearestNeighbor(knn::fit_knn(x, target, *neighbors, *weight_func)?),
        })
    }
}

fn invalid(name: &str, reason: &str) -> ModelError {
    ModelError::InvalidHyperparameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn non_negative(name: &str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(name, "must be a non-negative number"))
    }
}

fn count(name: &str, value: f64) -> Result<usize, ModelError> {
    if value.is_finite() && value >= 1.0 {
        Ok(value.round() as usize)
    } else {
        Err(invalid(name, "must be at least 1"))
    }
}

/// Trained model, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FittedModel {
    LinearReg(LinearModel),
    LogisticReg(LogRegModel),
    BoostTree(GbdtStumpModel),
    NearestNeighbor(KnnModel),
}

impl FittedModel {
    pub fn mode(&self) -> OutcomeKind {
        match self {
            FittedModel::LinearReg(_) => OutcomeKind::Regression,
            FittedModel::LogisticReg(_) => OutcomeKind::Classification,
            FittedModel::BoostTree(model) => match model.mode {
                BoostMode::Regression => OutcomeKind::Regression,
                BoostMode::Classification { .. } => OutcomeKind::Classification,
            },
            FittedModel::NearestNeighbor(model) => match model.outcome {
                KnnOutcome::Regression { .. } => OutcomeKind::Regression,
                KnnOutcome::Classification { .. } => OutcomeKind::Classification,
            },
        }
    }

    /// Class levels seen in training (empty for regression).
    pub fn levels(&self) -> &[String] {
        match self {
            FittedModel::LogisticReg(model) => &model.classes,
            FittedModel::BoostTree(GbdtStumpModel {
                mode: BoostMode::Classification { classes },
                ..
            }) => classes,
            FittedModel::NearestNeighbor(KnnModel {
                outcome: KnnOutcome::Classification { classes, .. },
                ..
            }) => classes,
            _ => &[],
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            FittedModel::LinearReg(model) => model.n_features(),
            FittedModel::LogisticReg(model) => model.n_features,
            FittedModel::BoostTree(model) => model.n_features,
            FittedModel::NearestNeighbor(model) => model.n_features(),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Predictions, ModelError> {
        Ok(match self {
            FittedModel::LinearReg(model) => Predictions::Numeric {
                values: model.predict(x)?,
            },
            FittedModel::LogisticReg(model) => {
                Predictions::from_probabilities(model.classes.clone(), model.predict_proba(x)?)
            }
            FittedModel::BoostTree(model) => match &model.mode {
                BoostMode::Regression => Predictions::Numeric {
                    values: model.predict_values(x)?,
                },
                BoostMode::Classification { classes } => {
                    Predictions::from_probabilities(classes.clone(), model.predict_proba(x)?)
                }
            },
            FittedModel::NearestNeighbor(model) => match &model.outcome {
                KnnOutcome::Regression { .. } => Predictions::Numeric {
                    values: model.predict_values(x)?,
                },
                KnnOutcome::Classification { classes, .. } => {
                    Predictions::from_probabilities(classes.clone(), model.predict_proba(x)?)
                }
            },
        })
    }
}

/// Model output for a batch of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predictions {
    Numeric {
        values: Vec<f64>,
    },
    Classes {
        /// Training levels; probability columns follow this order.
        levels: Vec<String>,
        probabilities: Vec<Vec<f64>>,
        /// Index into `levels` of the most probable class per row.
        predicted: Vec<usize>,
    },
}

impl Predictions {
    pub fn from_probabilities(levels: Vec<String>, probabilities: Vec<Vec<f64>>) -> Self {
        let predicted = probabilities.iter().map(|p| argmax(p)).collect();
        Predictions::Classes {
            levels,
            probabilities,
            predicted,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Predictions::Numeric { values } => values.len(),
            Predictions::Classes { predicted, .. } => predicted.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Predicted class labels; empty for numeric predictions.
    pub fn predicted_labels(&self) -> Vec<String> {
        match self {
            Predictions::Numeric { .. } => Vec::new(),
            Predictions::Classes {
                levels, predicted, ..
            } => predicted.iter().map(|&idx| levels[idx].clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sim;

    #[test]
    fn mode_mismatch_is_rejected() {
        let data = sim::sim_two_class(50, 1);
        let x = data.predictor_matrix().unwrap();
        let target = Target::from_dataset(&data).unwrap();
        let err = ModelSpec::linear_reg().fit(&x, &target).unwrap_err();
        assert!(matches!(
            err,
            ModelError::ModeMismatch {
                model: "linear_reg",
                ..
            }
        ));
    }

    #[test]
    fn set_param_by_name() {
        let mut spec = ModelSpec::boost_tree();
        spec.set_param("trees", 12.4).unwrap();
        spec.set_param("learn_rate", 0.3).unwrap();
        assert!(matches!(
            spec,
            ModelSpec::BoostTree { trees: 12, learn_rate, .. } if learn_rate == 0.3
        ));
        assert!(matches!(
            spec.set_param("neighbors", 3.0),
            Err(ModelError::UnknownParameter { .. })
        ));
        assert!(spec.set_param("trees", 0.0).is_err());
    }

    #[test]
    fn fitted_models_round_trip_through_json() {
        let data = sim::sim_two_class(80, 4);
        let x = data.predictor_matrix().unwrap();
        let target = Target::from_dataset(&data).unwrap();
        let fitted = ModelSpec::nearest_neighbor().fit(&x, &target).unwrap();
        let json = serde_json::to_string(&fitted).unwrap();
        let back: FittedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.levels(), &["class_1", "class_2"]);
        assert_eq!(back.n_features(), 2);
        let preds = back.predict(&x).unwrap();
        assert_eq!(preds.len(), 80);
        assert_eq!(
            preds.predicted_labels(),
            fitted.predict(&x).unwrap().predicted_labels()
        );
    }

    #[test]
    fn spec_parses_from_toml_with_defaults() {
        let spec: ModelSpec = toml::from_str("model = \"nearest_neighbor\"\nneighbors = 9\n").unwrap();
        assert_eq!(
            spec,
            ModelSpec::NearestNeighbor {
                neighbors: 9,
                weight_func: WeightFunc::Rectangular
            }
        );
    }
}
