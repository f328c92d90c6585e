use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::ml::ModelError;

/// Single-node decision tree used as a weak learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    /// Feature index used for the split.
    pub feature_index: usize,
    /// Threshold in feature units.
    pub threshold: f64,
    /// Prediction for `feature <= threshold`.
    pub left_value: f64,
    /// Prediction for `feature > threshold`.
    pub right_value: f64,
}

impl Stump {
    /// Predict the stump value for a feature vector.
    pub fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        let value = features.get(self.feature_index).copied().unwrap_or(0.0);
        if value <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// What the raw scores of a boosted model mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BoostMode {
    /// One raw score per row: the predicted value.
    Regression,
    /// One raw logit per class.
    Classification { classes: Vec<String> },
}

/// Gradient-boosted decision stump model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtStumpModel {
    /// Model format version.
    pub model_version: i64,
    pub mode: BoostMode,
    /// Number of predictors per row.
    pub n_features: usize,
    /// Learning rate applied to each stump prediction.
    pub learning_rate: f64,
    /// Initial raw scores before boosting rounds.
    pub init_raw: Vec<f64>,
    /// Shape: `[n_rounds][n_outputs]`.
    pub stumps: Vec<Vec<Stump>>,
}

impl GbdtStumpModel {
    /// Number of raw scores per row.
    pub fn n_outputs(&self) -> usize {
        match &self.mode {
            BoostMode::Regression => 1,
            BoostMode::Classification { classes } => classes.len(),
        }
    }

    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        if let BoostMode::Classification { classes } = &self.mode {
            if classes.len() < 2 {
                return Err(ModelError::TooFewClasses(classes.len()));
            }
        }
        let outputs = self.n_outputs();
        if self.init_raw.len() != outputs {
            return Err(ModelError::FeatureMismatch {
                expected: outputs,
                actual: self.init_raw.len(),
            });
        }
        for round in &self.stumps {
            if round.len() != outputs {
                return Err(ModelError::FeatureMismatch {
                    expected: outputs,
                    actual: round.len(),
                });
            }
        }
        Ok(())
    }

    /// Predict raw scores for a feature vector.
    pub fn predict_raw(&self, features: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut raw = self.init_raw.clone();
        for round in &self.stumps {
            for (output_idx, stump) in round.iter().enumerate() {
                raw[output_idx] += self.learning_rate * stump.predict(features);
            }
        }
        raw
    }

    fn check_features(&self, x: &Array2<f64>) -> Result<(), ModelError> {
        if x.ncols() != self.n_features {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok(())
    }

    /// Predicted values (regression) for every row.
    pub fn predict_values(&self, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        self.check_features(x)?;
        Ok(x.rows().into_iter().map(|row| self.predict_raw(row)[0]).collect())
    }

    /// Class probabilities (classification) for every row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<Vec<f64>>, ModelError> {
        self.check_features(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| softmax(&self.predict_raw(row)))
            .collect())
    }
}

/// Softmax of `raw`, shifted by its max so large logits do not overflow.
///
/// Falls back to a uniform distribution when the logits are not finite.
pub fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = raw.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![1.0 / raw.len() as f64; raw.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ties_go_left_and_missing_features_read_as_zero() {
        let stump = Stump {
            feature_index: 1,
            threshold: 0.5,
            left_value: -1.0,
            right_value: 2.0,
        };
        assert_eq!(stump.predict(array![9.0, 0.5].view()), -1.0);
        assert_eq!(stump.predict(array![9.0, 0.6].view()), 2.0);
        assert_eq!(stump.predict(array![9.0].view()), -1.0);
    }

    #[test]
    fn regression_model_rejects_wrong_width() {
        let model = GbdtStumpModel {
            model_version: 1,
            mode: BoostMode::Regression,
            n_features: 2,
            learning_rate: 0.5,
            init_raw: vec![10.0],
            stumps: vec![vec![Stump {
                feature_index: 0,
                threshold: 0.0,
                left_value: -2.0,
                right_value: 2.0,
            }]],
        };
        assert_eq!(model.predict_values(&array![[-1.0, 0.0], [1.0, 0.0]]).unwrap(), vec![9.0, 11.0]);
        assert!(matches!(
            model.predict_values(&array![[1.0]]),
            Err(ModelError::FeatureMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn class_logits_follow_their_stumps() {
        let model = GbdtStumpModel {
            model_version: 1,
            mode: BoostMode::Classification {
                classes: vec!["a".into(), "b".into()],
            },
            n_features: 2,
            learning_rate: 1.0,
            init_raw: vec![0.0, 0.0],
            stumps: vec![vec![
                Stump {
                    feature_index: 0,
                    threshold: 0.0,
                    left_value: 1.0,
                    right_value: -1.0,
                },
                Stump {
                    feature_index: 0,
                    threshold: 0.0,
                    left_value: -1.0,
                    right_value: 1.0,
                },
            ]],
        };
        model.validate().unwrap();
        let probs = model.predict_proba(&array![[0.0, 0.0], [1.0, 0.0]]).unwrap();
        assert!(probs[0][0] > probs[0][1]);
        assert!(probs[1][1] > probs[1][0]);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-12);
        assert!(softmax(&[]).is_empty());
        assert_eq!(softmax(&[f64::NAN, 0.0]), vec![0.5, 0.5]);
    }
}
