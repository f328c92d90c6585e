//! Multinomial logistic regression trained by mini-batch gradient descent.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::ModelError;
use super::gbdt_stump::softmax;

mod train;
pub use train::{TrainOptions, train_logreg};

/// Softmax regression over standardized predictors.
///
/// Weights are stored class-major: `weights[c * n_features + j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRegModel {
    pub model_version: i64,
    pub classes: Vec<String>,
    pub n_features: usize,
    /// Training means used to center each predictor.
    pub means: Vec<f64>,
    /// Training standard deviations used to scale each predictor.
    pub scales: Vec<f64>,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

impl LogRegModel {
    /// Validate the model dimensions.
    pub fn validate(&self) -> Result<(), ModelError> {
        let classes = self.classes.len();
        if classes < 2 {
            return Err(ModelError::TooFewClasses(classes));
        }
        let consistent = self.weights.len() == classes * self.n_features
            && self.bias.len() == classes
            && self.means.len() == self.n_features
            && self.scales.len() == self.n_features;
        if !consistent {
            return Err(ModelError::FeatureMismatch {
                expected: classes * self.n_features,
                actual: self.weights.len(),
            });
        }
        Ok(())
    }

    fn logits(&self, row: &[f64]) -> Vec<f64> {
        let width = self.n_features;
        self.bias
            .iter()
            .enumerate()
            .map(|(c, b)| {
                let w = &self.weights[c * width..(c + 1) * width];
                b + w.iter().zip(row).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect()
    }

    fn standardize(&self, row: impl Iterator<Item = f64>) -> Vec<f64> {
        row.zip(self.means.iter().zip(&self.scales))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect()
    }

    /// Class probabilities for every row of `x`.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<Vec<f64>>, ModelError> {
        if x.ncols() != self.n_features {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| softmax(&self.logits(&self.standardize(row.iter().copied()))))
            .collect())
    }
}
