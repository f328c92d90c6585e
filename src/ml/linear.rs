//! Least squares regression with an optional ridge penalty.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::linalg::cholesky_solve;

/// Fitted linear model on the original predictor scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub penalty: f64,
}

impl LinearModel {
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        let beta = Array1::from(self.coefficients.clone());
        Ok(x.dot(&beta).iter().map(|v| v + self.intercept).collect())
    }
}

/// Fit `y ~ x` minimizing `RSS / (2n) + penalty / 2 * |beta|^2`.
///
/// Predictors and outcome are centered first, so the intercept is never
/// penalized. A rank-deficient unpenalized system gets a tiny diagonal jitter
/// before giving up.
pub fn fit_linear(x: &Array2<f64>, y: &[f64], penalty: f64) -> Result<LinearModel, ModelError> {
    if !penalty.is_finite() || penalty < 0.0 {
        return Err(ModelError::InvalidHyperparameter {
            name: "penalty".to_string(),
            reason: "must be a non-negative number".to_string(),
        });
    }
    let n = x.nrows();
    let p = x.ncols();
    let Some(x_means) = x.mean_axis(Axis(0)) else {
        return Err(ModelError::EmptyTrainingData);
    };
    let y_mean = y.iter().sum::<f64>() / n as f64;
    if p == 0 {
        return Ok(LinearModel {
            intercept: y_mean,
            coefficients: Vec::new(),
            penalty,
        });
    }
    let xc = x - &x_means.view().insert_axis(Axis(0));
    let yc = Array1::from_iter(y.iter().map(|v| v - y_mean));

    let mut gram = xc.t().dot(&xc);
    let rhs = xc.t().dot(&yc);
    let ridge = penalty * n as f64;
    for j in 0..p {
        gram[[j, j]] += ridge;
    }
    let beta = match cholesky_solve(&gram, &rhs) {
        Some(beta) => beta,
        None => {
            let scale = (0..p).map(|j| gram[[j, j]]).fold(1.0f64, f64::max);
            for j in 0..p {
                gram[[j, j]] += 1e-10 * scale;
            }
            cholesky_solve(&gram, &rhs).ok_or(ModelError::SingularSystem)?
        }
    };
    let intercept = y_mean - x_means.dot(&beta);
    Ok(LinearModel {
        intercept,
        coefficients: beta.to_vec(),
        penalty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn recovers_exact_linear_relationship() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 3.0]];
        let y: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| 2.0 + 3.0 * row[0] - 1.5 * row[1])
            .collect();
        let model = fit_linear(&x, &y, 0.0).unwrap();
        assert!((model.intercept - 2.0).abs() < 1e-8);
        assert!((model.coefficients[0] - 3.0).abs() < 1e-8);
        assert!((model.coefficients[1] + 1.5).abs() < 1e-8);
    }

    #[test]
    fn penalty_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = [2.0, 4.0, 6.0, 8.0];
        let free = fit_linear(&x, &y, 0.0).unwrap();
        let shrunk = fit_linear(&x, &y, 1.0).unwrap();
        assert!(shrunk.coefficients[0].abs() < free.coefficients[0].abs());
        // intercept keeps predictions centered on the outcome mean
        let preds = shrunk.predict(&array![[2.5]]).unwrap();
        assert!((preds[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn predict_checks_feature_count() {
        let model = fit_linear(&array![[1.0], [2.0]], &[1.0, 2.0], 0.0).unwrap();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0]]),
            Err(ModelError::FeatureMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }
}
