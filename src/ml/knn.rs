//! k-nearest-neighbor regression and classification.

use ndarray::{Array2, ArrayView1};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{ModelError, Target, check_training_input, column_scaling, encode_labels};

/// How neighbors are weighted when combining their outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFunc {
    #[default]
    Rectangular,
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum KnnOutcome {
    Regression { values: Vec<f64> },
    Classification { classes: Vec<String>, codes: Vec<usize> },
}

/// Stored training rows on the standardized scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    pub neighbors: usize,
    pub weight_func: WeightFunc,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    /// Row-major standardized training predictors.
    pub rows: Vec<Vec<f64>>,
    pub outcome: KnnOutcome,
}

pub fn fit_knn(
    x: &Array2<f64>,
    target: &Target,
    neighbors: usize,
    weight_func: WeightFunc,
) -> Result<KnnModel, ModelError> {
    check_training_input(x, target)?;
    if neighbors == 0 {
        return Err(ModelError::InvalidHyperparameter {
            name: "neighbors".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let (means, scales) = column_scaling(x);
    let rows = x
        .rows()
        .into_iter()
        .map(|row| standardize(row, &means, &scales))
        .collect();
    let outcome = match target {
        Target::Numeric(values) => KnnOutcome::Regression {
            values: values.clone(),
        },
        Target::Labels(labels) => {
            let (classes, codes) = encode_labels(labels);
            if classes.len() < 2 {
                return Err(ModelError::TooFewClasses(classes.len()));
            }
            KnnOutcome::Classification { classes, codes }
        }
    };
    Ok(KnnModel {
        neighbors,
        weight_func,
        means,
        scales,
        rows,
        outcome,
    })
}

fn standardize(row: ArrayView1<'_, f64>, means: &[f64], scales: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means.iter().zip(scales))
        .map(|(v, (mean, scale))| (v - mean) / scale)
        .collect()
}

impl KnnModel {
    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    /// Indices and weights of the nearest training rows; ties break by row index.
    fn nearest(&self, query: &[f64]) -> Vec<(usize, f64)> {
        let mut distances: Vec<(OrderedFloat<f64>, usize)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let d2: f64 = row
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (OrderedFloat(d2.sqrt()), idx)
            })
            .collect();
        let k = self.neighbors.min(distances.len());
        distances.sort_unstable();
        distances
            .into_iter()
            .take(k)
            .map(|(dist, idx)| {
                let weight = match self.weight_func {
                    WeightFunc::Rectangular => 1.0,
                    WeightFunc::Inverse => 1.0 / dist.0.max(1e-12),
                };
                (idx, weight)
            })
            .collect()
    }

    fn check_features(&self, x: &Array2<f64>) -> Result<(), ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok(())
    }

    /// Weighted mean of neighbor outcomes (regression).
    pub fn predict_values(&self, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        self.check_features(x)?;
        let KnnOutcome::Regression { values } = &self.outcome else {
            return Err(ModelError::ModeMismatch {
                model: "nearest_neighbor",
                mode: crate::data::OutcomeKind::Regression,
            });
        };
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let query = standardize(row, &self.means, &self.scales);
                let nearest = self.nearest(&query);
                let total: f64 = nearest.iter().map(|(_, w)| w).sum();
                nearest.iter().map(|(idx, w)| values[*idx] * w).sum::<f64>() / total
            })
            .collect())
    }

    /// Weighted neighbor votes per class (classification).
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<Vec<f64>>, ModelError> {
        self.check_features(x)?;
        let KnnOutcome::Classification { classes, codes } = &self.outcome else {
            return Err(ModelError::ModeMismatch {
                model: "nearest_neighbor",
                mode: crate::data::OutcomeKind::Classification,
            });
        };
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let query = standardize(row, &self.means, &self.scales);
                let mut votes = vec![0.0f64; classes.len()];
                for (idx, weight) in self.nearest(&query) {
                    votes[codes[idx]] += weight;
                }
                let total: f64 = votes.iter().sum();
                votes.iter().map(|v| v / total).collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn one_neighbor_reproduces_training_outcome() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let model = fit_knn(
            &x,
            &Target::Numeric(vec![1.0, 2.0, 3.0, 4.0]),
            1,
            WeightFunc::Rectangular,
        )
        .unwrap();
        assert_eq!(model.predict_values(&x).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn votes_become_probabilities() {
        let x = array![[0.0], [0.1], [0.2], [5.0]];
        let y = Target::Labels(vec!["a".into(), "a".into(), "b".into(), "b".into()]);
        let model = fit_knn(&x, &y, 3, WeightFunc::Rectangular).unwrap();
        let probs = model.predict_proba(&array![[0.05]]).unwrap();
        assert!((probs[0][0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((probs[0][1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn inverse_weights_favor_close_rows() {
        let x = array![[0.0], [1.0], [4.0]];
        let model = fit_knn(
            &x,
            &Target::Numeric(vec![0.0, 10.0, 100.0]),
            3,
            WeightFunc::Inverse,
        )
        .unwrap();
        let pred = model.predict_values(&array![[0.9]]).unwrap()[0];
        assert!(pred > 10.0 && pred < 40.0);
    }
}
