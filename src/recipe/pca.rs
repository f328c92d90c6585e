use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::linalg::symmetric_eigen;

use super::RecipeError;

/// Fitted principal component projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaProjection {
    /// Input columns, in the order the rotation expects.
    pub columns: Vec<String>,
    /// Training means used for centering.
    pub means: Vec<f64>,
    /// One loading vector per retained component.
    pub rotation: Vec<Vec<f64>>,
    /// Variance of every component (all eigenvalues, descending).
    pub variances: Vec<f64>,
}

impl PcaProjection {
    /// `columns` are the training values of each selected column.
    pub fn fit(
        names: Vec<String>,
        columns: &[&[f64]],
        num_comp: usize,
        threshold: Option<f64>,
    ) -> Result<Self, RecipeError> {
        let p = columns.len();
        if p == 0 {
            return Ok(Self {
                columns: names,
                means: Vec::new(),
                rotation: Vec::new(),
                variances: Vec::new(),
            });
        }
        let n = columns[0].len();
        if n < 2 {
            return Err(RecipeError::InvalidParameter {
                name: "num_comp".to_string(),
                reason: "PCA needs at least two training rows".to_string(),
            });
        }
        if columns.iter().any(|col| col.iter().any(|v| !v.is_finite())) {
            return Err(RecipeError::InvalidParameter {
                name: "num_comp".to_string(),
                reason: "PCA inputs contain missing values; impute first".to_string(),
            });
        }
        let means: Vec<f64> = columns
            .iter()
            .map(|col| col.iter().sum::<f64>() / n as f64)
            .collect();
        let mut cov = Array2::<f64>::zeros((p, p));
        for a in 0..p {
            for b in a..p {
                let mut sum = 0.0;
                for i in 0..n {
                    sum += (columns[a][i] - means[a]) * (columns[b][i] - means[b]);
                }
                let c = sum / (n - 1) as f64;
                cov[[a, b]] = c;
                cov[[b, a]] = c;
            }
        }
        let (values, vectors) = symmetric_eigen(cov.view());
        let variances: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
        let keep = match threshold {
            Some(t) => components_for_threshold(&variances, t),
            None => num_comp.clamp(1, p),
        };
        let rotation = (0..keep).map(|k| vectors.column(k).to_vec()).collect();
        Ok(Self {
            columns: names,
            means,
            rotation,
            variances,
        })
    }

    pub fn num_comp(&self) -> usize {
        self.rotation.len()
    }

    /// Share of total variance captured by each component.
    pub fn variance_ratio(&self) -> Vec<f64> {
        let total: f64 = self.variances.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.variances.len()];
        }
        self.variances.iter().map(|v| v / total).collect()
    }

    /// Component names, zero-padded so they sort in order.
    pub fn component_names(&self) -> Vec<String> {
        let width = self.num_comp().max(1).to_string().len();
        (1..=self.num_comp())
            .map(|k| format!("PC{:0width$}", k, width = width))
            .collect()
    }

    /// Project one row of inputs (ordered as `columns`).
    pub fn project(&self, row: &[f64]) -> Vec<f64> {
        self.rotation
            .iter()
            .map(|loading| {
                loading
                    .iter()
                    .zip(row.iter().zip(self.means.iter()))
                    .map(|(w, (x, m))| w * (x - m))
                    .sum()
            })
            .collect()
    }
}

fn components_for_threshold(variances: &[f64], threshold: f64) -> usize {
    let total: f64 = variances.iter().sum();
    if total <= 0.0 {
        return 1;
    }
    let mut cumulative = 0.0;
    for (k, v) in variances.iter().enumerate() {
        cumulative += v / total;
        if cumulative >= threshold - 1e-12 {
            return k + 1;
        }
    }
    variances.len()
}
