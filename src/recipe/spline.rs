//! Natural cubic spline basis expansion.

use serde::{Deserialize, Serialize};

use crate::stats::quantile;

use super::RecipeError;

/// Fitted natural spline basis for one column.
///
/// `knots` holds the boundary knots at both ends with the interior knots
/// between them; `deg_free = knots.len() - 1` basis columns are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineBasis {
    pub column: String,
    pub knots: Vec<f64>,
}

impl SplineBasis {
    /// Place boundary knots at the training range and interior knots at
    /// evenly spaced training quantiles.
    pub fn fit(column: &str, values: &[f64], deg_free: usize) -> Result<Self, RecipeError> {
        if deg_free == 0 {
            return Err(RecipeError::InvalidParameter {
                name: "deg_free".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(RecipeError::DegenerateSpline {
                column: column.to_string(),
                reason: "no finite values".to_string(),
            });
        }
        let n_knots = deg_free + 1;
        let knots: Vec<f64> = (0..n_knots)
            .map(|k| quantile(&finite, k as f64 / (n_knots - 1) as f64))
            .collect();
        if knots.windows(2).any(|w| w[1] <= w[0]) {
            return Err(RecipeError::DegenerateSpline {
                column: column.to_string(),
                reason: format!("too few distinct values for {deg_free} degrees of freedom"),
            });
        }
        Ok(Self {
            column: column.to_string(),
            knots,
        })
    }

    pub fn deg_free(&self) -> usize {
        self.knots.len() - 1
    }

    /// Basis values for one observation; `NaN` in, `NaN` out.
    ///
    /// Uses the truncated-power construction `N_1 = u`,
    /// `N_{k+1} = d_k(u) - d_{K-1}(u)` on `u` rescaled to the boundary range,
    /// which is linear beyond both boundary knots.
    pub fn evaluate(&self, x: f64) -> Vec<f64> {
        let df = self.deg_free();
        if !x.is_finite() {
            return vec![f64::NAN; df];
        }
        let lo = self.knots[0];
        let hi = self.knots[self.knots.len() - 1];
        let span = hi - lo;
        let u = (x - lo) / span;
        let scaled: Vec<f64> = self.knots.iter().map(|k| (k - lo) / span).collect();
        let k_last = scaled.len() - 1;
        let d = |k: usize| -> f64 {
            let cube = |z: f64| if z > 0.0 { z * z * z } else { 0.0 };
            (cube(u - scaled[k]) - cube(u - scaled[k_last])) / (scaled[k_last] - scaled[k])
        };
        let mut out = Vec::with_capacity(df);
        out.push(u);
        if k_last >= 2 {
            let d_ref = d(k_last - 1);
            for k in 0..(k_last - 1) {
                out.push(d(k) - d_ref);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<f64> {
        (0..=100).map(|v| v as f64 / 10.0).collect()
    }

    #[test]
    fn produces_requested_columns() {
        let basis = SplineBasis::fit("x", &grid(), 4).unwrap();
        assert_eq!(basis.knots.len(), 5);
        assert_eq!(basis.evaluate(3.3).len(), 4);
        assert_eq!(basis.knots[0], 0.0);
        assert_eq!(basis.knots[4], 10.0);
    }

    #[test]
    fn basis_is_linear_beyond_boundaries() {
        let basis = SplineBasis::fit("x", &grid(), 5).unwrap();
        for side in [(-3.0, -2.0, -1.0), (11.0, 12.0, 13.0)] {
            let a = basis.evaluate(side.0);
            let b = basis.evaluate(side.1);
            let c = basis.evaluate(side.2);
            for j in 0..a.len() {
                let second_diff = a[j] - 2.0 * b[j] + c[j];
                assert!(second_diff.abs() < 1e-9, "column {j} curves outside");
            }
        }
    }

    #[test]
    fn rejects_constant_column() {
        let err = SplineBasis::fit("x", &[1.0; 30], 3).unwrap_err();
        assert!(matches!(err, RecipeError::DegenerateSpline { .. }));
    }
}
