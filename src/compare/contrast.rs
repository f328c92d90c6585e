use serde::{Deserialize, Serialize};

use super::CompareError;
use crate::ml::metrics::MetricKind;
use crate::stats;
use crate::tune::ResampleResults;

/// Differences `a - b` over resamples scored for both with defined values.
pub fn paired_differences(a: &ResampleResults, b: &ResampleResults, metric: MetricKind) -> Vec<f64> {
    a.values(metric)
        .into_iter()
        .filter(|(_, value)| !value.is_nan())
        .filter_map(|(id, value)| {
            b.values(metric)
                .into_iter()
                .find(|(other, v)| *other == id && !v.is_nan())
                .map(|(_, other)| value - other)
        })
        .collect()
}

fn check_pairs(a: &str, b: &str, metric: MetricKind, differences: &[f64]) -> Result<(), CompareError> {
    if differences.len() < 2 {
        return Err(CompareError::TooFewPairs {
            a: a.to_string(),
            b: b.to_string(),
            metric,
            n: differences.len(),
        });
    }
    Ok(())
}

/// Paired t-test of the per-resample differences `a - b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedComparison {
    pub a: String,
    pub b: String,
    pub metric: MetricKind,
    pub n: usize,
    pub mean_difference: f64,
    pub std_err: f64,
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
    /// 95% confidence interval of the mean difference.
    pub conf_low: f64,
    pub conf_high: f64,
}

impl PairedComparison {
    pub(super) fn new(
        a: &str,
        b: &str,
        metric: MetricKind,
        differences: &[f64],
    ) -> Result<Self, CompareError> {
        check_pairs(a, b, metric, differences)?;
        let Some(test) = stats::paired_t(differences) else {
            return Err(CompareError::TooFewPairs {
                a: a.to_string(),
                b: b.to_string(),
                metric,
                n: differences.len(),
            });
        };
        let half_width = stats::student_t_quantile(0.975, test.df) * test.std_err;
        Ok(Self {
            a: a.to_string(),
            b: b.to_string(),
            metric,
            n: differences.len(),
            mean_difference: test.mean,
            std_err: test.std_err,
            t: test.t,
            df: test.df,
            p_value: test.p_value,
            conf_low: test.mean - half_width,
            conf_high: test.mean + half_width,
        })
    }
}

/// Posterior summary of the mean difference `a - b`.
///
/// With a normal likelihood and the non-informative prior, the posterior of
/// the mean difference is a Student-t with `n - 1` degrees of freedom centred
/// on the sample mean and scaled by its standard error. "Better" follows the
/// metric's direction, and the practical probabilities only count differences
/// beyond the ROPE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contrast {
    pub a: String,
    pub b: String,
    pub metric: MetricKind,
    pub n: usize,
    pub mean: f64,
    pub std_err: f64,
    pub prob: f64,
    pub lower: f64,
    pub upper: f64,
    pub prob_a_better: f64,
    pub prob_b_better: f64,
    pub rope: f64,
    /// Posterior mass inside `[-rope, rope]`.
    pub prob_practically_equivalent: f64,
    pub prob_a_practically_better: f64,
    pub prob_b_practically_better: f64,
}

impl Contrast {
    pub(super) fn new(
        a: &str,
        b: &str,
        metric: MetricKind,
        differences: &[f64],
        rope: f64,
        prob: f64,
    ) -> Result<Self, CompareError> {
        if !(prob > 0.0 && prob < 1.0) {
            return Err(CompareError::InvalidProbability(prob));
        }
        if !rope.is_finite() || rope < 0.0 {
            return Err(CompareError::InvalidRope(rope));
        }
        check_pairs(a, b, metric, differences)?;
        let posterior = Posterior {
            mean: stats::mean(differences),
            scale: stats::std_err(differences),
            df: (differences.len() - 1) as f64,
        };
        let (lower, upper) = posterior.interval(prob);
        let above_zero = 1.0 - posterior.cdf(0.0);
        let below_zero = posterior.cdf(0.0);
        let above_rope = 1.0 - posterior.cdf(rope);
        let below_rope = posterior.cdf(-rope);
        let (prob_a_better, prob_b_better, prob_a_practically_better, prob_b_practically_better) =
            if metric.higher_is_better() {
                (above_zero, below_zero, above_rope, below_rope)
            } else {
                (below_zero, above_zero, below_rope, above_rope)
            };
        Ok(Self {
            a: a.to_string(),
            b: b.to_string(),
            metric,
            n: differences.len(),
            mean: posterior.mean,
            std_err: posterior.scale,
            prob,
            lower,
            upper,
            prob_a_better,
            prob_b_better,
            rope,
            prob_practically_equivalent: (1.0 - above_rope - below_rope).clamp(0.0, 1.0),
            prob_a_practically_better,
            prob_b_practically_better,
        })
    }
}

/// Location-scale Student-t; a zero scale is a point mass at `mean`.
struct Posterior {
    mean: f64,
    scale: f64,
    df: f64,
}

impl Posterior {
    fn cdf(&self, x: f64) -> f64 {
        if self.scale > 0.0 {
            stats::student_t_cdf((x - self.mean) / self.scale, self.df)
        } else if x >= self.mean {
            1.0
        } else {
            0.0
        }
    }

    fn interval(&self, prob: f64) -> (f64, f64) {
        if self.scale > 0.0 {
            let q = stats::student_t_quantile(0.5 + prob / 2.0, self.df);
            (self.mean - q * self.scale, self.mean + q * self.scale)
        } else {
            (self.mean, self.mean)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contrast_follows_metric_direction() {
        let diffs = [-0.5, -0.4, -0.6, -0.45, -0.55];
        let rmse = Contrast::new("a", "b", MetricKind::Rmse, &diffs, 0.1, 0.9).unwrap();
        assert!(rmse.prob_a_better > 0.99);
        assert!(rmse.prob_a_practically_better > 0.99);
        assert!(rmse.lower < rmse.mean && rmse.mean < rmse.upper);
        let rsq = Contrast::new("a", "b", MetricKind::Rsq, &diffs, 0.1, 0.9).unwrap();
        assert!(rsq.prob_b_better > 0.99);
        let total = rsq.prob_practically_equivalent
            + rsq.prob_a_practically_better
            + rsq.prob_b_practically_better;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn small_difference_falls_in_rope() {
        let diffs = [0.001, -0.002, 0.0015, 0.0, -0.001, 0.0005];
        let contrast = Contrast::new("a", "b", MetricKind::Accuracy, &diffs, 0.02, 0.95).unwrap();
        assert!(contrast.prob_practically_equivalent > 0.99);
    }

    #[test]
    fn constant_differences_are_a_point_mass() {
        let contrast =
            Contrast::new("a", "b", MetricKind::Accuracy, &[0.25, 0.25, 0.25], 0.125, 0.9).unwrap();
        assert_eq!(contrast.std_err, 0.0);
        assert_eq!((contrast.lower, contrast.upper), (0.25, 0.25));
        assert_eq!(contrast.prob_a_better, 1.0);
        assert_eq!(contrast.prob_a_practically_better, 1.0);
        assert_eq!(contrast.prob_practically_equivalent, 0.0);
    }

    #[test]
    fn rejects_bad_probability() {
        assert!(matches!(
            Contrast::new("a", "b", MetricKind::Rmse, &[1.0, 2.0], 0.0, 1.0),
            Err(CompareError::InvalidProbability(_))
        ));
    }
}
