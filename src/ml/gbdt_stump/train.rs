use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::model::{BoostMode, GbdtStumpModel, Stump, softmax};
use crate::ml::{ModelError, Target, check_training_input, encode_labels};

/// Training hyperparameters for stump boosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    /// Number of boosting rounds.
    pub rounds: usize,
    /// Learning rate applied per round.
    pub learning_rate: f64,
    /// Number of bins used for split search.
    pub bins: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            bins: 32,
        }
    }
}

/// Train a stump-GBDT model.
///
/// Numeric targets use squared-error boosting from the outcome mean; class
/// labels use softmax boosting from the log class priors.
pub fn train_gbdt_stump(
    x: &Array2<f64>,
    target: &Target,
    options: &TrainOptions,
) -> Result<GbdtStumpModel, ModelError> {
    check_training_input(x, target)?;
    if !(options.learning_rate > 0.0) {
        return Err(ModelError::InvalidHyperparameter {
            name: "learn_rate".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    let n = x.nrows();
    let d = x.ncols();
    let binned = BinnedFeatures::new(x, options.bins);

    let (mode, init_raw, objective) = match target {
        Target::Numeric(y) => {
            let mean = y.iter().sum::<f64>() / n as f64;
            (
                BoostMode::Regression,
                vec![mean],
                Objective::Squared(y.clone()),
            )
        }
        Target::Labels(labels) => {
            let (classes, y) = encode_labels(labels);
            let n_classes = classes.len();
            if n_classes < 2 {
                return Err(ModelError::TooFewClasses(n_classes));
            }
            let priors = class_priors(&y, n_classes);
            let init = priors.iter().map(|&p| p.max(1e-6).ln()).collect();
            (
                BoostMode::Classification { classes },
                init,
                Objective::Softmax { y, n_classes },
            )
        }
    };
    let n_outputs = init_raw.len();
    let mut raw = vec![init_raw.clone(); n];

    let mut rounds_out: Vec<Vec<Stump>> = Vec::with_capacity(options.rounds);
    for _round in 0..options.rounds {
        let residuals = objective.residuals(&raw);
        let mut stumps_for_round = Vec::with_capacity(n_outputs);
        for (output_idx, output_residuals) in residuals.iter().enumerate() {
            let stump = if d == 0 {
                constant_stump(output_residuals)
            } else {
                binned.best_stump(x, output_residuals)
            };
            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i][output_idx] += options.learning_rate * stump.predict(row);
            }
            stumps_for_round.push(stump);
        }
        rounds_out.push(stumps_for_round);
    }

    let model = GbdtStumpModel {
        model_version: 1,
        mode,
        n_features: d,
        learning_rate: options.learning_rate,
        init_raw,
        stumps: rounds_out,
    };
    model.validate()?;
    Ok(model)
}

/// Loss whose negative gradient each round fits.
enum Objective {
    Squared(Vec<f64>),
    Softmax { y: Vec<usize>, n_classes: usize },
}

impl Objective {
    /// Negative gradients, one vector per raw output.
    fn residuals(&self, raw: &[Vec<f64>]) -> Vec<Vec<f64>> {
        match self {
            Objective::Squared(y) => vec![y.iter().zip(raw).map(|(yi, r)| yi - r[0]).collect()],
            Objective::Softmax { y, n_classes } => {
                let probs: Vec<Vec<f64>> = raw.iter().map(|r| softmax(r)).collect();
                compute_residuals(y, &probs, *n_classes)
            }
        }
    }
}

fn class_priors(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y.iter().filter(|&&label| label < n_classes) {
        counts[label] += 1;
    }
    let total = y.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}

/// One-hot target minus predicted probability, per class.
fn compute_residuals(y: &[usize], probs: &[Vec<f64>], n_classes: usize) -> Vec<Vec<f64>> {
    (0..n_classes)
        .map(|k| {
            y.iter()
                .zip(probs)
                .map(|(&yi, p)| f64::from(u8::from(yi == k)) - p[k])
                .collect()
        })
        .collect()
}

fn constant_stump(residuals: &[f64]) -> Stump {
    let mean = residuals.iter().sum::<f64>() / residuals.len().max(1) as f64;
    Stump {
        feature_index: 0,
        threshold: f64::INFINITY,
        left_value: mean,
        right_value: mean,
    }
}

/// Finite range of one column; constant or empty columns get a unit width.
#[derive(Debug, Clone, Copy)]
struct FeatureRange {
    min: f64,
    max: f64,
}

impl FeatureRange {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let (min, max) = values
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let min = if min.is_finite() { min } else { 0.0 };
        let max = if max.is_finite() && max > min { max } else { min + 1.0 };
        Self { min, max }
    }

    fn bin(&self, value: f64, bins: usize) -> usize {
        let t = ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        if t.is_nan() {
            return 0;
        }
        (t * (bins - 1) as f64).round() as usize
    }

    /// Upper edge of `split_bin`, halfway to the next bin center.
    fn threshold(&self, split_bin: usize, bins: usize) -> f64 {
        let step = (self.max - self.min) / (bins - 1) as f64;
        self.min + (split_bin as f64 + 0.5) * step
    }
}

/// Pre-binned predictors, reused across every round and output.
struct BinnedFeatures {
    ranges: Vec<FeatureRange>,
    bins: usize,
    /// `codes[[i, j]]` is the bin of row `i` in feature `j`.
    codes: Array2<u8>,
}

impl BinnedFeatures {
    fn new(x: &Array2<f64>, bins: usize) -> Self {
        let bins = bins.clamp(2, 256);
        let ranges: Vec<FeatureRange> = x
            .columns()
            .into_iter()
            .map(|col| FeatureRange::of(col.iter().copied()))
            .collect();
        let codes = Array2::from_shape_fn(x.dim(), |(i, j)| ranges[j].bin(x[[i, j]], bins) as u8);
        Self { ranges, bins, codes }
    }

    /// Least-squares stump on `residuals` over all features.
    fn best_stump(&self, x: &Array2<f64>, residuals: &[f64]) -> Stump {
        let best = (0..self.ranges.len())
            .map(|feature| self.best_split(feature, residuals))
            .fold(Split::NONE, |best, split| if split.sse < best.sse { split } else { best });
        let threshold = self.ranges[best.feature].threshold(best.bin, self.bins);
        let (left_value, right_value) = leaf_means(x, residuals, best.feature, threshold);
        Stump {
            feature_index: best.feature,
            threshold,
            left_value,
            right_value,
        }
    }

    fn best_split(&self, feature: usize, residuals: &[f64]) -> Split {
        let mut hist = vec![Moments::default(); self.bins];
        for (&code, &r) in self.codes.column(feature).iter().zip(residuals) {
            hist[code as usize].add(r);
        }
        let total = hist.iter().fold(Moments::default(), |acc, m| acc.merged(m));
        let mut left = Moments::default();
        let mut best = Split {
            feature,
            ..Split::NONE
        };
        for (bin, moments) in hist.iter().enumerate().take(self.bins - 1) {
            left = left.merged(moments);
            let right = total.minus(&left);
            if left.count == 0 || right.count == 0 {
                continue;
            }
            let sse = left.sse() + right.sse();
            if sse < best.sse {
                best = Split { sse, feature, bin };
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    sse: f64,
    feature: usize,
    bin: usize,
}

impl Split {
    const NONE: Split = Split {
        sse: f64::INFINITY,
        feature: 0,
        bin: 0,
    };
}

/// Count, sum and sum of squares of residuals in a bin.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn add(&mut self, r: f64) {
        self.count += 1;
        self.sum += r;
        self.sum_sq += r * r;
    }

    fn merged(&self, other: &Moments) -> Moments {
        Moments {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
        }
    }

    fn minus(&self, other: &Moments) -> Moments {
        Moments {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn sse(&self) -> f64 {
        self.sum_sq - self.sum * self.sum / self.count as f64
    }
}

fn leaf_means(x: &Array2<f64>, residuals: &[f64], feature: usize, threshold: f64) -> (f64, f64) {
    let mut left = Moments::default();
    let mut right = Moments::default();
    for (&v, &r) in x.column(feature).iter().zip(residuals) {
        if v <= threshold {
            left.add(r);
        } else {
            right.add(r);
        }
    }
    let mean = |m: Moments| if m.count == 0 { 0.0 } else { m.sum / m.count as f64 };
    (mean(left), mean(right))
}
