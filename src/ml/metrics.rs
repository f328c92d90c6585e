//! Performance metrics for regression and classification models.
//!
//! Each [`MetricKind`] knows its name, the outcome mode it applies to and
//! whether larger values are better. Undefined values (a constant outcome for
//! `rsq`, a single class for `roc_auc`) are reported as `NaN`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::{Predictions, Target};
use crate::data::OutcomeKind;
use crate::stats;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("{metric} needs {expected:?} outcomes and predictions")]
    ModeMismatch {
        metric: &'static str,
        expected: OutcomeKind,
    },
    #[error("{truth} observed values but {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },
    #[error("no observations to evaluate")]
    Empty,
    #[error("observed class {0} is not among the model's levels")]
    UnknownLevel(String),
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Rmse,
    Rsq,
    RsqTrad,
    Mae,
    Accuracy,
    RocAuc,
    FMeas,
    Mcc,
    Kap,
    MnLogLoss,
}

impl MetricKind {
    pub const ALL: [MetricKind; 10] = [
        MetricKind::Rmse,
        MetricKind::Rsq,
        MetricKind::RsqTrad,
        MetricKind::Mae,
        MetricKind::Accuracy,
        MetricKind::RocAuc,
        MetricKind::FMeas,
        MetricKind::Mcc,
        MetricKind::Kap,
        MetricKind::MnLogLoss,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Rmse => "rmse",
            MetricKind::Rsq => "rsq",
            MetricKind::RsqTrad => "rsq_trad",
            MetricKind::Mae => "mae",
            MetricKind::Accuracy => "accuracy",
            MetricKind::RocAuc => "roc_auc",
            MetricKind::FMeas => "f_meas",
            MetricKind::Mcc => "mcc",
            MetricKind::Kap => "kap",
            MetricKind::MnLogLoss => "mn_log_loss",
        }
    }

    pub fn higher_is_better(self) -> bool {
        !matches!(
            self,
            MetricKind::Rmse | MetricKind::Mae | MetricKind::MnLogLoss
        )
    }

    pub fn mode(self) -> OutcomeKind {
        match self {
            MetricKind::Rmse | MetricKind::Rsq | MetricKind::RsqTrad | MetricKind::Mae => {
                OutcomeKind::Regression
            }
            _ => OutcomeKind::Classification,
        }
    }

    /// Default metric set for an outcome mode.
    pub fn defaults(mode: OutcomeKind) -> Vec<MetricKind> {
        match mode {
            OutcomeKind::Regression => vec![MetricKind::Rmse, MetricKind::Rsq],
            OutcomeKind::Classification => vec![MetricKind::RocAuc, MetricKind::Accuracy],
        }
    }

    /// `true` if `candidate` is strictly better than `incumbent`.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        if self.higher_is_better() {
            candidate > incumbent
        } else {
            candidate < incumbent
        }
    }

    pub fn evaluate(self, truth: &Target, predictions: &Predictions) -> Result<f64, MetricError> {
        if truth.len() != predictions.len() {
            return Err(MetricError::LengthMismatch {
                truth: truth.len(),
                predicted: predictions.len(),
            });
        }
        if truth.is_empty() {
            return Err(MetricError::Empty);
        }
        let value = match (self.mode(), truth, predictions) {
            (OutcomeKind::Regression, Target::Numeric(observed), Predictions::Numeric { values }) => {
                self.regression(observed, values)
            }
            (
                OutcomeKind::Classification,
                Target::Labels(labels),
                Predictions::Classes {
                    levels,
                    probabilities,
                    predicted,
                },
            ) => {
                let codes = truth_codes(labels, levels)?;
                self.classification(&codes, levels.len(), probabilities, predicted)
            }
            _ => {
                return Err(MetricError::ModeMismatch {
                    metric: self.name(),
                    expected: self.mode(),
                });
            }
        };
        if value.is_nan() {
            warn!("{} is undefined for these {} rows", self.name(), truth.len());
        }
        Ok(value)
    }

    fn regression(self, observed: &[f64], predicted: &[f64]) -> f64 {
        let n = observed.len() as f64;
        let errors = observed.iter().zip(predicted).map(|(o, p)| o - p);
        match self {
            MetricKind::Rmse => (errors.map(|e| e * e).sum::<f64>() / n).sqrt(),
            MetricKind::Mae => errors.map(f64::abs).sum::<f64>() / n,
            MetricKind::Rsq => stats::correlation(observed, predicted).powi(2),
            MetricKind::RsqTrad => {
                let mean = stats::mean(observed);
                let sst: f64 = observed.iter().map(|o| (o - mean) * (o - mean)).sum();
                if sst == 0.0 {
                    return f64::NAN;
                }
                let sse: f64 = errors.map(|e| e * e).sum();
                1.0 - sse / sst
            }
            _ => f64::NAN,
        }
    }

    fn classification(
        self,
        truth: &[usize],
        n_classes: usize,
        probabilities: &[Vec<f64>],
        predicted: &[usize],
    ) -> f64 {
        let mut cm = ConfusionMatrix::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        match self {
            MetricKind::Accuracy => accuracy(&cm),
            MetricKind::RocAuc => {
                if n_classes == 2 {
                    let scores: Vec<f64> = probabilities.iter().map(|p| p[0]).collect();
                    let events: Vec<bool> = truth.iter().map(|&t| t == 0).collect();
                    mann_whitney_auc(&scores, &events)
                } else {
                    hand_till_auc(truth, n_classes, probabilities)
                }
            }
            MetricKind::FMeas => f_measure(&cm),
            MetricKind::Mcc => matthews(&cm),
            MetricKind::Kap => kappa(&cm),
            MetricKind::MnLogLoss => {
                let total: f64 = truth
                    .iter()
                    .zip(probabilities)
                    .map(|(&t, p)| -p[t].clamp(1e-15, 1.0).ln())
                    .sum();
                total / truth.len() as f64
            }
            _ => f64::NAN,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| MetricError::UnknownMetric(s.to_string()))
    }
}

/// One metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric: MetricKind,
    pub value: f64,
}

/// Evaluate every metric in `metrics`.
pub fn evaluate_metrics(
    metrics: &[MetricKind],
    truth: &Target,
    predictions: &Predictions,
) -> Result<Vec<MetricResult>, MetricError> {
    metrics
        .iter()
        .map(|&metric| {
            Ok(MetricResult {
                metric,
                value: metric.evaluate(truth, predictions)?,
            })
        })
        .collect()
}

fn truth_codes(labels: &[String], levels: &[String]) -> Result<Vec<usize>, MetricError> {
    labels
        .iter()
        .map(|label| {
            levels
                .iter()
                .position(|level| level == label)
                .ok_or_else(|| MetricError::UnknownLevel(label.clone()))
        })
        .collect()
}

/// Area under the ROC curve via the Mann-Whitney statistic, with mid-ranks for ties.
pub fn mann_whitney_auc(scores: &[f64], events: &[bool]) -> f64 {
    let n_pos = events.iter().filter(|&&e| e).count();
    let n_neg = events.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; tied block [i, j] shares the average rank
        let mid_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if events[idx] {
                rank_sum += mid_rank;
            }
        }
        i = j + 1;
    }
    let n_pos = n_pos as f64;
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

/// Hand-Till multiclass AUC: the average over class pairs of the two
/// one-against-one AUCs.
fn hand_till_auc(truth: &[usize], n_classes: usize, probabilities: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..n_classes {
        for j in (i + 1)..n_classes {
            let rows: Vec<usize> = (0..truth.len())
                .filter(|&r| truth[r] == i || truth[r] == j)
                .collect();
            let events: Vec<bool> = rows.iter().map(|&r| truth[r] == i).collect();
            let score_i: Vec<f64> = rows.iter().map(|&r| probabilities[r][i]).collect();
            let a_ij = mann_whitney_auc(&score_i, &events);
            let not_events: Vec<bool> = events.iter().map(|e| !e).collect();
            let score_j: Vec<f64> = rows.iter().map(|&r| probabilities[r][j]).collect();
            let a_ji = mann_whitney_auc(&score_j, &not_events);
            if a_ij.is_nan() || a_ji.is_nan() {
                continue;
            }
            total += (a_ij + a_ji) / 2.0;
            pairs += 1;
        }
    }
    if pairs == 0 {
        f64::NAN
    } else {
        total / pairs as f64
    }
}

/// Binary: F1 of the first level. Multiclass: macro average over classes that
/// occur in the truth or the predictions.
fn f_measure(cm: &ConfusionMatrix) -> f64 {
    let f1_for = |k: usize| -> Option<f64> {
        let tp = cm.get(k, k) as f64;
        let fp = cm.predicted_total(k) as f64 - tp;
        let fn_ = cm.truth_total(k) as f64 - tp;
        let denom = 2.0 * tp + fp + fn_;
        (denom > 0.0).then(|| 2.0 * tp / denom)
    };
    if cm.n_classes == 2 {
        return f1_for(0).unwrap_or(f64::NAN);
    }
    let scores: Vec<f64> = (0..cm.n_classes).filter_map(f1_for).collect();
    if scores.is_empty() {
        f64::NAN
    } else {
        stats::mean(&scores)
    }
}

/// Matthews correlation, generalized to K classes.
fn matthews(cm: &ConfusionMatrix) -> f64 {
    let s = cm.total() as f64;
    let c: f64 = (0..cm.n_classes).map(|k| cm.get(k, k) as f64).sum();
    let mut pt = 0.0;
    let mut pp = 0.0;
    let mut tt = 0.0;
    for k in 0..cm.n_classes {
        let p_k = cm.predicted_total(k) as f64;
        let t_k = cm.truth_total(k) as f64;
        pt += p_k * t_k;
        pp += p_k * p_k;
        tt += t_k * t_k;
    }
    let denom = ((s * s - pp) * (s * s - tt)).sqrt();
    if denom == 0.0 {
        f64::NAN
    } else {
        (c * s - pt) / denom
    }
}

/// Cohen's kappa.
fn kappa(cm: &ConfusionMatrix) -> f64 {
    let s = cm.total() as f64;
    if s == 0.0 {
        return f64::NAN;
    }
    let observed = accuracy(cm);
    let expected: f64 = (0..cm.n_classes)
        .map(|k| cm.predicted_total(k) as f64 * cm.truth_total(k) as f64)
        .sum::<f64>()
        / (s * s);
    if expected >= 1.0 {
        f64::NAN
    } else {
        (observed - expected) / (1.0 - expected)
    }
}

#[derive(Debug, Clone)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn truth_total(&self, truth: usize) -> u32 {
        (0..self.n_classes).map(|p| self.get(truth, p)).sum()
    }

    pub fn predicted_total(&self, predicted: usize) -> u32 {
        (0..self.n_classes).map(|t| self.get(t, predicted)).sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

#[derive(Debug, Clone)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f64,
    /// `TP / (TP + FN)`.
    pub recall: f64,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Serializable per-class summary for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerClassMetric {
    pub class_id: String,
    pub support: u32,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f64;
        let support = cm.truth_total(class_idx);
        let fn_ = support as f64 - tp;
        let fp = cm.predicted_total(class_idx) as f64 - tp;
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        stats.push(PerClassStats {
            precision,
            recall,
            support,
        });
    }
    stats
}

/// Per-class report rows for a set of class predictions.
pub fn class_report(truth: &Target, predictions: &Predictions) -> Result<Vec<PerClassMetric>, MetricError> {
    let (Target::Labels(labels), Predictions::Classes { levels, predicted, .. }) =
        (truth, predictions)
    else {
        return Err(MetricError::ModeMismatch {
            metric: "class_report",
            expected: OutcomeKind::Classification,
        });
    };
    if labels.len() != predicted.len() {
        return Err(MetricError::LengthMismatch {
            truth: labels.len(),
            predicted: predicted.len(),
        });
    }
    let codes = truth_codes(labels, levels)?;
    let mut cm = ConfusionMatrix::new(levels.len());
    for (&t, &p) in codes.iter().zip(predicted) {
        cm.add(t, p);
    }
    Ok(precision_recall_by_class(&cm)
        .into_iter()
        .zip(levels)
        .map(|(stats, class_id)| {
            let sum = stats.precision + stats.recall;
            PerClassMetric {
                class_id: class_id.clone(),
                support: stats.support,
                precision: stats.precision,
                recall: stats.recall,
                f1: if sum == 0.0 {
                    0.0
                } else {
                    2.0 * stats.precision * stats.recall / sum
                },
            }
        })
        .collect())
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let mut correct = 0u64;
    for k in 0..cm.n_classes {
        correct += cm.get(k, k) as u64;
    }
    let total = cm.total();
    if total == 0 {
        0.0
    } else {
        (correct as f64) / (total as f64)
    }
}
