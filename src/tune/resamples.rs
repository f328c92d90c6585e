use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{Dataset, OutcomeKind};
use crate::ml::metrics::MetricKind;
use crate::resample::{FoldSet, Split};
use crate::stats;
use crate::workflow::{FittedWorkflow, Workflow, WorkflowError};

/// One metric value measured on one resample's assessment set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleMetric {
    pub id: String,
    pub metric: MetricKind,
    pub value: f64,
}

/// Mean of a metric across resamples with its standard error.
///
/// `NaN` values (undefined on a resample) are left out of `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: MetricKind,
    pub mean: f64,
    pub n: usize,
    pub std_err: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlResamples {
    /// Keep each fold's fitted workflow instead of discarding it after scoring.
    #[serde(default)]
    pub keep_models: bool,
}

/// Per-resample metrics of one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleResults {
    pub metrics: Vec<ResampleMetric>,
    /// Fitted workflows in resample order, when kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<(String, FittedWorkflow)>>,
}

impl ResampleResults {
    /// Mean, count and standard error per metric, in first-seen metric order.
    pub fn collect_metrics(&self) -> Vec<MetricSummary> {
        summarize(&self.metrics)
    }

    /// Values of `metric` keyed by resample id, in resample order.
    pub fn values(&self, metric: MetricKind) -> Vec<(&str, f64)> {
        self.metrics
            .iter()
            .filter(|m| m.metric == metric)
            .map(|m| (m.id.as_str(), m.value))
            .collect()
    }

    pub fn summary(&self, metric: MetricKind) -> Option<MetricSummary> {
        self.collect_metrics()
            .into_iter()
            .find(|s| s.metric == metric)
    }
}

pub(crate) fn summarize(metrics: &[ResampleMetric]) -> Vec<MetricSummary> {
    let mut order: Vec<MetricKind> = Vec::new();
    for m in metrics {
        if !order.contains(&m.metric) {
            order.push(m.metric);
        }
    }
    order
        .into_iter()
        .map(|metric| {
            let values: Vec<f64> = metrics
                .iter()
                .filter(|m| m.metric == metric && !m.value.is_nan())
                .map(|m| m.value)
                .collect();
            let n = values.len();
            let std_err = if n > 1 { stats::std_err(&values) } else { f64::NAN };
            MetricSummary {
                metric,
                mean: stats::mean(&values),
                n,
                std_err,
            }
        })
        .collect()
}

/// Outcome mode of the workflow's outcome column in `data`.
pub(crate) fn outcome_mode(workflow: &Workflow, data: &Dataset) -> Result<OutcomeKind, WorkflowError> {
    Ok(if data.column(&workflow.recipe.outcome)?.is_numeric() {
        OutcomeKind::Regression
    } else {
        OutcomeKind::Classification
    })
}

/// Metrics to compute: the given list, or the defaults for the outcome mode.
pub(crate) fn metric_set(
    workflow: &Workflow,
    data: &Dataset,
    metrics: &[MetricKind],
) -> Result<Vec<MetricKind>, WorkflowError> {
    if metrics.is_empty() {
        Ok(MetricKind::defaults(outcome_mode(workflow, data)?))
    } else {
        Ok(metrics.to_vec())
    }
}

/// Fit on one split's analysis rows and score its assessment rows.
pub(crate) fn fit_split(
    workflow: &Workflow,
    data: &Dataset,
    split: &Split,
    metrics: &[MetricKind],
) -> Result<(Vec<ResampleMetric>, FittedWorkflow), WorkflowError> {
    let analysis = split.analysis_data(data)?;
    let assessment = split.assessment_data(data)?;
    let fitted = workflow.fit(&analysis)?;
    let (results, _) = fitted.evaluate(&assessment, metrics)?;
    debug!(
        "{}: {}",
        split.id(),
        results
            .iter()
            .map(|r| format!("{}={:.4}", r.metric, r.value))
            .collect::<Vec<_>>()
            .join(" ")
    );
    let metrics = results
        .into_iter()
        .map(|r| ResampleMetric {
            id: split.id().to_string(),
            metric: r.metric,
            value: r.value,
        })
        .collect();
    Ok((metrics, fitted))
}

/// Fit the workflow once per split and score each assessment set.
///
/// Every fit sees only its analysis rows; fitted models are dropped after
/// scoring unless `control.keep_models` is set.
pub fn fit_resamples(
    workflow: &Workflow,
    data: &Dataset,
    folds: &FoldSet,
    metrics: &[MetricKind],
    control: &ControlResamples,
) -> Result<ResampleResults, WorkflowError> {
    let metrics = metric_set(workflow, data, metrics)?;
    info!(
        "fit_resamples: {} over {} resamples",
        workflow.model.name(),
        folds.len()
    );
    let mut all = Vec::with_capacity(folds.len() * metrics.len());
    let mut models = control.keep_models.then(Vec::new);
    for split in folds.splits() {
        let (split_metrics, fitted) = fit_split(workflow, data, split, &metrics)?;
        all.extend(split_metrics);
        if let Some(models) = models.as_mut() {
            models.push((split.id().to_string(), fitted));
        }
    }
    Ok(ResampleResults {
        metrics: all,
        models,
    })
}
