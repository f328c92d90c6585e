//! Evaluating several workflows on shared resamples and comparing them.

mod contrast;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::data::Dataset;
use crate::ml::ModelSpec;
use crate::ml::metrics::MetricKind;
use crate::recipe::Recipe;
use crate::resample::FoldSet;
use crate::tune::{ControlResamples, ResampleResults, fit_resamples, metric_set};
use crate::workflow::{Workflow, WorkflowError};

pub use contrast::{Contrast, PairedComparison, paired_differences};

#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("no workflow with id {0}")]
    UnknownWorkflow(String),
    #[error("{a} and {b} share {n} resamples with a value for {metric}; need at least 2")]
    TooFewPairs {
        a: String,
        b: String,
        metric: MetricKind,
        n: usize,
    },
    #[error("probability must be in (0, 1), got {0}")]
    InvalidProbability(f64),
    #[error("rope must be finite and non-negative, got {0}")]
    InvalidRope(f64),
}

/// Named workflows evaluated on the same resamples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSet {
    pub workflows: Vec<(String, Workflow)>,
}

impl WorkflowSet {
    /// Every recipe paired with every model, ids `{recipe}_{model}`.
    pub fn cross(recipes: &[(String, Recipe)], models: &[(String, ModelSpec)]) -> Self {
        let workflows = recipes
            .iter()
            .flat_map(|(recipe_id, recipe)| {
                models.iter().map(move |(model_id, model)| {
                    (
                        format!("{recipe_id}_{model_id}"),
                        Workflow::new(recipe.clone(), model.clone()),
                    )
                })
            })
            .collect();
        Self { workflows }
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.workflows.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Resample every workflow on `folds`.
    ///
    /// An empty metric list uses the defaults of the first workflow's outcome,
    /// so all workflows share one metric set.
    pub fn evaluate_all(
        &self,
        data: &Dataset,
        folds: &FoldSet,
        metrics: &[MetricKind],
        control: &ControlResamples,
    ) -> Result<WorkflowSetResults, CompareError> {
        let metrics = match self.workflows.first() {
            Some((_, first)) => metric_set(first, data, metrics)?,
            None => metrics.to_vec(),
        };
        let mut results = Vec::with_capacity(self.workflows.len());
        for (id, workflow) in &self.workflows {
            info!("evaluating workflow {id}");
            let resampled = fit_resamples(workflow, data, folds, &metrics, control)?;
            results.push((id.clone(), resampled));
        }
        Ok(WorkflowSetResults { metrics, results })
    }
}

/// Ranked summary row of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedWorkflow {
    pub rank: usize,
    pub wflow_id: String,
    pub metric: MetricKind,
    pub mean: f64,
    pub std_err: f64,
    pub n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSetResults {
    pub metrics: Vec<MetricKind>,
    pub results: Vec<(String, ResampleResults)>,
}

impl WorkflowSetResults {
    pub fn get(&self, id: &str) -> Result<&ResampleResults, CompareError> {
        self.results
            .iter()
            .find(|(wflow_id, _)| wflow_id == id)
            .map(|(_, results)| results)
            .ok_or_else(|| CompareError::UnknownWorkflow(id.to_string()))
    }

    /// Workflows ordered best first by their mean of `metric`.
    ///
    /// Workflows with no defined value sort last.
    pub fn rank_results(&self, metric: MetricKind) -> Vec<RankedWorkflow> {
        let mut rows: Vec<RankedWorkflow> = self
            .results
            .iter()
            .filter_map(|(id, results)| {
                let summary = results.summary(metric)?;
                Some(RankedWorkflow {
                    rank: 0,
                    wflow_id: id.clone(),
                    metric,
                    mean: summary.mean,
                    std_err: summary.std_err,
                    n: summary.n,
                })
            })
            .collect();
        rows.sort_by(|a, b| match (a.mean.is_nan(), b.mean.is_nan()) {
            (false, false) => {
                if metric.higher_is_better() {
                    b.mean.total_cmp(&a.mean)
                } else {
                    a.mean.total_cmp(&b.mean)
                }
            }
            (x, y) => x.cmp(&y),
        });
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }
        rows
    }

    /// Paired t-test of `a - b` over the resamples both were scored on.
    pub fn paired_t_test(
        &self,
        a: &str,
        b: &str,
        metric: MetricKind,
    ) -> Result<PairedComparison, CompareError> {
        let differences = paired_differences(self.get(a)?, self.get(b)?, metric);
        PairedComparison::new(a, b, metric, &differences)
    }

    /// Posterior of the mean difference `a - b` with a ROPE of half-width `rope`.
    pub fn posterior_contrast(
        &self,
        a: &str,
        b: &str,
        metric: MetricKind,
        rope: f64,
        prob: f64,
    ) -> Result<Contrast, CompareError> {
        let differences = paired_differences(self.get(a)?, self.get(b)?, metric);
        Contrast::new(a, b, metric, &differences, rope, prob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tune::ResampleMetric;

    fn results(values: &[f64]) -> ResampleResults {
        ResampleResults {
            metrics: values
                .iter()
                .enumerate()
                .map(|(i, v)| ResampleMetric {
                    id: format!("Fold{:02}", i + 1),
                    metric: MetricKind::Rmse,
                    value: *v,
                })
                .collect(),
            models: None,
        }
    }

    fn set() -> WorkflowSetResults {
        WorkflowSetResults {
            metrics: vec![MetricKind::Rmse],
            results: vec![
                ("basic_lm".to_string(), results(&[3.0, 3.2, 2.9, 3.1, 3.0])),
                ("splines_lm".to_string(), results(&[2.5, 2.7, 2.6, 2.4, 2.6])),
                ("basic_knn".to_string(), results(&[f64::NAN, f64::NAN])),
            ],
        }
    }

    #[test]
    fn cross_names_workflows() {
        let recipes = vec![
            ("basic".to_string(), Recipe::new("y")),
            ("splines".to_string(), Recipe::new("y")),
        ];
        let models = vec![
            ("lm".to_string(), ModelSpec::linear_reg()),
            ("knn".to_string(), ModelSpec::nearest_neighbor()),
        ];
        let set = WorkflowSet::cross(&recipes, &models);
        assert_eq!(
            set.ids(),
            vec!["basic_lm", "basic_knn", "splines_lm", "splines_knn"]
        );
    }

    #[test]
    fn rank_puts_lowest_rmse_first_and_undefined_last() {
        let ranked = set().rank_results(MetricKind::Rmse);
        let ids: Vec<_> = ranked.iter().map(|r| r.wflow_id.as_str()).collect();
        assert_eq!(ids, vec!["splines_lm", "basic_lm", "basic_knn"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].n, 0);
    }

    #[test]
    fn paired_test_detects_difference() {
        let test = set()
            .paired_t_test("basic_lm", "splines_lm", MetricKind::Rmse)
            .unwrap();
        assert_eq!(test.n, 5);
        assert!((test.mean_difference - 0.48).abs() < 1e-9);
        assert!(test.p_value < 0.01);
    }

    #[test]
    fn unknown_and_unpaired_workflows_error() {
        let set = set();
        assert!(matches!(
            set.paired_t_test("basic_lm", "nope", MetricKind::Rmse),
            Err(CompareError::UnknownWorkflow(id)) if id == "nope"
        ));
        assert!(matches!(
            set.paired_t_test("basic_lm", "basic_knn", MetricKind::Rmse),
            Err(CompareError::TooFewPairs { n: 0, .. })
        ));
    }
}
