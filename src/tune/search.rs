use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    MetricSummary, ParamSet, ResampleMetric, TuneError, fit_split, metric_set, summarize,
};
use crate::data::Dataset;
use crate::ml::metrics::MetricKind;
use crate::resample::FoldSet;
use crate::workflow::Workflow;

/// Resample metrics of one parameter candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub config: String,
    pub params: ParamSet,
    pub metrics: Vec<ResampleMetric>,
    /// Number of resamples scored before racing dropped the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated_at: Option<usize>,
}

impl CandidateResult {
    pub fn summary(&self, metric: MetricKind) -> Option<MetricSummary> {
        summarize(&self.metrics).into_iter().find(|s| s.metric == metric)
    }

    pub fn is_complete(&self) -> bool {
        self.eliminated_at.is_none()
    }

    /// Values of `metric` in resample order.
    pub(crate) fn values(&self, metric: MetricKind) -> Vec<f64> {
        self.metrics
            .iter()
            .filter(|m| m.metric == metric)
            .map(|m| m.value)
            .collect()
    }
}

/// One candidate's aggregate for a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub config: String,
    pub params: ParamSet,
    #[serde(flatten)]
    pub summary: MetricSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneResults {
    pub metrics: Vec<MetricKind>,
    pub n_resamples: usize,
    pub candidates: Vec<CandidateResult>,
}

impl TuneResults {
    /// Mean and standard error of every metric for every candidate.
    pub fn collect_metrics(&self) -> Vec<CandidateSummary> {
        self.candidates
            .iter()
            .flat_map(|candidate| {
                summarize(&candidate.metrics)
                    .into_iter()
                    .map(|summary| CandidateSummary {
                        config: candidate.config.clone(),
                        params: candidate.params.clone(),
                        summary,
                    })
            })
            .collect()
    }

    /// Top `n` candidates that were scored on every resample, best first.
    pub fn show_best(&self, metric: MetricKind, n: usize) -> Vec<CandidateSummary> {
        let mut ranked = self.ranked(metric);
        ranked.truncate(n);
        ranked
    }

    pub fn select_best(&self, metric: MetricKind) -> Result<ParamSet, TuneError> {
        self.ranked(metric)
            .into_iter()
            .next()
            .map(|best| best.params)
            .ok_or(TuneError::NoResults(metric))
    }

    /// Simplest candidate whose mean is within one standard error of the best.
    ///
    /// Simplicity is the value of `param`: smaller values are simpler unless
    /// `larger_is_simpler` is set (e.g. a penalty).
    pub fn select_by_one_std_err(
        &self,
        metric: MetricKind,
        param: &str,
        larger_is_simpler: bool,
    ) -> Result<ParamSet, TuneError> {
        let ranked = self.ranked(metric);
        let best = ranked.first().ok_or(TuneError::NoResults(metric))?;
        if !best.params.contains_key(param) {
            return Err(TuneError::UnknownParameter(param.to_string()));
        }
        let margin = if best.summary.std_err.is_finite() {
            best.summary.std_err
        } else {
            0.0
        };
        let bound = if metric.higher_is_better() {
            best.summary.mean - margin
        } else {
            best.summary.mean + margin
        };
        // candidates from a hand-built grid may not carry `param`
        let within = ranked.iter().filter_map(|c| {
            let inside = if metric.higher_is_better() {
                c.summary.mean >= bound
            } else {
                c.summary.mean <= bound
            };
            let value = c.params.get(param).copied()?;
            inside.then_some((value, c))
        });
        // ranked order breaks ties in simplicity toward the better mean
        let chosen = within
            .min_by(|(x, _), (y, _)| {
                if larger_is_simpler {
                    y.total_cmp(x)
                } else {
                    x.total_cmp(y)
                }
            })
            .map(|(_, c)| c)
            .unwrap_or(best);
        Ok(chosen.params.clone())
    }

    fn ranked(&self, metric: MetricKind) -> Vec<CandidateSummary> {
        let mut ranked: Vec<CandidateSummary> = self
            .candidates
            .iter()
            .filter(|c| c.is_complete())
            .filter_map(|c| {
                let summary = c.summary(metric)?;
                (!summary.mean.is_nan()).then(|| CandidateSummary {
                    config: c.config.clone(),
                    params: c.params.clone(),
                    summary,
                })
            })
            .collect();
        ranked.sort_by(|a, b| compare_means(metric, a.summary.mean, b.summary.mean));
        ranked
    }
}

/// Best-first ordering of two means.
pub(crate) fn compare_means(metric: MetricKind, a: f64, b: f64) -> Ordering {
    if metric.higher_is_better() {
        b.total_cmp(&a)
    } else {
        a.total_cmp(&b)
    }
}

/// Copy of `workflow` with every parameter in `params` applied.
pub fn finalize_workflow(workflow: &Workflow, params: &ParamSet) -> Result<Workflow, TuneError> {
    let tunable = workflow.tunable_params();
    let mut finalized = workflow.clone();
    for (name, value) in params {
        if !tunable.iter().any(|t| t == name) && !workflow.recipe.has_param(name) {
            return Err(TuneError::UnknownParameter(name.clone()));
        }
        finalized.set_param(name, *value)?;
    }
    Ok(finalized)
}

pub(crate) fn config_ids(n: usize) -> Vec<String> {
    let width = n.to_string().len().max(2);
    (1..=n).map(|i| format!("Config{i:0width$}")).collect()
}

/// Score every candidate of `grid` on every resample of `folds`.
pub fn tune_grid(
    workflow: &Workflow,
    data: &Dataset,
    folds: &FoldSet,
    grid: &[ParamSet],
    metrics: &[MetricKind],
) -> Result<TuneResults, TuneError> {
    if grid.is_empty() {
        return Err(TuneError::EmptyGrid);
    }
    let metrics = metric_set(workflow, data, metrics)?;
    info!(
        "tune_grid: {} candidates x {} resamples",
        grid.len(),
        folds.len()
    );
    let mut candidates = Vec::with_capacity(grid.len());
    for (config, params) in config_ids(grid.len()).into_iter().zip(grid) {
        let configured = finalize_workflow(workflow, params)?;
        let mut scored = Vec::with_capacity(folds.len() * metrics.len());
        for split in folds.splits() {
            let (split_metrics, _) = fit_split(&configured, data, split, &metrics)?;
            scored.extend(split_metrics);
        }
        candidates.push(CandidateResult {
            config,
            params: params.clone(),
            metrics: scored,
            eliminated_at: None,
        });
    }
    Ok(TuneResults {
        metrics,
        n_resamples: folds.len(),
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(config: &str, penalty: f64, values: &[f64]) -> CandidateResult {
        CandidateResult {
            config: config.to_string(),
            params: ParamSet::from([("penalty".to_string(), penalty)]),
            metrics: values
                .iter()
                .enumerate()
                .map(|(i, v)| ResampleMetric {
                    id: format!("Fold{}", i + 1),
                    metric: MetricKind::Rmse,
                    value: *v,
                })
                .collect(),
            eliminated_at: None,
        }
    }

    fn results() -> TuneResults {
        TuneResults {
            metrics: vec![MetricKind::Rmse],
            n_resamples: 3,
            candidates: vec![
                candidate("Config01", 0.001, &[1.0, 1.2, 1.1]),
                candidate("Config02", 0.1, &[1.1, 1.2, 1.15]),
                candidate("Config03", 1.0, &[2.0, 2.1, 2.2]),
            ],
        }
    }

    #[test]
    fn show_best_orders_lower_rmse_first() {
        let best = results().show_best(MetricKind::Rmse, 2);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].config, "Config01");
        assert_eq!(best[1].config, "Config02");
    }

    #[test]
    fn one_std_err_prefers_larger_penalty_within_band() {
        let results = results();
        let best = results.select_best(MetricKind::Rmse).unwrap();
        assert_eq!(best["penalty"], 0.001);
        let simple = results
            .select_by_one_std_err(MetricKind::Rmse, "penalty", true)
            .unwrap();
        assert_eq!(simple["penalty"], 0.1);
        let small = results
            .select_by_one_std_err(MetricKind::Rmse, "penalty", false)
            .unwrap();
        assert_eq!(small["penalty"], 0.001);
    }

    #[test]
    fn one_std_err_skips_candidates_without_the_parameter() {
        let mut results = results();
        results.candidates[1].params = ParamSet::from([("neighbors".to_string(), 5.0)]);
        let simple = results
            .select_by_one_std_err(MetricKind::Rmse, "penalty", true)
            .unwrap();
        assert_eq!(simple["penalty"], 0.001);
        assert!(matches!(
            results.select_by_one_std_err(MetricKind::Rmse, "trees", true),
            Err(TuneError::UnknownParameter(name)) if name == "trees"
        ));
    }

    #[test]
    fn eliminated_candidates_are_not_selected() {
        let mut results = results();
        results.candidates[0].eliminated_at = Some(2);
        assert_eq!(results.select_best(MetricKind::Rmse).unwrap()["penalty"], 0.1);
        assert!(matches!(
            results.select_best(MetricKind::Accuracy),
            Err(TuneError::NoResults(MetricKind::Accuracy))
        ));
    }

    #[test]
    fn finalize_requires_qualified_names_for_shared_step_params() {
        use crate::ml::ModelSpec;
        use crate::recipe::{Recipe, Selector, StepSpec};

        let workflow = Workflow::new(
            Recipe::new("y")
                .step(StepSpec::Other {
                    columns: Selector::AllNominalPredictors,
                    threshold: 0.05,
                    other_label: "other".to_string(),
                })
                .step(StepSpec::Pca {
                    columns: Selector::AllNumericPredictors,
                    num_comp: 2,
                    threshold: None,
                }),
            ModelSpec::linear_reg(),
        );
        let counts = ParamSet::from([("other.threshold".to_string(), 10.0)]);
        let finalized = finalize_workflow(&workflow, &counts).unwrap();
        assert!(matches!(
            finalized.recipe.steps[0],
            StepSpec::Other { threshold, .. } if threshold == 10.0
        ));
        assert!(matches!(
            finalized.recipe.steps[1],
            StepSpec::Pca { threshold: None, .. }
        ));
        let bare = ParamSet::from([("threshold".to_string(), 10.0)]);
        assert!(matches!(
            finalize_workflow(&workflow, &bare),
            Err(TuneError::Workflow(_))
        ));
    }

    #[test]
    fn config_ids_are_zero_padded() {
        assert_eq!(config_ids(3), vec!["Config01", "Config02", "Config03"]);
        assert_eq!(config_ids(120)[0], "Config001");
    }
}
