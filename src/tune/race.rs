use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::search::{compare_means, config_ids};
use super::{CandidateResult, ParamSet, TuneError, TuneResults, finalize_workflow, fit_split, metric_set};
use crate::data::Dataset;
use crate::ml::metrics::MetricKind;
use crate::resample::FoldSet;
use crate::stats;
use crate::workflow::Workflow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceOptions {
    /// Resamples every candidate is scored on before any is dropped.
    #[serde(default = "default_burn_in")]
    pub burn_in: usize,
    /// One-sided significance level for dropping a candidate.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_burn_in() -> usize {
    3
}

fn default_alpha() -> f64 {
    0.05
}

impl Default for RaceOptions {
    fn default() -> Self {
        Self {
            burn_in: default_burn_in(),
            alpha: default_alpha(),
        }
    }
}

/// Grid search that stops scoring candidates once they are shown to be worse.
///
/// All candidates are scored on the first `burn_in` resamples. After that,
/// following each resample, every remaining candidate is compared to the
/// current best on the first metric with a paired t-test over the resamples
/// scored so far; candidates significantly worse at `alpha` are dropped.
/// Survivors are scored on every resample.
pub fn tune_race_anova(
    workflow: &Workflow,
    data: &Dataset,
    folds: &FoldSet,
    grid: &[ParamSet],
    metrics: &[MetricKind],
    options: &RaceOptions,
) -> Result<TuneResults, TuneError> {
    if grid.is_empty() {
        return Err(TuneError::EmptyGrid);
    }
    if options.burn_in < 2 {
        return Err(TuneError::InvalidBurnIn(options.burn_in));
    }
    if !(options.alpha > 0.0 && options.alpha < 1.0) {
        return Err(TuneError::InvalidAlpha(options.alpha));
    }
    let metrics = metric_set(workflow, data, metrics)?;
    let racing_metric = metrics[0];
    info!(
        "tune_race_anova: {} candidates x {} resamples, racing on {racing_metric}",
        grid.len(),
        folds.len()
    );

    let configured = grid
        .iter()
        .map(|params| finalize_workflow(workflow, params))
        .collect::<Result<Vec<_>, _>>()?;
    let mut candidates: Vec<CandidateResult> = config_ids(grid.len())
        .into_iter()
        .zip(grid)
        .map(|(config, params)| CandidateResult {
            config,
            params: params.clone(),
            metrics: Vec::new(),
            eliminated_at: None,
        })
        .collect();

    for (scored, split) in folds.splits().iter().enumerate() {
        for (candidate, workflow) in candidates.iter_mut().zip(&configured) {
            if !candidate.is_complete() {
                continue;
            }
            let (split_metrics, _) = fit_split(workflow, data, split, &metrics)?;
            candidate.metrics.extend(split_metrics);
        }
        let scored = scored + 1;
        if scored >= options.burn_in && scored < folds.len() {
            eliminate(&mut candidates, racing_metric, options.alpha, scored);
        }
    }
    let survivors = candidates.iter().filter(|c| c.is_complete()).count();
    info!("tune_race_anova: {survivors} of {} candidates finished", candidates.len());
    Ok(TuneResults {
        metrics,
        n_resamples: folds.len(),
        candidates,
    })
}

fn eliminate(candidates: &mut [CandidateResult], metric: MetricKind, alpha: f64, scored: usize) {
    let values: Vec<Option<Vec<f64>>> = candidates
        .iter()
        .map(|c| {
            let values = c.values(metric);
            (c.is_complete() && values.iter().all(|v| v.is_finite())).then_some(values)
        })
        .collect();
    let Some(best) = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.as_ref().map(|v| (i, stats::mean(v))))
        .min_by(|a, b| compare_means(metric, a.1, b.1))
        .map(|(i, _)| i)
    else {
        return;
    };
    let Some(best_values) = values[best].clone() else {
        return;
    };
    let best_config = candidates[best].config.clone();
    for (i, candidate) in candidates.iter_mut().enumerate() {
        let Some(own) = values[i].as_ref() else {
            continue;
        };
        if i == best {
            continue;
        }
        // positive differences mean the candidate is worse than the best
        let differences: Vec<f64> = own
            .iter()
            .zip(&best_values)
            .map(|(c, b)| if metric.higher_is_better() { b - c } else { c - b })
            .collect();
        let Some(test) = stats::paired_t(&differences) else {
            continue;
        };
        let one_sided = if test.mean > 0.0 { test.p_value / 2.0 } else { 1.0 };
        debug!(
            "{} vs {}: diff={:.4} p={:.4}",
            candidate.config, best_config, test.mean, one_sided
        );
        if one_sided < alpha {
            info!(
                "dropping {} after {scored} resamples (p={one_sided:.4})",
                candidate.config
            );
            candidate.eliminated_at = Some(scored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tune::ResampleMetric;

    fn candidate(config: &str, values: &[f64]) -> CandidateResult {
        CandidateResult {
            config: config.to_string(),
            params: ParamSet::new(),
            metrics: values
                .iter()
                .enumerate()
                .map(|(i, v)| ResampleMetric {
                    id: format!("Fold{}", i + 1),
                    metric: MetricKind::Rsq,
                    value: *v,
                })
                .collect(),
            eliminated_at: None,
        }
    }

    #[test]
    fn clearly_worse_candidate_is_dropped() {
        let mut candidates = vec![
            candidate("Config01", &[0.80, 0.82, 0.79, 0.81]),
            candidate("Config02", &[0.40, 0.45, 0.38, 0.42]),
            candidate("Config03", &[0.79, 0.83, 0.80, 0.80]),
        ];
        eliminate(&mut candidates, MetricKind::Rsq, 0.05, 4);
        assert_eq!(candidates[0].eliminated_at, None);
        assert_eq!(candidates[1].eliminated_at, Some(4));
        assert_eq!(candidates[2].eliminated_at, None);
    }

    #[test]
    fn options_are_validated() {
        let data = crate::data::sim::sim_regression(60, 1);
        let folds = crate::resample::vfold_cv(&data, &Default::default()).unwrap();
        let workflow = Workflow::new(
            crate::recipe::Recipe::new("outcome"),
            crate::ml::ModelSpec::linear_reg(),
        );
        let grid = vec![ParamSet::from([("penalty".to_string(), 0.1)])];
        let err = tune_race_anova(
            &workflow,
            &data,
            &folds,
            &grid,
            &[],
            &RaceOptions {
                burn_in: 1,
                alpha: 0.05,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TuneError::InvalidBurnIn(1)));
    }
}
