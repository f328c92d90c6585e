//! End-to-end run of an [`ExperimentConfig`].
//!
//! Load data, split off a test set, resample the training rows, tune and
//! compare every recipe x model workflow, refit the winner on all training
//! rows, then score it once on the test set. Each stage writes its report into
//! the output directory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{ArtifactError, ArtifactKind, save_artifact};
use crate::compare::{
    CompareError, Contrast, PairedComparison, RankedWorkflow, WorkflowSet, WorkflowSetResults,
};
use crate::config::{ConfigError, ExperimentConfig, GridKind, ResamplingConfig};
use crate::data::registry::{self, DEFAULT_SIM_SEED};
use crate::data::{DataError, Dataset, DatasetLoadError, OutcomeKind};
use crate::ml::metrics::{MetricKind, MetricResult};
use crate::resample::{
    FoldSet, ResampleError, Split, bootstraps, initial_split, initial_validation_split, mc_cv,
    vfold_cv,
};
use crate::tune::{
    ControlResamples, ParamSet, ResampleResults, TuneError, TuneResults, finalize_workflow,
    fit_resamples, grid_random, grid_regular, metric_set, tune_grid, tune_race_anova,
};
use crate::workflow::{WorkflowError, last_fit};

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dataset(#[from] DatasetLoadError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Tune(#[from] TuneError),
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("dataset {0} has no outcome column")]
    NoOutcome(String),
    #[error("model {model} does not support {mode:?} outcomes")]
    UnsupportedMode { model: String, mode: OutcomeKind },
    #[error("no workflow produced a value for {0}")]
    NothingRanked(MetricKind),
}

/// Where one workflow's resampling results came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub wflow_id: String,
    /// Parameters chosen by tuning; empty when the workflow was not tuned.
    pub params: ParamSet,
    pub candidates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub metric: MetricKind,
    pub ranking: Vec<RankedWorkflow>,
    /// Best workflow against each of the others.
    pub paired_t_tests: Vec<PairedComparison>,
    pub contrasts: Vec<Contrast>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub dataset: String,
    pub outcome: String,
    pub mode: OutcomeKind,
    pub n_training: usize,
    pub n_testing: usize,
    pub n_resamples: usize,
    pub metrics: Vec<MetricKind>,
    pub workflows: Vec<WorkflowOutcome>,
    pub ranking: Vec<RankedWorkflow>,
    pub best: String,
    pub test_metrics: Vec<MetricResult>,
    pub output_dir: PathBuf,
}

/// Load the configured dataset, honoring simulation size and seed overrides.
pub fn load_dataset(config: &ExperimentConfig) -> Result<Dataset, ExperimentError> {
    let dataset = &config.dataset;
    if registry::is_builtin(&dataset.name) && (dataset.rows.is_some() || dataset.seed.is_some()) {
        let rows = dataset.rows.unwrap_or_else(|| {
            registry::BUILTIN_DATASETS
                .iter()
                .find(|(name, _)| *name == dataset.name)
                .map(|(_, n)| *n)
                .unwrap_or(500)
        });
        let seed = dataset.seed.unwrap_or(DEFAULT_SIM_SEED);
        return Ok(registry::generate(&dataset.name, rows, seed)?);
    }
    Ok(registry::load_named(&dataset.name, dataset.data_dir.as_deref())?)
}

/// Resamples of `data` for the configured scheme.
///
/// A validation scheme yields a single split of `data` itself.
pub fn fold_set(data: &Dataset, resampling: &ResamplingConfig) -> Result<FoldSet, ResampleError> {
    match resampling {
        ResamplingConfig::Vfold(options) => vfold_cv(data, options),
        ResamplingConfig::Bootstrap(options) => bootstraps(data, options),
        ResamplingConfig::McCv(options) => mc_cv(data, options),
        ResamplingConfig::Validation(options) => {
            initial_validation_split(data, options)?.validation_set()
        }
    }
}

/// Held-out test split, the rows resampling works on, and the resamples.
///
/// With a validation scheme the three-way split replaces the initial split:
/// resample indices refer to the full dataset and the final fit uses training
/// plus validation rows.
fn partition(
    data: &Dataset,
    config: &ExperimentConfig,
) -> Result<(Split, Dataset, FoldSet), ExperimentError> {
    if let ResamplingConfig::Validation(options) = &config.resampling {
        let three = initial_validation_split(data, options)?;
        info!(
            "validation split: {} training, {} validation, {} test rows",
            three.train.len(),
            three.validation.len(),
            three.test.len()
        );
        return Ok((three.final_split()?, data.clone(), three.validation_set()?));
    }
    let split = initial_split(data, &config.split)?;
    let training = split.training(data)?;
    let folds = fold_set(&training, &config.resampling)?;
    Ok((split, training, folds))
}

pub fn run(config: &ExperimentConfig) -> Result<ExperimentSummary, ExperimentError> {
    let data = load_dataset(config)?;
    let outcome = data
        .outcome()
        .ok_or_else(|| ExperimentError::NoOutcome(config.dataset.name.clone()))?
        .to_string();
    let mode = data.outcome_kind()?;
    info!(
        "experiment on {} ({} rows, outcome {outcome}, {mode:?})",
        config.dataset.name,
        data.n_rows()
    );

    let (split, training, folds) = partition(&data, config)?;

    let recipes: Vec<_> = config
        .recipes()
        .iter()
        .map(|r| (r.id.clone(), r.to_recipe(&outcome)))
        .collect();
    let models = config.models(mode);
    for model in &models {
        if !model.spec.supports(mode) {
            return Err(ExperimentError::UnsupportedMode {
                model: model.id.clone(),
                mode,
            });
        }
    }
    let specs: Vec<_> = models.iter().map(|m| (m.id.clone(), m.spec.clone())).collect();
    let set = WorkflowSet::cross(&recipes, &specs);

    let Some((_, first)) = set.workflows.first() else {
        return Err(ExperimentError::NothingRanked(MetricKind::defaults(mode)[0]));
    };
    let metrics = metric_set(first, &training, &config.metrics)?;
    let rank_metric = metrics[0];
    let output_dir = &config.output_dir;

    let mut outcomes = Vec::with_capacity(set.len());
    let mut results = Vec::with_capacity(set.len());
    let mut finalized = BTreeMap::new();
    for (index, (wflow_id, workflow)) in set.workflows.iter().enumerate() {
        // cross order is recipe-major
        let ranges = &models[index % models.len()].tune;
        let (chosen, resampled, params, candidates) = if ranges.is_empty() {
            let resampled = fit_resamples(
                workflow,
                &training,
                &folds,
                &metrics,
                &ControlResamples::default(),
            )?;
            (workflow.clone(), resampled, ParamSet::new(), 1)
        } else {
            let grid = match config.tuning.grid {
                GridKind::Regular => grid_regular(ranges, config.tuning.levels)?,
                GridKind::Random => grid_random(ranges, config.tuning.size, config.tuning.seed)?,
            };
            let tuned = match &config.tuning.race {
                Some(race) => tune_race_anova(workflow, &training, &folds, &grid, &metrics, race)?,
                None => tune_grid(workflow, &training, &folds, &grid, &metrics)?,
            };
            save_artifact(
                &output_dir.join("tuning").join(format!("{wflow_id}.json")),
                ArtifactKind::TuneReport,
                &tuned,
            )?;
            let params = select_params(config, &tuned, rank_metric)?;
            info!("{wflow_id}: selected {params:?}");
            let chosen = finalize_workflow(workflow, &params)?;
            let resampled = chosen_resamples(&tuned, &params);
            (chosen, resampled, params, grid.len())
        };
        outcomes.push(WorkflowOutcome {
            wflow_id: wflow_id.clone(),
            params,
            candidates,
        });
        results.push((wflow_id.clone(), resampled));
        finalized.insert(wflow_id.clone(), chosen);
    }

    let set_results = WorkflowSetResults { metrics: metrics.clone(), results };
    save_artifact(
        &output_dir.join("resamples.json"),
        ArtifactKind::ResampleReport,
        &set_results,
    )?;

    let ranking = set_results.rank_results(rank_metric);
    let best = ranking
        .first()
        .filter(|row| !row.mean.is_nan())
        .map(|row| row.wflow_id.clone())
        .ok_or(ExperimentError::NothingRanked(rank_metric))?;
    info!("best workflow by {rank_metric}: {best}");

    let comparison = compare_to_best(config, &set_results, &ranking, &best, rank_metric);
    save_artifact(
        &output_dir.join("comparison.json"),
        ArtifactKind::ComparisonReport,
        &comparison,
    )?;

    let Some(winner) = finalized.get(&best) else {
        return Err(CompareError::UnknownWorkflow(best).into());
    };
    let final_fit = last_fit(winner, &data, &split, &metrics)?;
    for result in &final_fit.metrics {
        info!("test {}: {:.4}", result.metric, result.value);
    }
    save_artifact(
        &output_dir.join("workflow.json"),
        ArtifactKind::FittedWorkflow,
        &final_fit.fitted,
    )?;
    save_artifact(
        &output_dir.join("test_metrics.json"),
        ArtifactKind::TestReport,
        &final_fit,
    )?;

    Ok(ExperimentSummary {
        dataset: config.dataset.name.clone(),
        outcome,
        mode,
        n_training: split.analysis().len(),
        n_testing: split.assessment().len(),
        n_resamples: folds.len(),
        metrics,
        workflows: outcomes,
        ranking,
        best,
        test_metrics: final_fit.metrics,
        output_dir: output_dir.clone(),
    })
}

fn select_params(
    config: &ExperimentConfig,
    tuned: &TuneResults,
    metric: MetricKind,
) -> Result<ParamSet, TuneError> {
    match &config.tuning.one_std_err_param {
        Some(param) => {
            tuned.select_by_one_std_err(metric, param, config.tuning.larger_is_simpler)
        }
        None => tuned.select_best(metric),
    }
}

/// Resample metrics of the candidate that was picked.
fn chosen_resamples(tuned: &TuneResults, params: &ParamSet) -> ResampleResults {
    let metrics = tuned
        .candidates
        .iter()
        .find(|c| &c.params == params)
        .map(|c| c.metrics.clone())
        .unwrap_or_default();
    ResampleResults {
        metrics,
        models: None,
    }
}

fn compare_to_best(
    config: &ExperimentConfig,
    results: &WorkflowSetResults,
    ranking: &[RankedWorkflow],
    best: &str,
    metric: MetricKind,
) -> ComparisonReport {
    let mut paired_t_tests = Vec::new();
    let mut contrasts = Vec::new();
    for other in ranking.iter().filter(|row| row.wflow_id != best) {
        match results.paired_t_test(best, &other.wflow_id, metric) {
            Ok(test) => paired_t_tests.push(test),
            Err(err) => warn!("skipping t-test {best} vs {}: {err}", other.wflow_id),
        }
        match results.posterior_contrast(
            best,
            &other.wflow_id,
            metric,
            config.comparison.rope,
            config.comparison.prob,
        ) {
            Ok(contrast) => contrasts.push(contrast),
            Err(err) => warn!("skipping contrast {best} vs {}: {err}", other.wflow_id),
        }
    }
    ComparisonReport {
        metric,
        ranking: ranking.to_vec(),
        paired_t_tests,
        contrasts,
    }
}
