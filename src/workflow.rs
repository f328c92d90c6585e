//! Recipe plus model, fitted and evaluated as one unit.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::data::{DataError, Dataset};
use crate::ml::metrics::{MetricError, MetricKind, MetricResult, evaluate_metrics};
use crate::ml::{FittedModel, ModelError, ModelSpec, Predictions, Target};
use crate::recipe::{PreparedRecipe, Recipe, RecipeError};
use crate::resample::{ResampleError, Split};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("preprocessing failed: {0}")]
    Recipe(#[from] RecipeError),
    #[error("model failed: {0}")]
    Model(#[from] ModelError),
    #[error("metric failed: {0}")]
    Metric(#[from] MetricError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// Preprocessing recipe and model specification fitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub recipe: Recipe,
    pub model: ModelSpec,
}

impl Workflow {
    pub fn new(recipe: Recipe, model: ModelSpec) -> Self {
        Self { recipe, model }
    }

    /// Tunable parameter names of the recipe steps and the model.
    pub fn tunable_params(&self) -> Vec<String> {
        let mut names = self.recipe.tunable_params();
        for name in self.model.tunable_params() {
            if !names.iter().any(|n| n == name) {
                names.push((*name).to_string());
            }
        }
        names
    }

    /// Set a parameter on the model if it has one by that name, otherwise on
    /// the recipe steps.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<(), WorkflowError> {
        if self.model.tunable_params().contains(&name) {
            self.model.set_param(name, value)?;
        } else {
            self.recipe.set_param(name, value)?;
        }
        Ok(())
    }

    /// Prep the recipe and fit the model on `training` only.
    pub fn fit(&self, training: &Dataset) -> Result<FittedWorkflow, WorkflowError> {
        let recipe = self.recipe.prep(training)?;
        let baked = recipe.bake(training)?;
        let x = baked.predictor_matrix()?;
        let target = Target::from_dataset(&baked)?;
        let model = self.model.fit(&x, &target)?;
        Ok(FittedWorkflow { recipe, model })
    }
}

/// Prepared recipe and fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedWorkflow {
    pub recipe: PreparedRecipe,
    pub model: FittedModel,
}

impl FittedWorkflow {
    /// Bake `data` and predict. The outcome column is not required.
    pub fn predict(&self, data: &Dataset) -> Result<Predictions, WorkflowError> {
        let baked = self.recipe.bake(data)?;
        Ok(self.model.predict(&baked.predictor_matrix()?)?)
    }

    /// Predict `data` and score the predictions against its (baked) outcome.
    ///
    /// An empty metric list uses the default set for the outcome mode.
    pub fn evaluate(
        &self,
        data: &Dataset,
        metrics: &[MetricKind],
    ) -> Result<(Vec<MetricResult>, Predictions), WorkflowError> {
        let baked = self.recipe.bake(data)?;
        let predictions = self.model.predict(&baked.predictor_matrix()?)?;
        let truth = Target::from_dataset(&baked)?;
        let metrics = resolve_metrics(metrics, &truth);
        let results = evaluate_metrics(&metrics, &truth, &predictions)?;
        Ok((results, predictions))
    }
}

pub(crate) fn resolve_metrics(metrics: &[MetricKind], truth: &Target) -> Vec<MetricKind> {
    if metrics.is_empty() {
        MetricKind::defaults(truth.kind())
    } else {
        metrics.to_vec()
    }
}

/// Final fit on the training rows, scored once on the test rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastFit {
    pub split_id: String,
    pub metrics: Vec<MetricResult>,
    pub predictions: Predictions,
    pub fitted: FittedWorkflow,
}

pub fn last_fit(
    workflow: &Workflow,
    data: &Dataset,
    split: &Split,
    metrics: &[MetricKind],
) -> Result<LastFit, WorkflowError> {
    let training = split.training(data)?;
    let testing = split.testing(data)?;
    info!(
        "last_fit: {} on {} training rows, {} test rows",
        workflow.model.name(),
        training.n_rows(),
        testing.n_rows()
    );
    let fitted = workflow.fit(&training)?;
    let (metrics, predictions) = fitted.evaluate(&testing, metrics)?;
    Ok(LastFit {
        split_id: split.id().to_string(),
        metrics,
        predictions,
        fitted,
    })
}
