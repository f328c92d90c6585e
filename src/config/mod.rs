//! Experiment configuration read from TOML.
//!
//! Every section is optional. Missing fields take their defaults, and
//! [`ExperimentConfig::normalized`] clamps values that would make a run
//! meaningless (fewer than two folds, an empty grid, probabilities outside
//! `(0, 1)`).

mod defaults;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::OutcomeKind;
use crate::ml::ModelSpec;
use crate::ml::metrics::MetricKind;
use crate::recipe::{Recipe, StepSpec};
use crate::resample::{
    BootstrapOptions, McCvOptions, SplitOptions, ValidationSplitOptions, VfoldOptions,
};
use crate::tune::{ParamRange, RaceOptions};

use defaults::{
    MIN_ROWS, clamp_alpha, clamp_prob, default_dataset, default_grid_seed, default_grid_size,
    default_levels, default_output_dir, default_prob, default_rope,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("Duplicate {section} id {id}")]
    DuplicateId { section: &'static str, id: String },
}

/// One end-to-end modeling experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub split: SplitOptions,
    #[serde(default)]
    pub resampling: ResamplingConfig,
    /// Empty means a single recipe without steps.
    #[serde(default)]
    pub recipes: Vec<RecipeConfig>,
    /// Empty means the default linear or logistic model for the outcome.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Empty means the default set for the outcome mode.
    #[serde(default)]
    pub metrics: Vec<MetricKind>,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            split: SplitOptions::default(),
            resampling: ResamplingConfig::default(),
            recipes: Vec::new(),
            models: Vec::new(),
            metrics: Vec::new(),
            tuning: TuningConfig::default(),
            comparison: ComparisonConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Built-in simulation id or a dataset directory name under `data_dir`.
    #[serde(default = "default_dataset")]
    pub name: String,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Row count for built-in simulations.
    #[serde(default)]
    pub rows: Option<usize>,
    /// Seed for built-in simulations.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: default_dataset(),
            data_dir: None,
            rows: None,
            seed: None,
        }
    }
}

/// How training rows are resampled for evaluation and tuning.
///
/// `validation` replaces the `[split]` section: rows are split three ways and
/// each workflow is assessed once on the validation rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ResamplingConfig {
    Vfold(VfoldOptions),
    Bootstrap(BootstrapOptions),
    McCv(McCvOptions),
    Validation(ValidationSplitOptions),
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self::Vfold(VfoldOptions::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeConfig {
    pub id: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl RecipeConfig {
    pub fn to_recipe(&self, outcome: &str) -> Recipe {
        Recipe {
            outcome: outcome.to_string(),
            steps: self.steps.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub spec: ModelSpec,
    /// Ranges for tuning; empty means the model is used as written.
    #[serde(default)]
    pub tune: Vec<ParamRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridKind {
    #[default]
    Regular,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub grid: GridKind,
    /// Values per parameter for a regular grid.
    #[serde(default = "default_levels")]
    pub levels: usize,
    /// Candidates in a random grid.
    #[serde(default = "default_grid_size")]
    pub size: usize,
    #[serde(default = "default_grid_seed")]
    pub seed: u64,
    /// Race candidates instead of scoring all of them on every resample.
    #[serde(default)]
    pub race: Option<RaceOptions>,
    /// Pick the simplest candidate within one standard error of the best,
    /// judged by this parameter.
    #[serde(default)]
    pub one_std_err_param: Option<String>,
    #[serde(default)]
    pub larger_is_simpler: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            grid: GridKind::default(),
            levels: default_levels(),
            size: default_grid_size(),
            seed: default_grid_seed(),
            race: None,
            one_std_err_param: None,
            larger_is_simpler: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Half-width of the region of practical equivalence.
    #[serde(default = "default_rope")]
    pub rope: f64,
    /// Credible interval mass.
    #[serde(default = "default_prob")]
    pub prob: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            rope: default_rope(),
            prob: default_prob(),
        }
    }
}

impl ExperimentConfig {
    pub fn normalized(mut self) -> Self {
        if let Some(rows) = self.dataset.rows.as_mut() {
            *rows = (*rows).max(MIN_ROWS);
        }
        self.split.prop = clamp_split_prop(self.split.prop, SplitOptions::default().prop);
        match &mut self.resampling {
            ResamplingConfig::Vfold(options) => {
                options.v = options.v.max(2);
                options.repeats = options.repeats.max(1);
            }
            ResamplingConfig::Bootstrap(options) => options.times = options.times.max(1),
            ResamplingConfig::McCv(options) => {
                options.times = options.times.max(1);
                options.prop = clamp_split_prop(options.prop, McCvOptions::default().prop);
            }
            ResamplingConfig::Validation(options) => {
                let defaults = ValidationSplitOptions::default();
                options.prop_train = clamp_split_prop(options.prop_train, defaults.prop_train);
                options.prop_validation =
                    clamp_split_prop(options.prop_validation, defaults.prop_validation);
                // keep some rows for the test set
                if options.prop_train + options.prop_validation > 0.95 {
                    options.prop_train = defaults.prop_train;
                    options.prop_validation = defaults.prop_validation;
                }
            }
        }
        self.tuning.levels = self.tuning.levels.max(1);
        self.tuning.size = self.tuning.size.max(1);
        if let Some(race) = self.tuning.race.as_mut() {
            let defaults = RaceOptions::default();
            race.burn_in = race.burn_in.max(2);
            race.alpha = clamp_alpha(race.alpha, defaults.alpha);
        }
        self.comparison.prob = clamp_prob(self.comparison.prob);
        self.comparison.rope = if self.comparison.rope.is_finite() {
            self.comparison.rope.abs()
        } else {
            default_rope()
        };
        self
    }

    /// Recipes to run, with a step-less `basic` recipe when none are configured.
    pub fn recipes(&self) -> Vec<RecipeConfig> {
        if self.recipes.is_empty() {
            vec![RecipeConfig {
                id: "basic".to_string(),
                steps: Vec::new(),
            }]
        } else {
            self.recipes.clone()
        }
    }

    /// Models to run, with a plain linear or logistic model when none are configured.
    pub fn models(&self, mode: OutcomeKind) -> Vec<ModelConfig> {
        if !self.models.is_empty() {
            return self.models.clone();
        }
        let (id, spec) = match mode {
            OutcomeKind::Regression => ("linear_reg", ModelSpec::linear_reg()),
            OutcomeKind::Classification => ("logistic_reg", ModelSpec::logistic_reg()),
        };
        vec![ModelConfig {
            id: id.to_string(),
            spec,
            tune: Vec::new(),
        }]
    }

    /// Reject ids that would make workflow ids ambiguous.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unique("recipe", self.recipes.iter().map(|r| r.id.as_str()))?;
        check_unique("model", self.models.iter().map(|m| m.id.as_str()))
    }
}

fn clamp_split_prop(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.05, 0.95)
    } else {
        fallback
    }
}

fn check_unique<'a>(
    section: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = Vec::new();
    for id in ids {
        if seen.contains(&id) {
            return Err(ConfigError::DuplicateId {
                section,
                id: id.to_string(),
            });
        }
        seen.push(id);
    }
    Ok(())
}

/// Load, normalize and validate an experiment config.
pub fn load(path: &Path) -> Result<ExperimentConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str::<ExperimentConfig>(&text)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?
        .normalized();
    config.validate()?;
    Ok(config)
}

/// Write `config` as TOML, creating parent directories as needed.
pub fn save(config: &ExperimentConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
