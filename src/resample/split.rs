use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{DataError, Dataset};

use super::{
    FoldSet, ResampleError, ResampleKind, Split, check_prop, default_breaks, default_pool,
    default_seed, strata_or_single,
};

/// Options for a single training/test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitOptions {
    #[serde(default = "default_prop")]
    pub prop: f64,
    #[serde(default)]
    pub strata: Option<String>,
    #[serde(default = "default_breaks")]
    pub breaks: usize,
    #[serde(default = "default_pool")]
    pub pool: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            prop: default_prop(),
            strata: None,
            breaks: default_breaks(),
            pool: default_pool(),
            seed: default_seed(),
        }
    }
}

fn default_prop() -> f64 {
    0.75
}

/// Split rows into training (analysis) and test (assessment) sets.
///
/// Within each stratum rows are ordered by a keyed hash of the seed, stratum and
/// row index, and the first `round(n_s * prop)` go to training. Without strata
/// the first `floor(n * prop)` rows of that order are used.
pub fn initial_split(data: &Dataset, options: &SplitOptions) -> Result<Split, ResampleError> {
    check_prop(options.prop)?;
    let n = data.n_rows();
    let groups = strata_or_single(data, options.strata.as_deref(), options.breaks, options.pool)?;
    let stratified = options.strata.is_some();
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (stratum, members) in groups.into_iter().enumerate() {
        let ordered = hash_order(members, options.seed, stratum);
        let take = if stratified {
            ((ordered.len() as f64) * options.prop).round() as usize
        } else {
            ((ordered.len() as f64) * options.prop).floor() as usize
        };
        let take = take.min(ordered.len());
        train.extend_from_slice(&ordered[..take]);
        test.extend_from_slice(&ordered[take..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    debug!(
        "initial_split: {} training rows, {} test rows (strata: {:?})",
        train.len(),
        test.len(),
        options.strata
    );
    Split::new("train/test", train, test, n)
}

/// Options for a training/validation/test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSplitOptions {
    #[serde(default = "default_prop_train")]
    pub prop_train: f64,
    #[serde(default = "default_prop_validation")]
    pub prop_validation: f64,
    #[serde(default)]
    pub strata: Option<String>,
    #[serde(default = "default_breaks")]
    pub breaks: usize,
    #[serde(default = "default_pool")]
    pub pool: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ValidationSplitOptions {
    fn default() -> Self {
        Self {
            prop_train: default_prop_train(),
            prop_validation: default_prop_validation(),
            strata: None,
            breaks: default_breaks(),
            pool: default_pool(),
            seed: default_seed(),
        }
    }
}

fn default_prop_train() -> f64 {
    0.6
}

fn default_prop_validation() -> f64 {
    0.2
}

/// Disjoint training, validation and test row sets covering the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeWaySplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
    pub n_rows: usize,
}

impl ThreeWaySplit {
    pub fn training(&self, data: &Dataset) -> Result<Dataset, DataError> {
        data.take_rows(&self.train)
    }

    pub fn validation(&self, data: &Dataset) -> Result<Dataset, DataError> {
        data.take_rows(&self.validation)
    }

    pub fn testing(&self, data: &Dataset) -> Result<Dataset, DataError> {
        data.take_rows(&self.test)
    }

    /// One-split fold set: fit on training rows, assess on validation rows.
    ///
    /// Indices refer to the full dataset, so evaluate it against the same data.
    pub fn validation_set(&self) -> Result<FoldSet, ResampleError> {
        let split = Split::new(
            "validation",
            self.train.clone(),
            self.validation.clone(),
            self.n_rows,
        )?;
        Ok(FoldSet::new(ResampleKind::Validation, None, vec![split]))
    }

    /// Training plus validation rows against the test rows.
    pub fn final_split(&self) -> Result<Split, ResampleError> {
        let mut train: Vec<usize> = self.train.iter().chain(&self.validation).copied().collect();
        train.sort_unstable();
        Split::new("train/test", train, self.test.clone(), self.n_rows)
    }
}

pub fn initial_validation_split(
    data: &Dataset,
    options: &ValidationSplitOptions,
) -> Result<ThreeWaySplit, ResampleError> {
    check_prop(options.prop_train)?;
    check_prop(options.prop_validation)?;
    let total = options.prop_train + options.prop_validation;
    if total >= 1.0 {
        return Err(ResampleError::InvalidProportion(total));
    }
    let groups = strata_or_single(data, options.strata.as_deref(), options.breaks, options.pool)?;
    let mut out = ThreeWaySplit {
        train: Vec::new(),
        validation: Vec::new(),
        test: Vec::new(),
        n_rows: data.n_rows(),
    };
    for (stratum, members) in groups.into_iter().enumerate() {
        let ordered = hash_order(members, options.seed, stratum);
        let n_s = ordered.len();
        let n_train = ((n_s as f64) * options.prop_train).round() as usize;
        let n_val = ((n_s as f64) * options.prop_validation).round() as usize;
        let n_train = n_train.min(n_s);
        let n_val = n_val.min(n_s - n_train);
        out.train.extend_from_slice(&ordered[..n_train]);
        out.validation
            .extend_from_slice(&ordered[n_train..n_train + n_val]);
        out.test.extend_from_slice(&ordered[n_train + n_val..]);
    }
    out.train.sort_unstable();
    out.validation.sort_unstable();
    out.test.sort_unstable();
    Ok(out)
}

/// Deterministic per-row ordering keyed by seed, stratum and row index.
fn hash_order(members: Vec<usize>, seed: u64, stratum: usize) -> Vec<usize> {
    let mut keyed: Vec<(u128, usize)> = members
        .into_iter()
        .map(|row| {
            let hash = blake3::hash(format!("{seed}|{stratum}|{row}").as_bytes());
            let key = hash.as_bytes()[..16]
                .iter()
                .fold(0u128, |acc, &byte| (acc << 8) | u128::from(byte));
            (key, row)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, row)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sim;

    #[test]
    fn split_is_deterministic_and_seed_dependent() {
        let data = sim::sim_concrete(200, 1);
        let options = SplitOptions::default();
        let a = initial_split(&data, &options).unwrap();
        let b = initial_split(&data, &options).unwrap();
        assert_eq!(a, b);
        let other = initial_split(
            &data,
            &SplitOptions {
                seed: 7,
                ..options
            },
        )
        .unwrap();
        assert_ne!(a.analysis(), other.analysis());
    }

    #[test]
    fn unstratified_split_uses_floor() {
        let data = sim::sim_regression(101, 1);
        let split = initial_split(&data, &SplitOptions::default()).unwrap();
        assert_eq!(split.analysis().len(), 75);
        assert_eq!(split.assessment().len(), 26);
    }

    #[test]
    fn rejects_bad_proportion() {
        let data = sim::sim_regression(10, 1);
        let options = SplitOptions {
            prop: 1.0,
            ..SplitOptions::default()
        };
        assert!(matches!(
            initial_split(&data, &options),
            Err(ResampleError::InvalidProportion(_))
        ));
    }

    #[test]
    fn three_way_split_partitions_rows() {
        let data = sim::sim_cells(500, 2);
        let options = ValidationSplitOptions {
            strata: Some("class".into()),
            ..ValidationSplitOptions::default()
        };
        let split = initial_validation_split(&data, &options).unwrap();
        let mut all: Vec<usize> = split
            .train
            .iter()
            .chain(&split.validation)
            .chain(&split.test)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
        assert!((split.train.len() as f64 - 300.0).abs() <= 2.0);
        assert!((split.validation.len() as f64 - 100.0).abs() <= 2.0);

        let folds = split.validation_set().unwrap();
        assert_eq!(folds.len(), 1);
        assert_eq!(folds.splits()[0].assessment(), split.validation.as_slice());
    }
}
