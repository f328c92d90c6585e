use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Dataset;

use super::{
    FoldSet, ResampleError, ResampleKind, Split, check_prop, default_breaks, default_pool,
    default_seed, strata_or_single,
};

/// Redraws allowed when a bootstrap sample happens to contain every row.
const MAX_BOOTSTRAP_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfoldOptions {
    #[serde(default = "default_v")]
    pub v: usize,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    #[serde(default)]
    pub strata: Option<String>,
    #[serde(default = "default_breaks")]
    pub breaks: usize,
    #[serde(default = "default_pool")]
    pub pool: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for VfoldOptions {
    fn default() -> Self {
        Self {
            v: default_v(),
            repeats: default_repeats(),
            strata: None,
            breaks: default_breaks(),
            pool: default_pool(),
            seed: default_seed(),
        }
    }
}

fn default_v() -> usize {
    10
}

fn default_repeats() -> usize {
    1
}

fn default_times() -> usize {
    25
}

fn default_mc_prop() -> f64 {
    0.75
}

/// V-fold cross-validation, optionally repeated and stratified.
///
/// Within a repeat every row lands in exactly one assessment set. Rows of each
/// shuffled stratum are dealt round-robin across folds, continuing the deal
/// from one stratum to the next so fold sizes differ by at most one.
pub fn vfold_cv(data: &Dataset, options: &VfoldOptions) -> Result<FoldSet, ResampleError> {
    let n = data.n_rows();
    if options.v < 2 {
        return Err(ResampleError::InvalidCount {
            name: "v",
            min: 2,
            value: options.v,
        });
    }
    if options.repeats < 1 {
        return Err(ResampleError::InvalidCount {
            name: "repeats",
            min: 1,
            value: options.repeats,
        });
    }
    if n < options.v {
        return Err(ResampleError::TooFewRows { n, v: options.v });
    }
    let groups = strata_or_single(data, options.strata.as_deref(), options.breaks, options.pool)?;
    let mut rng = StdRng::seed_from_u64(options.seed);
    let width = digits(options.v);
    let repeat_width = digits(options.repeats);
    let mut splits = Vec::with_capacity(options.v * options.repeats);

    for repeat in 0..options.repeats {
        let mut fold_of = vec![0usize; n];
        let mut dealt = 0usize;
        for members in &groups {
            let mut members = members.clone();
            members.shuffle(&mut rng);
            for row in members {
                fold_of[row] = dealt % options.v;
                dealt += 1;
            }
        }
        for fold in 0..options.v {
            let mut analysis = Vec::with_capacity(n - n / options.v);
            let mut assessment = Vec::with_capacity(n / options.v + 1);
            for (row, &f) in fold_of.iter().enumerate() {
                if f == fold {
                    assessment.push(row);
                } else {
                    analysis.push(row);
                }
            }
            let fold_id = format!("Fold{:0width$}", fold + 1, width = width);
            let id = if options.repeats > 1 {
                format!("Repeat{:0w$}_{fold_id}", repeat + 1, w = repeat_width)
            } else {
                fold_id
            };
            splits.push(Split::new(id, analysis, assessment, n)?);
        }
    }
    debug!("vfold_cv: {} splits over {n} rows", splits.len());
    Ok(FoldSet::new(
        ResampleKind::Vfold {
            v: options.v,
            repeats: options.repeats,
        },
        options.strata.clone(),
        splits,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapOptions {
    #[serde(default = "default_times")]
    pub times: usize,
    #[serde(default)]
    pub strata: Option<String>,
    #[serde(default = "default_breaks")]
    pub breaks: usize,
    #[serde(default = "default_pool")]
    pub pool: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            times: default_times(),
            strata: None,
            breaks: default_breaks(),
            pool: default_pool(),
            seed: default_seed(),
        }
    }
}

/// Bootstrap resamples: analysis rows drawn with replacement (within strata),
/// assessment rows are the out-of-bag rows.
pub fn bootstraps(data: &Dataset, options: &BootstrapOptions) -> Result<FoldSet, ResampleError> {
    let n = data.n_rows();
    if options.times < 1 {
        return Err(ResampleError::InvalidCount {
            name: "times",
            min: 1,
            value: options.times,
        });
    }
    if n < 2 {
        return Err(ResampleError::TooFewRows { n, v: 2 });
    }
    let groups = strata_or_single(data, options.strata.as_deref(), options.breaks, options.pool)?;
    let mut rng = StdRng::seed_from_u64(options.seed);
    let width = digits(options.times);
    let mut splits = Vec::with_capacity(options.times);

    for b in 0..options.times {
        let id = format!("Bootstrap{:0width$}", b + 1, width = width);
        let mut attempt = 0;
        let split = loop {
            let mut drawn = vec![false; n];
            let mut analysis = Vec::with_capacity(n);
            for members in &groups {
                for _ in 0..members.len() {
                    let row = members[rng.random_range(0..members.len())];
                    drawn[row] = true;
                    analysis.push(row);
                }
            }
            let assessment: Vec<usize> = (0..n).filter(|&row| !drawn[row]).collect();
            if !assessment.is_empty() {
                break Split::new(id.clone(), analysis, assessment, n)?;
            }
            attempt += 1;
            if attempt >= MAX_BOOTSTRAP_ATTEMPTS {
                return Err(ResampleError::EmptyAssessment { id });
            }
        };
        splits.push(split);
    }
    Ok(FoldSet::new(
        ResampleKind::Bootstrap {
            times: options.times,
        },
        options.strata.clone(),
        splits,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McCvOptions {
    #[serde(default = "default_mc_prop")]
    pub prop: f64,
    #[serde(default = "default_times")]
    pub times: usize,
    #[serde(default)]
    pub strata: Option<String>,
    #[serde(default = "default_breaks")]
    pub breaks: usize,
    #[serde(default = "default_pool")]
    pub pool: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for McCvOptions {
    fn default() -> Self {
        Self {
            prop: default_mc_prop(),
            times: default_times(),
            strata: None,
            breaks: default_breaks(),
            pool: default_pool(),
            seed: default_seed(),
        }
    }
}

/// Monte Carlo cross-validation: repeated independent random splits.
pub fn mc_cv(data: &Dataset, options: &McCvOptions) -> Result<FoldSet, ResampleError> {
    check_prop(options.prop)?;
    let n = data.n_rows();
    if options.times < 1 {
        return Err(ResampleError::InvalidCount {
            name: "times",
            min: 1,
            value: options.times,
        });
    }
    let groups = strata_or_single(data, options.strata.as_deref(), options.breaks, options.pool)?;
    let mut rng = StdRng::seed_from_u64(options.seed);
    let width = digits(options.times);
    let mut splits = Vec::with_capacity(options.times);
    for t in 0..options.times {
        let mut analysis = Vec::new();
        let mut assessment = Vec::new();
        for members in &groups {
            let mut members = members.clone();
            members.shuffle(&mut rng);
            let take = ((members.len() as f64) * options.prop).floor() as usize;
            analysis.extend_from_slice(&members[..take]);
            assessment.extend_from_slice(&members[take..]);
        }
        analysis.sort_unstable();
        assessment.sort_unstable();
        let id = format!("Resample{:0width$}", t + 1, width = width);
        if assessment.is_empty() {
            return Err(ResampleError::EmptyAssessment { id });
        }
        splits.push(Split::new(id, analysis, assessment, n)?);
    }
    Ok(FoldSet::new(
        ResampleKind::MonteCarlo {
            prop: options.prop,
            times: options.times,
        },
        options.strata.clone(),
        splits,
    ))
}

fn digits(value: usize) -> usize {
    value.max(1).to_string().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sim;

    #[test]
    fn fold_ids_are_padded() {
        let data = sim::sim_regression(40, 1);
        let folds = vfold_cv(
            &data,
            &VfoldOptions {
                v: 10,
                repeats: 2,
                ..VfoldOptions::default()
            },
        )
        .unwrap();
        assert_eq!(folds.len(), 20);
        assert_eq!(folds.splits()[0].id(), "Repeat1_Fold01");
        assert_eq!(folds.splits()[19].id(), "Repeat2_Fold10");
    }

    #[test]
    fn vfold_rejects_more_folds_than_rows() {
        let data = sim::sim_regression(5, 1);
        let err = vfold_cv(&data, &VfoldOptions::default()).unwrap_err();
        assert!(matches!(err, ResampleError::TooFewRows { n: 5, v: 10 }));
    }

    #[test]
    fn bootstrap_holdout_is_out_of_bag() {
        let data = sim::sim_regression(60, 3);
        let boots = bootstraps(
            &data,
            &BootstrapOptions {
                times: 5,
                ..BootstrapOptions::default()
            },
        )
        .unwrap();
        for split in boots.splits() {
            assert_eq!(split.analysis().len(), 60);
            for row in split.assessment() {
                assert!(!split.analysis().contains(row));
            }
            assert!(!split.assessment().is_empty());
        }
    }

    #[test]
    fn mc_cv_uses_floor_of_prop() {
        let data = sim::sim_regression(30, 3);
        let folds = mc_cv(
            &data,
            &McCvOptions {
                prop: 0.8,
                times: 3,
                ..McCvOptions::default()
            },
        )
        .unwrap();
        assert_eq!(folds.len(), 3);
        assert!(folds.splits().iter().all(|s| s.analysis().len() == 24));
        assert_ne!(folds.splits()[0].analysis(), folds.splits()[1].analysis());
    }
}
