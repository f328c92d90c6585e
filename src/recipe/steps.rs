use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::{Column, Dataset};
use crate::stats;

use super::pca::PcaProjection;
use super::spline::SplineBasis;
use super::{RecipeError, Selector};

/// One unfitted preprocessing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepSpec {
    /// `log_base(x + offset)`.
    Log {
        columns: Selector,
        #[serde(default = "default_log_base")]
        base: f64,
        #[serde(default)]
        offset: f64,
    },
    /// Pool infrequent levels into one label.
    Other {
        #[serde(default = "nominal_predictors")]
        columns: Selector,
        #[serde(default = "default_other_threshold")]
        threshold: f64,
        #[serde(default = "default_other_label")]
        other_label: String,
    },
    /// Indicator columns for nominal levels.
    Dummy {
        #[serde(default = "nominal_predictors")]
        columns: Selector,
        #[serde(default)]
        one_hot: bool,
    },
    /// Pairwise products between two selections.
    Interact { terms: Vec<InteractionTerm> },
    /// Natural spline basis expansion.
    Ns {
        columns: Selector,
        #[serde(default = "default_deg_free")]
        deg_free: usize,
    },
    /// Principal component projection.
    Pca {
        #[serde(default = "numeric_predictors")]
        columns: Selector,
        #[serde(default = "default_num_comp")]
        num_comp: usize,
        #[serde(default)]
        threshold: Option<f64>,
    },
    Normalize {
        #[serde(default = "numeric_predictors")]
        columns: Selector,
    },
    /// Drop zero-variance columns.
    Zv {
        #[serde(default = "all_predictors")]
        columns: Selector,
    },
    ImputeMean {
        #[serde(default = "numeric_predictors")]
        columns: Selector,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionTerm {
    pub left: Selector,
    pub right: Selector,
}

fn default_log_base() -> f64 {
    std::f64::consts::E
}

fn default_other_threshold() -> f64 {
    0.05
}

fn default_other_label() -> String {
    "other".to_string()
}

fn default_deg_free() -> usize {
    5
}

fn default_num_comp() -> usize {
    5
}

fn nominal_predictors() -> Selector {
    Selector::AllNominalPredictors
}

fn numeric_predictors() -> Selector {
    Selector::AllNumericPredictors
}

fn all_predictors() -> Selector {
    Selector::AllPredictors
}

/// Training levels kept for one nominal column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLevels {
    pub column: String,
    pub levels: Vec<String>,
}

/// Training location and scale of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMoments {
    pub column: String,
    pub mean: f64,
    pub sd: f64,
}

/// A step with every parameter estimated from training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FittedStep {
    Log {
        columns: Vec<String>,
        base: f64,
        offset: f64,
    },
    Other {
        kept: Vec<ColumnLevels>,
        other_label: String,
    },
    Dummy {
        levels: Vec<ColumnLevels>,
        one_hot: bool,
    },
    Interact {
        pairs: Vec<(String, String)>,
    },
    Ns {
        bases: Vec<SplineBasis>,
    },
    Pca {
        projection: PcaProjection,
    },
    Normalize {
        moments: Vec<ColumnMoments>,
    },
    Zv {
        removed: Vec<String>,
    },
    ImputeMean {
        means: Vec<ColumnMoments>,
    },
}

impl StepSpec {
    pub fn name(&self) -> &'static str {
        match self {
            StepSpec::Log { .. } => "log",
            StepSpec::Other { .. } => "other",
            StepSpec::Dummy { .. } => "dummy",
            StepSpec::Interact { .. } => "interact",
            StepSpec::Ns { .. } => "ns",
            StepSpec::Pca { .. } => "pca",
            StepSpec::Normalize { .. } => "normalize",
            StepSpec::Zv { .. } => "zv",
            StepSpec::ImputeMean { .. } => "impute_mean",
        }
    }

    /// Tunable parameter names carried by this step.
    pub fn tunable_params(&self) -> &'static [&'static str] {
        match self {
            StepSpec::Ns { .. } => &["deg_free"],
            StepSpec::Pca { .. } => &["num_comp", "threshold"],
            StepSpec::Other { .. } => &["threshold"],
            _ => &[],
        }
    }

    /// Set a tunable parameter; returns `false` if this step has no such parameter.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<bool, RecipeError> {
        match (self, name) {
            (StepSpec::Ns { deg_free, .. }, "deg_free") => {
                *deg_free = positive_count(name, value)?;
                Ok(true)
            }
            (StepSpec::Pca { num_comp, .. }, "num_comp") => {
                *num_comp = positive_count(name, value)?;
                Ok(true)
            }
            (StepSpec::Pca { threshold, .. }, "threshold") => {
                if !(value > 0.0 && value <= 1.0) {
                    return Err(invalid(name, "variance threshold must be in (0, 1]"));
                }
                *threshold = Some(value);
                Ok(true)
            }
            (StepSpec::Other { threshold, .. }, "threshold") => {
                if !value.is_finite() || value < 0.0 {
                    return Err(invalid(name, "must be a non-negative number"));
                }
                *threshold = value;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Estimate the step's parameters from `data` (the training data as
    /// transformed by the preceding steps).
    pub(super) fn fit(&self, data: &Dataset) -> Result<FittedStep, RecipeError> {
        match self {
            StepSpec::Log {
                columns,
                base,
                offset,
            } => {
                if !(*base > 0.0) || *base == 1.0 {
                    return Err(invalid("base", "must be positive and not 1"));
                }
                let columns = columns.resolve(data)?;
                for column in &columns {
                    data.numeric(column)?;
                }
                Ok(FittedStep::Log {
                    columns,
                    base: *base,
                    offset: *offset,
                })
            }
            StepSpec::Other {
                columns,
                threshold,
                other_label,
            } => {
                let mut kept = Vec::new();
                for column in columns.resolve(data)? {
                    let values = data.nominal(&column)?;
                    let min_count = if *threshold < 1.0 {
                        threshold * values.len() as f64
                    } else {
                        *threshold
                    };
                    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                    for value in values {
                        *counts.entry(value.as_str()).or_default() += 1;
                    }
                    let levels = counts
                        .into_iter()
                        .filter(|(_, count)| *count as f64 >= min_count)
                        .map(|(level, _)| level.to_string())
                        .collect();
                    kept.push(ColumnLevels { column, levels });
                }
                Ok(FittedStep::Other {
                    kept,
                    other_label: other_label.clone(),
                })
            }
            StepSpec::Dummy { columns, one_hot } => {
                let mut levels = Vec::new();
                for column in columns.resolve(data)? {
                    let column_levels = data.levels(&column)?;
                    levels.push(ColumnLevels {
                        column,
                        levels: column_levels,
                    });
                }
                Ok(FittedStep::Dummy {
                    levels,
                    one_hot: *one_hot,
                })
            }
            StepSpec::Interact { terms } => {
                let mut pairs = Vec::new();
                for term in terms {
                    let left = term.left.resolve(data)?;
                    let right = term.right.resolve(data)?;
                    for a in &left {
                        data.numeric(a)?;
                        for b in &right {
                            data.numeric(b)?;
                            let pair = (a.clone(), b.clone());
                            let mirrored = (b.clone(), a.clone());
                            if a != b && !pairs.contains(&pair) && !pairs.contains(&mirrored) {
                                pairs.push(pair);
                            }
                        }
                    }
                }
                Ok(FittedStep::Interact { pairs })
            }
            StepSpec::Ns { columns, deg_free } => {
                let mut bases = Vec::new();
                for column in columns.resolve(data)? {
                    let values = data.numeric(&column)?;
                    bases.push(SplineBasis::fit(&column, values, *deg_free)?);
                }
                Ok(FittedStep::Ns { bases })
            }
            StepSpec::Pca {
                columns,
                num_comp,
                threshold,
            } => {
                if *num_comp == 0 {
                    return Err(invalid("num_comp", "must be at least 1"));
                }
                let names = columns.resolve(data)?;
                let mut values = Vec::with_capacity(names.len());
                for name in &names {
                    values.push(data.numeric(name)?);
                }
                let projection = PcaProjection::fit(names, &values, *num_comp, *threshold)?;
                Ok(FittedStep::Pca { projection })
            }
            StepSpec::Normalize { columns } => {
                let mut moments = Vec::new();
                for column in columns.resolve(data)? {
                    let finite: Vec<f64> = finite_values(data.numeric(&column)?);
                    let mean = stats::mean(&finite);
                    let sd = stats::std_dev(&finite);
                    if !(sd > 0.0) {
                        warn!("normalize: column {column} has no spread; centering only");
                    }
                    moments.push(ColumnMoments { column, mean, sd });
                }
                Ok(FittedStep::Normalize { moments })
            }
            StepSpec::Zv { columns } => {
                let mut removed = Vec::new();
                for column in columns.resolve(data)? {
                    let constant = match data.column(&column)? {
                        Column::Numeric(values) => {
                            let finite = finite_values(values);
                            finite.windows(2).all(|w| w[0] == w[1])
                        }
                        Column::Nominal(values) => values.windows(2).all(|w| w[0] == w[1]),
                    };
                    if constant {
                        removed.push(column);
                    }
                }
                Ok(FittedStep::Zv { removed })
            }
            StepSpec::ImputeMean { columns } => {
                let mut means = Vec::new();
                for column in columns.resolve(data)? {
                    let finite = finite_values(data.numeric(&column)?);
                    if finite.is_empty() {
                        return Err(invalid("impute_mean", "column has no observed values"));
                    }
                    let mean = stats::mean(&finite);
                    means.push(ColumnMoments {
                        column,
                        mean,
                        sd: f64::NAN,
                    });
                }
                Ok(FittedStep::ImputeMean { means })
            }
        }
    }
}

impl FittedStep {
    /// Transform `data` with the fitted parameters only.
    ///
    /// A column the step needs may be absent only when it is the outcome, in
    /// which case that part of the step is skipped.
    pub(super) fn apply(&self, data: &Dataset, outcome: &str) -> Result<Dataset, RecipeError> {
        let present = |column: &str| -> Result<bool, RecipeError> {
            if data.has_column(column) {
                Ok(true)
            } else if column == outcome {
                Ok(false)
            } else {
                Err(RecipeError::MissingColumn(column.to_string()))
            }
        };
        match self {
            FittedStep::Log {
                columns,
                base,
                offset,
            } => {
                let mut out = data.clone();
                let ln_base = base.ln();
                for column in columns {
                    if !present(column)? {
                        continue;
                    }
                    let values = data
                        .numeric(column)?
                        .iter()
                        .map(|v| (v + offset).ln() / ln_base)
                        .collect();
                    out = out.with_column(column, Column::Numeric(values))?;
                }
                Ok(out)
            }
            FittedStep::Other { kept, other_label } => {
                let mut out = data.clone();
                for ColumnLevels { column, levels } in kept {
                    if !present(column)? {
                        continue;
                    }
                    let values = data
                        .nominal(column)?
                        .iter()
                        .map(|v| {
                            if levels.contains(v) {
                                v.clone()
                            } else {
                                other_label.clone()
                            }
                        })
                        .collect();
                    out = out.with_column(column, Column::Nominal(values))?;
                }
                Ok(out)
            }
            FittedStep::Dummy { levels, one_hot } => {
                let mut out = data.clone();
                let mut dropped = Vec::new();
                for ColumnLevels { column, levels } in levels {
                    if !present(column)? {
                        continue;
                    }
                    let values = data.nominal(column)?;
                    let unseen = values.iter().filter(|v| !levels.contains(v)).count();
                    if unseen > 0 {
                        warn!("dummy: {unseen} rows of {column} have levels unseen in training");
                    }
                    let encoded = if *one_hot { &levels[..] } else { &levels[1.min(levels.len())..] };
                    for level in encoded {
                        let indicator = values
                            .iter()
                            .map(|v| if v == level { 1.0 } else { 0.0 })
                            .collect();
                        out = out.with_column(
                            &dummy_name(column, level),
                            Column::Numeric(indicator),
                        )?;
                    }
                    dropped.push(column.clone());
                }
                Ok(out.without_columns(&dropped))
            }
            FittedStep::Interact { pairs } => {
                let mut out = data.clone();
                for (a, b) in pairs {
                    let left = data.numeric(a).map_err(|_| missing_or_type(data, a))?;
                    let right = data.numeric(b).map_err(|_| missing_or_type(data, b))?;
                    let product = left.iter().zip(right).map(|(x, y)| x * y).collect();
                    out = out.with_column(&format!("{a}_x_{b}"), Column::Numeric(product))?;
                }
                Ok(out)
            }
            FittedStep::Ns { bases } => {
                let mut out = data.clone();
                let mut dropped = Vec::new();
                for basis in bases {
                    if !present(&basis.column)? {
                        continue;
                    }
                    let values = data.numeric(&basis.column)?;
                    let rows: Vec<Vec<f64>> = values.iter().map(|&v| basis.evaluate(v)).collect();
                    for j in 0..basis.deg_free() {
                        let column = rows.iter().map(|row| row[j]).collect();
                        out = out.with_column(
                            &format!("{}_ns_{}", basis.column, j + 1),
                            Column::Numeric(column),
                        )?;
                    }
                    dropped.push(basis.column.clone());
                }
                Ok(out.without_columns(&dropped))
            }
            FittedStep::Pca { projection } => {
                if projection.columns.is_empty() {
                    return Ok(data.clone());
                }
                let mut inputs = Vec::with_capacity(projection.columns.len());
                for column in &projection.columns {
                    if !data.has_column(column) {
                        return Err(RecipeError::MissingColumn(column.clone()));
                    }
                    inputs.push(data.numeric(column)?);
                }
                let names = projection.component_names();
                let mut components = vec![Vec::with_capacity(data.n_rows()); names.len()];
                let mut row = vec![0.0; inputs.len()];
                for i in 0..data.n_rows() {
                    for (slot, column) in row.iter_mut().zip(&inputs) {
                        *slot = column[i];
                    }
                    for (k, score) in projection.project(&row).into_iter().enumerate() {
                        components[k].push(score);
                    }
                }
                let mut out = data.without_columns(&projection.columns);
                for (name, values) in names.iter().zip(components) {
                    out = out.with_column(name, Column::Numeric(values))?;
                }
                Ok(out)
            }
            FittedStep::Normalize { moments } => {
                let mut out = data.clone();
                for ColumnMoments { column, mean, sd } in moments {
                    if !present(column)? {
                        continue;
                    }
                    let scale = if *sd > 0.0 { *sd } else { 1.0 };
                    let values = data
                        .numeric(column)?
                        .iter()
                        .map(|v| (v - mean) / scale)
                        .collect();
                    out = out.with_column(column, Column::Numeric(values))?;
                }
                Ok(out)
            }
            FittedStep::Zv { removed } => Ok(data.without_columns(removed)),
            FittedStep::ImputeMean { means } => {
                let mut out = data.clone();
                for ColumnMoments { column, mean, .. } in means {
                    if !present(column)? {
                        continue;
                    }
                    let values = data
                        .numeric(column)?
                        .iter()
                        .map(|&v| if v.is_nan() { *mean } else { v })
                        .collect();
                    out = out.with_column(column, Column::Numeric(values))?;
                }
                Ok(out)
            }
        }
    }
}

/// `<column>_<level>` with anything but ASCII alphanumerics replaced by `_`.
pub fn dummy_name(column: &str, level: &str) -> String {
    let level: String = level
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{column}_{level}")
}

fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn positive_count(name: &str, value: f64) -> Result<usize, RecipeError> {
    if !value.is_finite() || value < 1.0 {
        return Err(invalid(name, "must be at least 1"));
    }
    Ok(value.round() as usize)
}

fn invalid(name: &str, reason: &str) -> RecipeError {
    RecipeError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn missing_or_type(data: &Dataset, column: &str) -> RecipeError {
    if data.has_column(column) {
        RecipeError::WrongType {
            column: column.to_string(),
            expected: "numeric",
        }
    } else {
        RecipeError::MissingColumn(column.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Dataset {
        Dataset::new(vec![
            ("x".into(), Column::Numeric(vec![1.0, f64::NAN, 3.0, 4.0])),
            (
                "g".into(),
                Column::Nominal(vec!["a".into(), "b".into(), "a".into(), "c d".into()]),
            ),
            ("y".into(), Column::Numeric(vec![1.0, 2.0, 3.0, 4.0])),
        ])
        .unwrap()
        .with_outcome("y")
        .unwrap()
    }

    #[test]
    fn dummy_drops_reference_level_and_zeroes_unseen() {
        let data = frame();
        let step = StepSpec::Dummy {
            columns: Selector::AllNominalPredictors,
            one_hot: false,
        }
        .fit(&data)
        .unwrap();
        let baked = step.apply(&data, "y").unwrap();
        assert!(!baked.has_column("g"));
        assert!(!baked.has_column("g_a"));
        assert_eq!(baked.numeric("g_c_d").unwrap(), &[0.0, 0.0, 0.0, 1.0]);

        let novel = Dataset::new(vec![
            ("x".into(), Column::Numeric(vec![1.0])),
            ("g".into(), Column::Nominal(vec!["zzz".into()])),
        ])
        .unwrap();
        let baked = step.apply(&novel, "y").unwrap();
        assert_eq!(baked.numeric("g_b").unwrap(), &[0.0]);
        assert_eq!(baked.numeric("g_c_d").unwrap(), &[0.0]);
    }

    #[test]
    fn other_pools_rare_levels_by_count() {
        let data = frame();
        let step = StepSpec::Other {
            columns: Selector::Names(vec!["g".into()]),
            threshold: 2.0,
            other_label: "other".into(),
        }
        .fit(&data)
        .unwrap();
        let baked = step.apply(&data, "y").unwrap();
        assert_eq!(baked.nominal("g").unwrap(), &["a", "other", "a", "other"]);
    }

    #[test]
    fn impute_mean_uses_training_mean() {
        let data = frame();
        let step = StepSpec::ImputeMean {
            columns: Selector::AllNumericPredictors,
        }
        .fit(&data)
        .unwrap();
        let baked = step.apply(&data, "y").unwrap();
        let expected = (1.0 + 3.0 + 4.0) / 3.0;
        assert!((baked.numeric("x").unwrap()[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn log_skips_absent_outcome() {
        let data = frame();
        let step = StepSpec::Log {
            columns: Selector::Names(vec!["y".into()]),
            base: 10.0,
            offset: 0.0,
        }
        .fit(&data)
        .unwrap();
        let baked = step.apply(&data, "y").unwrap();
        assert!((baked.numeric("y").unwrap()[3] - 4f64.log10()).abs() < 1e-12);

        let predictors_only = data.without_columns(&["y".to_string()]);
        let baked = step.apply(&predictors_only, "y").unwrap();
        assert!(!baked.has_column("y"));
    }

    #[test]
    fn missing_predictor_is_an_error() {
        let data = frame();
        let step = StepSpec::Normalize {
            columns: Selector::Names(vec!["x".into()]),
        }
        .fit(&data)
        .unwrap();
        let err = step
            .apply(&data.without_columns(&["x".to_string()]), "y")
            .unwrap_err();
        assert!(matches!(err, RecipeError::MissingColumn(name) if name == "x"));
    }

    #[test]
    fn set_param_only_touches_matching_steps() {
        let mut ns = StepSpec::Ns {
            columns: Selector::Names(vec!["x".into()]),
            deg_free: 5,
        };
        assert!(ns.set_param("deg_free", 3.0).unwrap());
        assert!(!ns.set_param("num_comp", 3.0).unwrap());
        assert!(matches!(ns, StepSpec::Ns { deg_free: 3, .. }));
        assert!(ns.set_param("deg_free", 0.0).is_err());
    }
}
