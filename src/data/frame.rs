use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    #[error("column {name} has {actual} rows (expected {expected})")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("column {name} is not {expected}")]
    WrongType { name: String, expected: &'static str },
    #[error("dataset has no outcome column")]
    MissingOutcome,
    #[error("row index {index} out of range for {n_rows} rows")]
    RowOutOfRange { index: usize, n_rows: usize },
}

/// Whether an outcome is modeled as a number or a class label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Regression,
    Classification,
}

/// Column storage. Missing numeric values are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Column {
    Numeric(Vec<f64>),
    Nominal(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Nominal(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Numeric(values) => Column::Numeric(indices.iter().map(|&i| values[i]).collect()),
            Column::Nominal(values) => {
                Column::Nominal(indices.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

/// Immutable column-oriented table with an optional outcome column.
///
/// All transformations return a new `Dataset`; nothing is edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
    outcome: Option<String>,
    n_rows: usize,
}

impl Dataset {
    /// Build a dataset from named columns of equal length.
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, DataError> {
        let n_rows = columns.first().map(|(_, col)| col.len()).unwrap_or(0);
        let mut seen = BTreeSet::new();
        let mut names = Vec::with_capacity(columns.len());
        let mut cols = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if !seen.insert(name.clone()) {
                return Err(DataError::DuplicateColumn(name));
            }
            if column.len() != n_rows {
                return Err(DataError::LengthMismatch {
                    name,
                    expected: n_rows,
                    actual: column.len(),
                });
            }
            names.push(name);
            cols.push(column);
        }
        Ok(Self {
            names,
            columns: cols,
            outcome: None,
            n_rows,
        })
    }

    /// Designate `name` as the outcome column.
    pub fn with_outcome(mut self, name: &str) -> Result<Self, DataError> {
        if self.position(name).is_none() {
            return Err(DataError::UnknownColumn(name.to_string()));
        }
        self.outcome = Some(name.to_string());
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Predictor names in column order (every column except the outcome).
    pub fn predictor_names(&self) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| Some(name.as_str()) != self.outcome.as_deref())
            .cloned()
            .collect()
    }

    pub fn column(&self, name: &str) -> Result<&Column, DataError> {
        self.position(name)
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()))
    }

    pub fn numeric(&self, name: &str) -> Result<&[f64], DataError> {
        match self.column(name)? {
            Column::Numeric(values) => Ok(values),
            Column::Nominal(_) => Err(DataError::WrongType {
                name: name.to_string(),
                expected: "numeric",
            }),
        }
    }

    pub fn nominal(&self, name: &str) -> Result<&[String], DataError> {
        match self.column(name)? {
            Column::Nominal(values) => Ok(values),
            Column::Numeric(_) => Err(DataError::WrongType {
                name: name.to_string(),
                expected: "nominal",
            }),
        }
    }

    /// Sorted distinct labels of a nominal column.
    pub fn levels(&self, name: &str) -> Result<Vec<String>, DataError> {
        let values = self.nominal(name)?;
        let set: BTreeSet<&String> = values.iter().collect();
        Ok(set.into_iter().cloned().collect())
    }

    pub fn outcome_kind(&self) -> Result<OutcomeKind, DataError> {
        let name = self.outcome.as_deref().ok_or(DataError::MissingOutcome)?;
        Ok(match self.column(name)? {
            Column::Numeric(_) => OutcomeKind::Regression,
            Column::Nominal(_) => OutcomeKind::Classification,
        })
    }

    /// Derive a dataset holding the given rows, in the given order.
    ///
    /// Indices may repeat (bootstrap analysis sets).
    pub fn take_rows(&self, indices: &[usize]) -> Result<Self, DataError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.n_rows) {
            return Err(DataError::RowOutOfRange {
                index,
                n_rows: self.n_rows,
            });
        }
        Ok(Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|col| col.take(indices)).collect(),
            outcome: self.outcome.clone(),
            n_rows: indices.len(),
        })
    }

    /// Derive a dataset with `name` added, or replaced in place if it exists.
    pub fn with_column(&self, name: &str, column: Column) -> Result<Self, DataError> {
        if column.len() != self.n_rows && !self.columns.is_empty() {
            return Err(DataError::LengthMismatch {
                name: name.to_string(),
                expected: self.n_rows,
                actual: column.len(),
            });
        }
        let mut out = self.clone();
        if out.columns.is_empty() {
            out.n_rows = column.len();
        }
        match out.position(name) {
            Some(idx) => out.columns[idx] = column,
            None => {
                out.names.push(name.to_string());
                out.columns.push(column);
            }
        }
        Ok(out)
    }

    /// Derive a dataset without the named columns. Unknown names are ignored.
    pub fn without_columns(&self, names: &[String]) -> Self {
        let mut out_names = Vec::with_capacity(self.names.len());
        let mut out_cols = Vec::with_capacity(self.columns.len());
        for (name, col) in self.names.iter().zip(self.columns.iter()) {
            if names.contains(name) {
                continue;
            }
            out_names.push(name.clone());
            out_cols.push(col.clone());
        }
        let outcome = self
            .outcome
            .clone()
            .filter(|outcome| out_names.contains(outcome));
        Self {
            names: out_names,
            columns: out_cols,
            outcome,
            n_rows: self.n_rows,
        }
    }

    /// Predictor columns as a row-major design matrix.
    ///
    /// Every predictor must be numeric by this point; nominal predictors need a
    /// dummy-encoding step first.
    pub fn predictor_matrix(&self) -> Result<Array2<f64>, DataError> {
        let predictors = self.predictor_names();
        let mut matrix = Array2::<f64>::zeros((self.n_rows, predictors.len()));
        for (j, name) in predictors.iter().enumerate() {
            let values = self.numeric(name)?;
            for (i, &v) in values.iter().enumerate() {
                matrix[[i, j]] = v;
            }
        }
        Ok(matrix)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Dataset {
        Dataset::new(vec![
            ("x".into(), Column::Numeric(vec![1.0, 2.0, 3.0])),
            (
                "g".into(),
                Column::Nominal(vec!["b".into(), "a".into(), "b".into()]),
            ),
            ("y".into(), Column::Numeric(vec![10.0, 20.0, 30.0])),
        ])
        .unwrap()
        .with_outcome("y")
        .unwrap()
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Dataset::new(vec![
            ("a".into(), Column::Numeric(vec![1.0])),
            ("b".into(), Column::Numeric(vec![1.0, 2.0])),
        ])
        .unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { .. }));
    }

    #[test]
    fn take_rows_derives_new_dataset() {
        let data = small();
        let subset = data.take_rows(&[2, 2, 0]).unwrap();
        assert_eq!(subset.n_rows(), 3);
        assert_eq!(subset.numeric("x").unwrap(), &[3.0, 3.0, 1.0]);
        assert_eq!(data.numeric("x").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(subset.outcome(), Some("y"));
    }

    #[test]
    fn levels_are_sorted_and_distinct() {
        assert_eq!(small().levels("g").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn predictor_matrix_requires_numeric_predictors() {
        let data = small();
        assert!(data.predictor_matrix().is_err());
        let numeric = data.without_columns(&["g".to_string()]);
        let x = numeric.predictor_matrix().unwrap();
        assert_eq!(x.shape(), &[3, 1]);
        assert_eq!(x[[1, 0]], 2.0);
    }
}
