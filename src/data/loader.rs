//! Dataset loader and exporter for `manifest.json` + `rows.jsonl` directories.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::frame::{Column, DataError, Dataset};

/// Current on-disk dataset format.
pub const FORMAT_VERSION: i64 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const ROWS_FILE: &str = "rows.jsonl";

#[derive(Debug, Error)]
pub enum DatasetLoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("invalid rows.jsonl: {0}")]
    InvalidRow(String),
    #[error("unknown dataset id: {0}")]
    UnknownDataset(String),
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Parsed contents of `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Dataset format version.
    pub format_version: i64,
    /// Outcome column, if the dataset has one.
    #[serde(default)]
    pub outcome: Option<String>,
    /// Column schema in column order.
    pub columns: Vec<ColumnSchema>,
    /// Dataset file paths (relative to the dataset directory).
    pub files: ManifestFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Nominal,
}

/// File names referenced by the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFiles {
    /// JSONL file with one object per row.
    pub rows: String,
}

/// Load a dataset directory written by [`export_dataset`].
pub fn load_dataset(dir: &Path) -> Result<Dataset, DatasetLoadError> {
    let mut manifest_bytes = Vec::new();
    File::open(dir.join(MANIFEST_FILE))?.read_to_end(&mut manifest_bytes)?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(DatasetLoadError::InvalidManifest(format!(
            "unsupported format_version {}",
            manifest.format_version
        )));
    }
    if manifest.columns.is_empty() {
        return Err(DatasetLoadError::InvalidManifest("no columns".to_string()));
    }

    let mut builders: Vec<Column> = manifest
        .columns
        .iter()
        .map(|schema| match schema.kind {
            ColumnKind::Numeric => Column::Numeric(Vec::new()),
            ColumnKind::Nominal => Column::Nominal(Vec::new()),
        })
        .collect();

    let reader = BufReader::new(File::open(dir.join(&manifest.files.rows))?);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Map<String, Value> = serde_json::from_str(&line)
            .map_err(|err| DatasetLoadError::InvalidRow(format!("line {}: {err}", idx + 1)))?;
        for (schema, column) in manifest.columns.iter().zip(builders.iter_mut()) {
            push_cell(column, record.get(&schema.name)).map_err(|msg| {
                DatasetLoadError::InvalidRow(format!("line {} column {}: {msg}", idx + 1, schema.name))
            })?;
        }
    }

    let columns = manifest
        .columns
        .iter()
        .map(|schema| schema.name.clone())
        .zip(builders)
        .collect();
    let dataset = Dataset::new(columns)?;
    match manifest.outcome.as_deref() {
        Some(outcome) => Ok(dataset.with_outcome(outcome)?),
        None => Ok(dataset),
    }
}

/// Write a dataset directory readable by [`load_dataset`].
pub fn export_dataset(dataset: &Dataset, dir: &Path) -> Result<(), DatasetLoadError> {
    std::fs::create_dir_all(dir)?;
    let mut columns = Vec::with_capacity(dataset.n_cols());
    for name in dataset.names() {
        let kind = if dataset.column(name)?.is_numeric() {
            ColumnKind::Numeric
        } else {
            ColumnKind::Nominal
        };
        columns.push(ColumnSchema {
            name: name.clone(),
            kind,
        });
    }
    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        outcome: dataset.outcome().map(str::to_string),
        columns,
        files: ManifestFiles {
            rows: ROWS_FILE.to_string(),
        },
    };
    std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;

    let mut writer = BufWriter::new(File::create(dir.join(ROWS_FILE))?);
    for row in 0..dataset.n_rows() {
        let mut record = Map::new();
        for name in dataset.names() {
            let value = match dataset.column(name)? {
                Column::Numeric(values) => serde_json::Number::from_f64(values[row])
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                Column::Nominal(values) => Value::String(values[row].clone()),
            };
            record.insert(name.clone(), value);
        }
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn push_cell(column: &mut Column, value: Option<&Value>) -> Result<(), String> {
    match column {
        Column::Numeric(values) => {
            let v = match value {
                None | Some(Value::Null) => f64::NAN,
                Some(Value::Number(n)) => n.as_f64().ok_or("number out of range")?,
                Some(other) => return Err(format!("expected number, got {other}")),
            };
            values.push(v);
        }
        Column::Nominal(values) => {
            let v = match value {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => return Err("expected string label".to_string()),
            };
            values.push(v);
        }
    }
    Ok(())
}
