//! Resolve dataset identifiers to loaded datasets.

use std::path::Path;

use tracing::info;

use super::frame::Dataset;
use super::loader::{DatasetLoadError, load_dataset};
use super::sim;

/// Seed used for built-in simulated datasets.
pub const DEFAULT_SIM_SEED: u64 = 20_140_902;

/// Identifiers served without touching the filesystem, with their default row counts.
pub const BUILTIN_DATASETS: &[(&str, usize)] = &[
    ("sim_housing", 2930),
    ("sim_cells", 2019),
    ("sim_concrete", 1030),
    ("sim_regression", 500),
    ("sim_two_class", 800),
];

pub fn is_builtin(id: &str) -> bool {
    BUILTIN_DATASETS.iter().any(|(name, _)| *name == id)
}

/// Load a dataset by identifier.
///
/// Built-in identifiers are generated in memory; anything else is read from
/// `<data_dir>/<id>/`.
pub fn load_named(id: &str, data_dir: Option<&Path>) -> Result<Dataset, DatasetLoadError> {
    if let Some(&(_, n)) = BUILTIN_DATASETS.iter().find(|(name, _)| *name == id) {
        let data = generate(id, n, DEFAULT_SIM_SEED)?;
        info!("Generated built-in dataset {id} ({} rows)", data.n_rows());
        return Ok(data);
    }
    let Some(data_dir) = data_dir else {
        return Err(DatasetLoadError::UnknownDataset(id.to_string()));
    };
    let dir = data_dir.join(id);
    if !dir.is_dir() {
        return Err(DatasetLoadError::UnknownDataset(id.to_string()));
    }
    let data = load_dataset(&dir)?;
    info!("Loaded dataset {id} from {} ({} rows)", dir.display(), data.n_rows());
    Ok(data)
}

/// Generate a built-in dataset with an explicit size and seed.
pub fn generate(id: &str, n: usize, seed: u64) -> Result<Dataset, DatasetLoadError> {
    Ok(match id {
        "sim_housing" => sim::sim_housing(n, seed),
        "sim_cells" => sim::sim_cells(n, seed),
        "sim_concrete" => sim::sim_concrete(n, seed),
        "sim_regression" => sim::sim_regression(n, seed),
        "sim_two_class" => sim::sim_two_class(n, seed),
        other => return Err(DatasetLoadError::UnknownDataset(other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::export_dataset;
    use tempfile::tempdir;

    #[test]
    fn builtin_ids_resolve_without_data_dir() {
        let data = load_named("sim_concrete", None).unwrap();
        assert_eq!(data.n_rows(), 1030);
        assert_eq!(data.outcome(), Some("compressive_strength"));
    }

    #[test]
    fn unknown_id_without_directory_fails() {
        let dir = tempdir().unwrap();
        let err = load_named("ames", Some(dir.path())).unwrap_err();
        assert!(matches!(err, DatasetLoadError::UnknownDataset(_)));
    }

    #[test]
    fn directory_ids_load_exports() {
        let dir = tempdir().unwrap();
        let data = generate("sim_two_class", 20, 5).unwrap();
        export_dataset(&data, &dir.path().join("two_class")).unwrap();
        let loaded = load_named("two_class", Some(dir.path())).unwrap();
        assert_eq!(loaded.n_rows(), 20);
        assert_eq!(loaded.levels("class").unwrap(), data.levels("class").unwrap());
    }
}
