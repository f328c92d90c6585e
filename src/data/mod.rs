//! In-memory tabular datasets, their on-disk export format, and built-in simulations.

mod frame;
pub mod loader;
pub mod registry;
pub mod sim;

pub use frame::{Column, DataError, Dataset, OutcomeKind};
pub use loader::{DatasetLoadError, export_dataset, load_dataset};
pub use registry::{BUILTIN_DATASETS, generate, load_named};
