//! JSON files handed from one stage to the next.
//!
//! Every file is an [`Envelope`]: a fresh artifact id, what the payload is, the
//! format version it was written with and when, then the payload itself.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Bumped whenever a payload type changes shape.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PreparedRecipe,
    FittedModel,
    FittedWorkflow,
    ResampleReport,
    TuneReport,
    ComparisonReport,
    TestReport,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreparedRecipe => "prepared_recipe",
            Self::FittedModel => "fitted_model",
            Self::FittedWorkflow => "fitted_workflow",
            Self::ResampleReport => "resample_report",
            Self::TuneReport => "tune_report",
            Self::ComparisonReport => "comparison_report",
            Self::TestReport => "test_report",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to create artifact directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to encode artifact {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to parse artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Artifact {path} holds a {found}, expected a {expected}")]
    WrongKind {
        path: PathBuf,
        expected: ArtifactKind,
        found: ArtifactKind,
    },
    #[error("Artifact {path} has format version {found}, this build reads {expected}")]
    UnsupportedVersion {
        path: PathBuf,
        expected: u32,
        found: u32,
    },
    #[error("Failed to format artifact timestamp: {0}")]
    FormatTime(#[from] time::error::Format),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub artifact_id: Uuid,
    pub kind: ArtifactKind,
    pub format_version: u32,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(kind: ArtifactKind, payload: T) -> Result<Self, ArtifactError> {
        Ok(Self {
            artifact_id: Uuid::new_v4(),
            kind,
            format_version: FORMAT_VERSION,
            created_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
            payload,
        })
    }
}

/// Header fields only, read before committing to a payload type.
#[derive(Deserialize)]
struct Header {
    kind: ArtifactKind,
    format_version: u32,
}

/// Write `payload` as pretty JSON at `path`, creating parent directories.
///
/// Returns the new artifact id.
pub fn save_artifact<T: Serialize>(
    path: &Path,
    kind: ArtifactKind,
    payload: &T,
) -> Result<Uuid, ArtifactError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ArtifactError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let envelope = Envelope::new(kind, payload)?;
    let json = serde_json::to_string_pretty(&envelope).map_err(|source| ArtifactError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("wrote {kind} {} to {}", envelope.artifact_id, path.display());
    Ok(envelope.artifact_id)
}

/// Read an artifact, checking its kind and format version before the payload.
pub fn load_artifact<T: DeserializeOwned>(
    path: &Path,
    expected: ArtifactKind,
) -> Result<Envelope<T>, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let header: Header = serde_json::from_slice(&bytes).map_err(parse_error)?;
    if header.kind != expected {
        return Err(ArtifactError::WrongKind {
            path: path.to_path_buf(),
            expected,
            found: header.kind,
        });
    }
    if header.format_version != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            path: path.to_path_buf(),
            expected: FORMAT_VERSION,
            found: header.format_version,
        });
    }
    serde_json::from_slice(&bytes).map_err(parse_error)
}
