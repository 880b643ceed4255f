//! On-disk form of artifact metadata (`metadata/<artifact_id>.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::{Artifact, Metadata, UnknownVariant};

/// Artifact metadata document as persisted.
///
/// Enum members are kept as raw strings so that an unrecognized stored
/// value surfaces as [`UnknownVariant`] rather than a generic parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact_id: String,
    pub artifact_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub source_artifacts: Vec<String>,
    pub processing_module: Option<String>,
    pub processing_version: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<u64>,
    pub checksum: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub error_message: Option<String>,
}

impl From<&Artifact> for ArtifactRecord {
    fn from(artifact: &Artifact) -> Self {
        Self {
            artifact_id: artifact.artifact_id.clone(),
            artifact_type: artifact.artifact_type.as_str().to_string(),
            status: artifact.status.as_str().to_string(),
            created_at: artifact.created_at,
            updated_at: artifact.updated_at,
            source_artifacts: artifact.source_artifact_ids.clone(),
            processing_module: artifact.processing_module.clone(),
            processing_version: artifact.processing_version.clone(),
            file_path: artifact
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            file_size: artifact.file_size,
            checksum: artifact.checksum.clone(),
            metadata: artifact.metadata.clone(),
            error_message: artifact.error_message.clone(),
        }
    }
}

impl TryFrom<ArtifactRecord> for Artifact {
    type Error = UnknownVariant;

    fn try_from(record: ArtifactRecord) -> Result<Self, Self::Error> {
        Ok(Artifact {
            artifact_id: record.artifact_id,
            artifact_type: record.artifact_type.parse()?,
            status: record.status.parse()?,
            created_at: record.created_at,
            updated_at: record.updated_at,
            source_artifact_ids: record.source_artifacts,
            processing_module: record.processing_module,
            processing_version: record.processing_version,
            file_path: record.file_path.map(PathBuf::from),
            file_size: record.file_size,
            checksum: record.checksum,
            metadata: record.metadata,
            error_message: record.error_message,
        })
    }
}
