//! Argument bundles for manager operations

use std::path::PathBuf;

use super::ManagerError;
use crate::model::{ArtifactStatus, ArtifactType, Metadata, MetadataValue, ProcessingRun};

/// Metadata key read by [`ArtifactFilter::run_id`].
pub const RUN_ID_KEY: &str = "run_id";

/// Everything needed to create one artifact.
#[derive(Debug, Clone)]
pub struct CreateArtifact {
    pub artifact_type: ArtifactType,
    /// File to copy into the store; `None` for metadata-only artifacts
    pub source_path: Option<PathBuf>,
    pub source_artifact_ids: Vec<String>,
    pub processing_module: Option<String>,
    pub processing_version: Option<String>,
    pub metadata: Metadata,
}

impl CreateArtifact {
    pub fn new(artifact_type: ArtifactType) -> Self {
        Self {
            artifact_type,
            source_path: None,
            source_artifact_ids: Vec::new(),
            processing_module: None,
            processing_version: None,
            metadata: Metadata::new(),
        }
    }

    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn sources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_artifact_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.processing_module = Some(module.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.processing_version = Some(version.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamp `metadata["run_id"]` so run-scoped listings find this artifact.
    pub fn in_run(self, run: &ProcessingRun) -> Self {
        self.metadata(RUN_ID_KEY, run.run_id.as_str())
    }

    /// Shape checks that must pass before any I/O happens.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if let Some(path) = &self.source_path {
            if path.as_os_str().is_empty() {
                return Err(ManagerError::Validation(
                    "source_path must not be empty".to_string(),
                ));
            }
            if path.file_name().is_none() {
                return Err(ManagerError::Validation(format!(
                    "source_path must name a file: {}",
                    path.display()
                )));
            }
        }
        if self.source_artifact_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ManagerError::Validation(
                "source artifact ids must not be empty".to_string(),
            ));
        }
        if self.metadata.keys().any(|k| k.is_empty()) {
            return Err(ManagerError::Validation(
                "metadata keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional filters for [`super::ArtifactManager::list_artifacts`].
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub artifact_type: Option<ArtifactType>,
    pub status: Option<ArtifactStatus>,
    /// Compared against `metadata["run_id"]`, which callers must set
    pub run_id: Option<String>,
}

impl ArtifactFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifact_type(mut self, artifact_type: ArtifactType) -> Self {
        self.artifact_type = Some(artifact_type);
        self
    }

    pub fn status(mut self, status: ArtifactStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}
