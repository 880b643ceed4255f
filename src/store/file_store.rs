//! Type-partitioned artifact storage with per-artifact JSON metadata

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::checksum::{compute_file_sha256, sanitize_file_name};
use super::record::ArtifactRecord;
use crate::model::{Artifact, ArtifactStatus, ArtifactType, ProcessingRun, UnknownVariant};

/// Errors for artifact storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Symbolic links are not accepted as artifact sources: {0}")]
    SymlinkRejected(PathBuf),

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Source path has no file name: {0}")]
    InvalidSource(PathBuf),

    #[error("Invalid artifact id: {0:?}")]
    InvalidArtifactId(String),

    #[error("Corrupt metadata for artifact {artifact_id}: {source}")]
    UnknownVariant {
        artifact_id: String,
        #[source]
        source: UnknownVariant,
    },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),
}

/// Aggregate size information over the artifact partitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageStats {
    /// Sum of stored file sizes
    pub total_size_bytes: u64,
    /// Stored file count per artifact type
    pub artifact_counts: BTreeMap<String, usize>,
    /// `total_size_bytes` in MiB
    pub total_size_mb: f64,
    /// Stored file count across all types
    pub total_artifacts: usize,
}

/// Physical file + metadata persistence keyed by artifact id.
#[derive(Debug, Clone)]
pub struct ChecksumFileStore {
    base_path: PathBuf,
}

impl ChecksumFileStore {
    /// Open a store rooted at `base_path`, creating the directory tree.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            base_path: base_path.into(),
        };
        store.setup_directories()?;
        Ok(store)
    }

    fn setup_directories(&self) -> Result<(), StoreError> {
        let mut directories = vec![
            self.base_path.clone(),
            self.artifacts_dir(),
            self.metadata_dir(),
            self.runs_dir(),
            self.temp_dir(),
        ];
        directories.extend(ArtifactType::ALL.iter().map(|t| self.type_dir(*t)));

        for dir in directories {
            fs::create_dir_all(&dir)?;
            debug!(path = %dir.display(), "ensured storage directory");
        }
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.base_path.join("artifacts")
    }

    /// Partition directory for one artifact type.
    pub fn type_dir(&self, artifact_type: ArtifactType) -> PathBuf {
        self.artifacts_dir().join(artifact_type.as_str())
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.base_path.join("metadata")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.base_path.join("runs")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base_path.join("temp")
    }

    fn metadata_path(&self, artifact_id: &str) -> Option<PathBuf> {
        is_safe_id(artifact_id).then(|| self.metadata_dir().join(format!("{}.json", artifact_id)))
    }

    /// Copy `source_path` into the store and record its size and checksum.
    ///
    /// Symbolic links are rejected without being followed. On success the
    /// artifact carries the stored path and its metadata has been written.
    pub fn store(&self, source_path: &Path, artifact: &mut Artifact) -> Result<PathBuf, StoreError> {
        match fs::symlink_metadata(source_path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(StoreError::SymlinkRejected(source_path.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::SourceNotFound(source_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }

        let resolved = fs::canonicalize(source_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::SourceNotFound(source_path.to_path_buf()),
            _ => StoreError::IoError(e),
        })?;

        let file_name = resolved
            .file_name()
            .ok_or_else(|| StoreError::InvalidSource(source_path.to_path_buf()))?;
        let safe_name = sanitize_file_name(&file_name.to_string_lossy());

        if !is_safe_id(&artifact.artifact_id) {
            return Err(StoreError::InvalidArtifactId(artifact.artifact_id.clone()));
        }
        let storage_path = self
            .type_dir(artifact.artifact_type)
            .join(format!("{}_{}", artifact.artifact_id, safe_name));

        fs::copy(&resolved, &storage_path)?;

        let size = fs::metadata(&storage_path)?.len();
        let checksum = compute_file_sha256(&storage_path)?;
        artifact.attach_file(storage_path.clone(), size, checksum);

        self.save_metadata(artifact)?;

        info!(
            artifact_id = %artifact.artifact_id,
            path = %storage_path.display(),
            size,
            "stored artifact"
        );
        Ok(storage_path)
    }

    /// Stored path for an artifact, if its metadata and file both exist.
    pub fn retrieve(&self, artifact_id: &str) -> Result<Option<PathBuf>, StoreError> {
        let path = self
            .load_metadata(artifact_id)?
            .and_then(|artifact| artifact.file_path)
            .filter(|path| path.is_file());
        Ok(path)
    }

    /// Write the artifact's metadata document (write-then-rename).
    pub fn save_metadata(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let path = self
            .metadata_path(&artifact.artifact_id)
            .ok_or_else(|| StoreError::InvalidArtifactId(artifact.artifact_id.clone()))?;

        let json = serde_json::to_string_pretty(&ArtifactRecord::from(artifact))?;
        write_atomic(&path, json.as_bytes())?;

        debug!(artifact_id = %artifact.artifact_id, "saved artifact metadata");
        Ok(())
    }

    /// Load an artifact's metadata; `None` if no record exists.
    ///
    /// A document that is not valid JSON is logged and reported as absent.
    /// An unrecognized type or status still fails with
    /// [`StoreError::UnknownVariant`].
    pub fn load_metadata(&self, artifact_id: &str) -> Result<Option<Artifact>, StoreError> {
        match self.read_metadata(artifact_id) {
            Err(StoreError::JsonError(e)) => {
                warn!(artifact_id, error = %e, "unreadable artifact metadata");
                Ok(None)
            }
            other => other,
        }
    }

    fn read_metadata(&self, artifact_id: &str) -> Result<Option<Artifact>, StoreError> {
        let Some(path) = self.metadata_path(artifact_id) else {
            return Ok(None);
        };

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: ArtifactRecord = serde_json::from_str(&json)?;
        let artifact = Artifact::try_from(record).map_err(|source| StoreError::UnknownVariant {
            artifact_id: artifact_id.to_string(),
            source,
        })?;
        Ok(Some(artifact))
    }

    /// Every stored artifact matching both optional filters.
    ///
    /// A metadata file that cannot be decoded fails the whole listing.
    /// Results are ordered by creation time.
    pub fn list(
        &self,
        artifact_type: Option<ArtifactType>,
        status: Option<ArtifactStatus>,
    ) -> Result<Vec<Artifact>, StoreError> {
        let mut artifacts = Vec::new();

        for entry in fs::read_dir(self.metadata_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(artifact_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let Some(artifact) = self.read_metadata(artifact_id)? else {
                continue;
            };
            if artifact_type.is_some_and(|t| artifact.artifact_type != t) {
                continue;
            }
            if status.is_some_and(|s| artifact.status != s) {
                continue;
            }
            artifacts.push(artifact);
        }

        artifacts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        Ok(artifacts)
    }

    /// Delete an artifact's stored file, keeping its metadata.
    ///
    /// Returns the number of bytes removed, or `None` when there was no file.
    pub fn remove_payload(&self, artifact: &Artifact) -> Result<Option<u64>, StoreError> {
        let Some(path) = artifact.file_path.as_ref() else {
            return Ok(None);
        };
        let size = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        fs::remove_file(path)?;
        Ok(Some(size))
    }

    /// Persist a processing run record.
    pub fn save_run(&self, run: &ProcessingRun) -> Result<(), StoreError> {
        if !is_safe_id(&run.run_id) {
            return Err(StoreError::InvalidArtifactId(run.run_id.clone()));
        }
        let path = self.runs_dir().join(format!("{}.json", run.run_id));
        let json = serde_json::to_string_pretty(run)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(())
    }

    /// Load a processing run record; `None` if absent.
    pub fn load_run(&self, run_id: &str) -> Result<Option<ProcessingRun>, StoreError> {
        if !is_safe_id(run_id) {
            return Ok(None);
        }
        let path = self.runs_dir().join(format!("{}.json", run_id));
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Recursively delete and recreate the temp directory.
    pub fn cleanup_temp(&self) -> Result<(), StoreError> {
        let temp_dir = self.temp_dir();
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir)?;
        }
        fs::create_dir_all(&temp_dir)?;
        info!(path = %temp_dir.display(), "cleaned up temp directory");
        Ok(())
    }

    /// Sum file sizes and counts across every type partition.
    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        let mut stats = StorageStats::default();

        for artifact_type in ArtifactType::ALL {
            let dir = self.type_dir(artifact_type);
            if !dir.is_dir() {
                continue;
            }

            let mut count = 0;
            for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).follow_links(false) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                count += 1;
                stats.total_size_bytes += entry.metadata()?.len();
            }

            stats
                .artifact_counts
                .insert(artifact_type.as_str().to_string(), count);
            stats.total_artifacts += count;
        }

        stats.total_size_mb = stats.total_size_bytes as f64 / (1024.0 * 1024.0);
        Ok(stats)
    }
}

/// Ids double as file names, so only a conservative character set is allowed.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Write to a uniquely named temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name,
        uuid::Uuid::new_v4().simple()
    ));
    fs::write(&temp_path, contents)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}
