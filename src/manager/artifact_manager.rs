//! Orchestrator composing the file store and the audit log

use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use super::lineage::{build_lineage, LineageNode};
use super::request::{ArtifactFilter, CreateArtifact, RUN_ID_KEY};
use super::statistics::{ArtifactDistribution, AuditStatistics, ManagerStatistics};
use super::ManagerError;
use crate::audit::{actions, operations, AuditEntry, AuditLog, TimeRange};
use crate::config::LedgerConfig;
use crate::model::{Artifact, ArtifactStatus, Metadata, ProcessingRun, RunError, RunStatus};
use crate::store::ChecksumFileStore;

/// Relationship name used by [`ArtifactManager::link_artifacts`] callers
/// that have no more specific one.
pub const DEFAULT_RELATIONSHIP: &str = "derived_from";

/// Tracks artifacts, their provenance and the processing runs that made them.
///
/// Shareable across threads behind an `Arc`.
#[derive(Debug)]
pub struct ArtifactManager {
    base_path: PathBuf,
    store: ChecksumFileStore,
    audit: Option<AuditLog>,
    auto_cleanup: bool,
    user: Option<String>,
    /// Serializes create, status update and metadata reads
    lock: Mutex<()>,
    /// Acquired after `lock` when both are needed
    current_run: Mutex<Option<ProcessingRun>>,
}

impl ArtifactManager {
    /// Open a manager under `base_path` with default settings.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, ManagerError> {
        Self::from_config(&LedgerConfig::new(base_path))
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, ManagerError> {
        config
            .validate()
            .map_err(|e| ManagerError::Validation(e.to_string()))?;

        let base_path = config.base_path.clone();
        let store = ChecksumFileStore::new(base_path.join("storage"))?;
        let audit = if config.enable_audit {
            Some(AuditLog::new(base_path.join("audit"), config.rotation_size_mb)?)
        } else {
            None
        };

        info!(
            base_path = %base_path.display(),
            audit = config.enable_audit,
            "artifact manager ready"
        );

        Ok(Self {
            base_path,
            store,
            audit,
            auto_cleanup: config.auto_cleanup,
            user: config.user.clone(),
            lock: Mutex::new(()),
            current_run: Mutex::new(None),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn store(&self) -> &ChecksumFileStore {
        &self.store
    }

    /// The audit journal, when auditing is enabled.
    pub fn audit(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }

    /// Snapshot of the active run.
    pub fn current_run(&self) -> Option<ProcessingRun> {
        self.run_slot().clone()
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_slot(&self) -> MutexGuard<'_, Option<ProcessingRun>> {
        self.current_run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an audit entry stamped with the configured user.
    ///
    /// Does nothing when auditing is disabled. A failed append is logged
    /// and otherwise ignored.
    pub fn record(&self, entry: AuditEntry) {
        let Some(audit) = &self.audit else {
            return;
        };
        let entry = entry.user(self.user.clone());
        if let Err(e) = audit.append(&entry) {
            error!(
                operation = %entry.operation,
                action = %entry.action,
                error = %e,
                "failed to write audit entry"
            );
        }
    }

    /// Begin a run and make it current, replacing any active one.
    ///
    /// The run record is saved before the run becomes current; if the save
    /// fails the previous run stays active.
    pub fn start_run(&self, configuration: Metadata) -> Result<ProcessingRun, ManagerError> {
        let run = ProcessingRun::new(configuration);
        let saved = self.store.save_run(&run);

        let entry = AuditEntry::new(operations::PROCESSING_RUN, actions::START)
            .detail("run_id", run.run_id.as_str())
            .detail("configuration", run.configuration.clone());
        if let Err(e) = saved {
            error!(run_id = %run.run_id, error = %e, "failed to save processing run");
            self.record(entry.failed(e.to_string()));
            return Err(e.into());
        }

        if let Some(previous) = self.run_slot().replace(run.clone()) {
            warn!(
                previous = %previous.run_id,
                replacement = %run.run_id,
                "replacing active processing run"
            );
        }
        self.record(entry);

        info!(run_id = %run.run_id, "started processing run");
        Ok(run)
    }

    /// Finalize the current run with a terminal status.
    ///
    /// Returns `None`, after a warning, when no run is active.
    pub fn end_run(&self, status: RunStatus) -> Result<Option<ProcessingRun>, ManagerError> {
        if !status.is_terminal() {
            return Err(RunError::InvalidTransition {
                from: RunStatus::InProgress,
                to: status,
            }
            .into());
        }

        let run = {
            let mut slot = self.run_slot();
            let Some(mut run) = slot.take() else {
                warn!("no active processing run to end");
                return Ok(None);
            };
            if let Err(e) = run.complete(status) {
                *slot = Some(run);
                return Err(e.into());
            }
            run
        };

        let saved = self.store.save_run(&run);
        let duration_seconds = run
            .duration()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default();
        self.record(
            AuditEntry::new(operations::PROCESSING_RUN, actions::END)
                .detail("run_id", run.run_id.as_str())
                .detail("status", status.as_str())
                .detail("duration_seconds", duration_seconds)
                .detail("input_artifacts", run.input_artifact_ids.as_slice())
                .detail("output_artifacts", run.output_artifact_ids.as_slice())
                .success(status == RunStatus::Completed),
        );
        saved?;

        if self.auto_cleanup {
            self.store.cleanup_temp()?;
        }

        info!(run_id = %run.run_id, status = %status, "ended processing run");
        Ok(Some(run))
    }

    /// Register an existing artifact as an input of the active run.
    ///
    /// Returns `false` when no run is active.
    pub fn mark_run_input(&self, artifact_id: &str) -> bool {
        match self.run_slot().as_mut() {
            Some(run) => {
                run.input_artifact_ids.push(artifact_id.to_string());
                true
            }
            None => {
                warn!(artifact_id, "no active processing run for input");
                false
            }
        }
    }

    /// Create an artifact, copying its payload into the store if one is given.
    ///
    /// On a storage failure a single failure audit entry is written and the
    /// error is returned; the failed artifact is not handed back.
    pub fn create_artifact(&self, request: CreateArtifact) -> Result<Artifact, ManagerError> {
        request.validate()?;
        let CreateArtifact {
            artifact_type,
            source_path,
            source_artifact_ids,
            processing_module,
            processing_version,
            metadata,
        } = request;

        let mut artifact = Artifact::new(artifact_type);
        artifact.source_artifact_ids = source_artifact_ids;
        artifact.processing_module = processing_module;
        artifact.processing_version = processing_version;
        artifact.metadata = metadata;

        let outcome = {
            let _guard = self.guard();
            artifact.update_status(ArtifactStatus::Completed, None);
            let persisted = match &source_path {
                Some(path) => self.store.store(path, &mut artifact).map(|_| ()),
                None => self.store.save_metadata(&artifact),
            };
            match persisted {
                Ok(()) => {
                    if let Some(run) = self.run_slot().as_mut() {
                        run.output_artifact_ids.push(artifact.artifact_id.clone());
                    }
                    Ok(())
                }
                Err(e) => {
                    artifact.update_status(ArtifactStatus::Failed, Some(e.to_string()));
                    Err(e)
                }
            }
        };

        if let Err(e) = outcome {
            error!(
                artifact_id = %artifact.artifact_id,
                error = %e,
                "failed to store artifact"
            );
            let mut entry = AuditEntry::new(operations::ARTIFACT_STORAGE, actions::STORE)
                .artifact(artifact.artifact_id.as_str())
                .module(artifact.processing_module.clone())
                .failed(e.to_string());
            if let Some(path) = &source_path {
                entry = entry.detail("source_path", path.display().to_string());
            }
            self.record(entry);
            return Err(e.into());
        }

        self.record(
            AuditEntry::new(operations::ARTIFACT_CREATION, actions::CREATE)
                .artifact(artifact.artifact_id.as_str())
                .module(artifact.processing_module.clone())
                .detail("type", artifact_type.as_str())
                .detail("source_artifacts", artifact.source_artifact_ids.as_slice())
                .detail("has_file", artifact.has_file()),
        );

        info!(
            artifact_id = %artifact.artifact_id,
            artifact_type = %artifact_type,
            "created artifact"
        );
        Ok(artifact)
    }

    /// Set an artifact's status, persisting and auditing the change.
    ///
    /// Returns `None` when the id does not resolve.
    pub fn update_artifact_status(
        &self,
        artifact_id: &str,
        status: ArtifactStatus,
        error_message: Option<String>,
    ) -> Result<Option<Artifact>, ManagerError> {
        let outcome = {
            let _guard = self.guard();
            let Some(mut artifact) = self.store.load_metadata(artifact_id)? else {
                error!(artifact_id, "artifact not found for status update");
                return Ok(None);
            };
            artifact.update_status(status, error_message.clone());
            self.store.save_metadata(&artifact).map(|()| artifact)
        };

        let entry = AuditEntry::new(operations::ARTIFACT_UPDATE, actions::UPDATE_STATUS)
            .artifact(artifact_id)
            .detail("new_status", status.as_str())
            .detail("error_message", error_message);

        match outcome {
            Ok(artifact) => {
                self.record(entry.success(status != ArtifactStatus::Failed));
                info!(artifact_id, status = %status, "updated artifact status");
                Ok(Some(artifact))
            }
            Err(e) => {
                self.record(entry.failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Load an artifact's metadata; audited whether or not it is found.
    pub fn get_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>, ManagerError> {
        let loaded = {
            let _guard = self.guard();
            self.store.load_metadata(artifact_id)
        };

        let entry = AuditEntry::new(operations::ARTIFACT_ACCESS, actions::GET_METADATA)
            .artifact(artifact_id);
        match loaded {
            Ok(artifact) => {
                self.record(entry.success(artifact.is_some()));
                Ok(artifact)
            }
            Err(e) => {
                self.record(entry.failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Stored payload path; audited whether or not it is found.
    pub fn get_artifact_file(&self, artifact_id: &str) -> Result<Option<PathBuf>, ManagerError> {
        let entry =
            AuditEntry::new(operations::ARTIFACT_ACCESS, actions::GET_FILE).artifact(artifact_id);
        match self.store.retrieve(artifact_id) {
            Ok(path) => {
                self.record(entry.success(path.is_some()));
                Ok(path)
            }
            Err(e) => {
                self.record(entry.failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Artifacts matching every set filter, ordered by creation time.
    ///
    /// The run filter compares against `metadata["run_id"]`, which is only
    /// present when the creator supplied it (see [`CreateArtifact::in_run`]).
    pub fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<Artifact>, ManagerError> {
        let mut artifacts = self.store.list(filter.artifact_type, filter.status)?;
        if let Some(run_id) = &filter.run_id {
            artifacts.retain(|a| {
                a.metadata.get(RUN_ID_KEY).and_then(|v| v.as_str()) == Some(run_id.as_str())
            });
        }
        Ok(artifacts)
    }

    /// Record `source_ids` as sources of `output_id`.
    ///
    /// The ids are appended to `source_artifact_ids` and also stored under
    /// `metadata["<relationship>_artifacts"]`. Returns `None` when the
    /// output id does not resolve.
    pub fn link_artifacts(
        &self,
        source_ids: &[String],
        output_id: &str,
        relationship: &str,
    ) -> Result<Option<Artifact>, ManagerError> {
        let outcome = {
            let _guard = self.guard();
            match self.store.load_metadata(output_id) {
                Ok(Some(mut output)) => {
                    output.source_artifact_ids.extend(source_ids.iter().cloned());
                    output
                        .metadata
                        .insert(format!("{}_artifacts", relationship), source_ids.into());
                    self.store.save_metadata(&output).map(|()| Some(output))
                }
                other => other,
            }
        };

        let entry = AuditEntry::new(operations::ARTIFACT_LINK, actions::CREATE_RELATIONSHIP)
            .artifact(output_id)
            .detail("source_artifacts", source_ids)
            .detail("relationship", relationship);

        match outcome {
            Ok(Some(output)) => {
                self.record(entry);
                info!(
                    artifact_id = output_id,
                    sources = source_ids.len(),
                    relationship,
                    "linked artifacts"
                );
                Ok(Some(output))
            }
            Ok(None) => {
                error!(artifact_id = output_id, "output artifact not found for link");
                Ok(None)
            }
            Err(e) => {
                error!(artifact_id = output_id, error = %e, "failed to link artifacts");
                self.record(entry.failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Provenance tree rooted at `artifact_id`.
    pub fn get_artifact_lineage(&self, artifact_id: &str) -> Result<LineageNode, ManagerError> {
        let tree = build_lineage(artifact_id, |id| self.store.load_metadata(id))?;
        Ok(tree)
    }

    pub fn get_statistics(&self) -> Result<ManagerStatistics, ManagerError> {
        let storage = self.store.stats()?;
        let artifacts = ArtifactDistribution::from_artifacts(&self.store.list(None, None)?);
        let audit: Option<AuditStatistics> = match &self.audit {
            Some(log) => Some(log.error_summary(TimeRange::default())?.into()),
            None => None,
        };
        Ok(ManagerStatistics {
            storage,
            artifacts,
            audit,
        })
    }

    /// Delete stored payloads of artifacts created more than `days_old`
    /// days ago. Metadata records are kept.
    ///
    /// A payload that cannot be removed is audited as a failure and
    /// skipped. Returns the number of files removed.
    pub fn cleanup_old_artifacts(&self, days_old: u32) -> Result<usize, ManagerError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));
        let mut removed = 0;

        for artifact in self.store.list(None, None)? {
            if artifact.created_at >= cutoff {
                continue;
            }
            let entry = AuditEntry::new(operations::ARTIFACT_CLEANUP, actions::REMOVE_OLD)
                .artifact(artifact.artifact_id.as_str())
                .detail("age_days", artifact.age_days());

            match self.store.remove_payload(&artifact) {
                Ok(Some(bytes)) => {
                    removed += 1;
                    self.record(entry.detail("bytes", i64::try_from(bytes).unwrap_or(i64::MAX)));
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        artifact_id = %artifact.artifact_id,
                        error = %e,
                        "failed to remove old payload"
                    );
                    self.record(entry.failed(e.to_string()));
                }
            }
        }

        info!(removed, days_old, "cleaned up old artifacts");
        Ok(removed)
    }
}
