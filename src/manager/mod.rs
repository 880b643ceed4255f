//! Artifact manager: run lifecycle, audited artifact operations, lineage
//!
//! A single manager-wide lock serializes artifact creation, status updates
//! and metadata reads. Listings, lineage and statistics read the store
//! without that lock and may observe a write in progress on another thread.
//! The audit log keeps its own lock; audit appends are issued after the
//! manager lock is released.

mod artifact_manager;
mod lineage;
mod request;
mod statistics;

pub use artifact_manager::{ArtifactManager, DEFAULT_RELATIONSHIP};
pub use lineage::{build_lineage, LineageNode};
pub use request::{ArtifactFilter, CreateArtifact, RUN_ID_KEY};
pub use statistics::{ArtifactDistribution, AuditStatistics, ManagerStatistics};

use crate::audit::AuditError;
use crate::model::RunError;
use crate::store::StoreError;

/// Errors surfaced by manager operations
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),
}
