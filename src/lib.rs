//! Artifact ledger - artifact store, audit trail and lineage tracking
//!
//! Bookkeeping for a multi-stage media-processing pipeline: produced files
//! are copied into a type-partitioned store with a SHA-256 fingerprint,
//! every operation is appended to a rotating JSON-lines audit journal, and
//! provenance between artifacts is recorded and reconstructed as lineage
//! trees. External transformation programs are treated as opaque
//! collaborators whose outcomes are recorded, never interpreted.

pub mod audit;
pub mod collaborator;
pub mod config;
pub mod manager;
pub mod model;
pub mod store;

pub use audit::{
    AuditEntry, AuditError, AuditLog, AuditQuery, ErrorSummary, ExportFormat, TimeRange,
};
pub use collaborator::{run_stage, Collaborator, CollaboratorError, CommandCollaborator};
pub use config::{ConfigError, LedgerConfig};
pub use manager::{
    ArtifactFilter, ArtifactManager, CreateArtifact, LineageNode, ManagerError, ManagerStatistics,
};
pub use model::{
    Artifact, ArtifactStatus, ArtifactType, Metadata, MetadataValue, ProcessingRun, RunStatus,
};
pub use store::{ChecksumFileStore, StorageStats, StoreError};
