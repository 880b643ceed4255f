//! Append-only audit trail
//!
//! One JSON record per line in monthly files (`audit_<YYYYMM>.jsonl`).
//! When the active file reaches the rotation threshold it is renamed to
//! `audit_<YYYYMM>.<n>.jsonl` with the smallest unused `n`; nothing is ever
//! deleted.

mod entry;
mod export;
mod journal;
mod query;

pub use entry::{actions, operations, AuditEntry};
pub use export::ExportFormat;
pub use journal::{AuditLog, DEFAULT_ROTATION_SIZE_MB};
pub use query::{AuditQuery, ErrorSummary, TimeRange};

use std::io;

/// Errors for audit trail operations
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
