//! Checksummed file storage for artifacts
//!
//! Layout under the store root:
//! - `artifacts/<type>/<artifact_id>_<sanitized_name>`: stored payloads
//! - `metadata/<artifact_id>.json`: one metadata document per artifact
//! - `runs/<run_id>.json`: processing run records
//! - `temp/`: scratch area, purged by `cleanup_temp`

mod checksum;
mod file_store;
mod record;

pub use checksum::{compute_file_sha256, compute_sha256, sanitize_file_name, MAX_FILE_NAME_LEN};
pub use file_store::{ChecksumFileStore, StorageStats, StoreError};
pub use record::ArtifactRecord;
