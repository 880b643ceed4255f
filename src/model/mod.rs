//! Core data model: artifacts, their metadata bag, and processing runs
//!
//! - Artifact statuses: PENDING → IN_PROGRESS → {COMPLETED | FAILED} → ARCHIVED
//!   (transitions are caller-driven and not enforced)
//! - Run states: IN_PROGRESS → {COMPLETED | FAILED}

mod artifact;
mod metadata;
mod run;

pub use artifact::{Artifact, ArtifactStatus, ArtifactType, UnknownVariant};
pub use metadata::{Metadata, MetadataValue};
pub use run::{ProcessingRun, RunError, RunStatus};

use chrono::{DateTime, Utc};

/// Current UTC timestamp, clamped so it never precedes `previous`.
///
/// Wall clocks can step backwards; stored timestamps must not.
pub fn monotonic_now(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now < previous {
        previous
    } else {
        now
    }
}
