//! Artifact entity and its closed enumerations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{monotonic_now, Metadata};

/// Kind of data an artifact holds. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    VideoRaw,
    VideoKeypoints,
    VideoDeid,
    AudioRaw,
    AudioTranscript,
    AudioPhiIntervals,
    AudioDeid,
    TextRaw,
    TextDeid,
    Metadata,
    Log,
}

impl ArtifactType {
    /// Every member, in declaration order.
    pub const ALL: [ArtifactType; 11] = [
        ArtifactType::VideoRaw,
        ArtifactType::VideoKeypoints,
        ArtifactType::VideoDeid,
        ArtifactType::AudioRaw,
        ArtifactType::AudioTranscript,
        ArtifactType::AudioPhiIntervals,
        ArtifactType::AudioDeid,
        ArtifactType::TextRaw,
        ArtifactType::TextDeid,
        ArtifactType::Metadata,
        ArtifactType::Log,
    ];

    /// Stored string form, also the name of the type's storage partition.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::VideoRaw => "video_raw",
            ArtifactType::VideoKeypoints => "video_keypoints",
            ArtifactType::VideoDeid => "video_deid",
            ArtifactType::AudioRaw => "audio_raw",
            ArtifactType::AudioTranscript => "audio_transcript",
            ArtifactType::AudioPhiIntervals => "audio_phi_intervals",
            ArtifactType::AudioDeid => "audio_deid",
            ArtifactType::TextRaw => "text_raw",
            ArtifactType::TextDeid => "text_deid",
            ArtifactType::Metadata => "metadata",
            ArtifactType::Log => "log",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("artifact_type", s))
    }
}

/// Lifecycle status of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Archived,
}

impl ArtifactStatus {
    pub const ALL: [ArtifactStatus; 5] = [
        ArtifactStatus::Pending,
        ArtifactStatus::InProgress,
        ArtifactStatus::Completed,
        ArtifactStatus::Failed,
        ArtifactStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Pending => "pending",
            ArtifactStatus::InProgress => "in_progress",
            ArtifactStatus::Completed => "completed",
            ArtifactStatus::Failed => "failed",
            ArtifactStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("status", s))
    }
}

/// A stored enum string that names no known member.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} variant: {value:?}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

/// One tracked unit of produced data.
///
/// `file_path`, `file_size` and `checksum` are either all set (a physical
/// payload is attached) or all unset.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Unique identifier, immutable
    pub artifact_id: String,

    /// Kind of data, immutable
    pub artifact_type: ArtifactType,

    pub status: ArtifactStatus,

    pub created_at: DateTime<Utc>,

    /// Never earlier than `created_at`
    pub updated_at: DateTime<Utc>,

    /// Non-owning back-references; may dangle
    pub source_artifact_ids: Vec<String>,

    pub processing_module: Option<String>,

    pub processing_version: Option<String>,

    pub file_path: Option<PathBuf>,

    pub file_size: Option<u64>,

    /// Hex SHA-256 of the stored bytes, computed once at store time
    pub checksum: Option<String>,

    pub metadata: Metadata,

    pub error_message: Option<String>,
}

impl Artifact {
    /// Create a pending artifact with a fresh identifier.
    pub fn new(artifact_type: ArtifactType) -> Self {
        let now = Utc::now();
        Self {
            artifact_id: uuid::Uuid::new_v4().to_string(),
            artifact_type,
            status: ArtifactStatus::Pending,
            created_at: now,
            updated_at: now,
            source_artifact_ids: Vec::new(),
            processing_module: None,
            processing_version: None,
            file_path: None,
            file_size: None,
            checksum: None,
            metadata: Metadata::new(),
            error_message: None,
        }
    }

    /// Set the status and stamp `updated_at`.
    ///
    /// An error message is recorded only when one is supplied; a previous
    /// message is left in place otherwise.
    pub fn update_status(&mut self, status: ArtifactStatus, error_message: Option<String>) {
        self.status = status;
        self.updated_at = monotonic_now(self.updated_at);
        if let Some(message) = error_message {
            self.error_message = Some(message);
        }
    }

    /// Record the physical payload.
    pub fn attach_file(&mut self, path: PathBuf, size: u64, checksum: String) {
        self.file_path = Some(path);
        self.file_size = Some(size);
        self.checksum = Some(checksum);
    }

    pub fn has_file(&self) -> bool {
        self.file_path.is_some()
    }

    /// Whole days elapsed since creation.
    pub fn age_days(&self) -> i64 {
        (Utc::now() - self.created_at).num_days()
    }
}
