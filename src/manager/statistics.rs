//! Aggregate figures over the store and the audit trail

use serde::Serialize;
use std::collections::BTreeMap;

use crate::audit::ErrorSummary;
use crate::model::Artifact;
use crate::store::StorageStats;

/// Combined storage, artifact and audit figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStatistics {
    pub storage: StorageStats,
    pub artifacts: ArtifactDistribution,
    /// Present only when auditing is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditStatistics>,
}

/// Status and type histograms over the metadata records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactDistribution {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

impl ArtifactDistribution {
    pub fn from_artifacts(artifacts: &[Artifact]) -> Self {
        let mut distribution = Self {
            total: artifacts.len(),
            ..Default::default()
        };
        for artifact in artifacts {
            *distribution
                .by_status
                .entry(artifact.status.as_str().to_string())
                .or_default() += 1;
            *distribution
                .by_type
                .entry(artifact.artifact_type.as_str().to_string())
                .or_default() += 1;
        }
        distribution
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditStatistics {
    pub total_errors: usize,
    pub errors_by_operation: BTreeMap<String, usize>,
}

impl From<ErrorSummary> for AuditStatistics {
    fn from(summary: ErrorSummary) -> Self {
        Self {
            total_errors: summary.total_errors,
            errors_by_operation: summary.errors_by_operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactStatus, ArtifactType};

    #[test]
    fn test_distribution_counts() {
        let mut done = Artifact::new(ArtifactType::VideoRaw);
        done.update_status(ArtifactStatus::Completed, None);
        let artifacts = vec![
            done,
            Artifact::new(ArtifactType::VideoRaw),
            Artifact::new(ArtifactType::AudioRaw),
        ];

        let dist = ArtifactDistribution::from_artifacts(&artifacts);
        assert_eq!(dist.total, 3);
        assert_eq!(dist.by_status["pending"], 2);
        assert_eq!(dist.by_status["completed"], 1);
        assert_eq!(dist.by_type["video_raw"], 2);
        assert!(!dist.by_type.contains_key("log"));
    }

    #[test]
    fn test_audit_section_omitted_when_disabled() {
        let stats = ManagerStatistics {
            storage: StorageStats::default(),
            artifacts: ArtifactDistribution::default(),
            audit: None,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("audit").is_none());
        assert_eq!(json["artifacts"]["total"], 0);
    }
}
