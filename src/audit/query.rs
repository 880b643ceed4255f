//! Audit query filters and error aggregation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::AuditEntry;

/// Inclusive time window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }
}

/// Conjunction of optional predicates over audit entries.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub range: TimeRange,
    pub operation: Option<String>,
    pub action: Option<String>,
    pub artifact_id: Option<String>,
    pub user: Option<String>,
    pub module: Option<String>,
    pub success: Option<bool>,
    /// Stop after this many matches
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.range.start = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.range.end = Some(end);
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn artifact_id(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an entry satisfies every set predicate.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        fn field_eq(filter: &Option<String>, value: Option<&str>) -> bool {
            filter.as_deref().map_or(true, |f| value == Some(f))
        }

        self.range.contains(entry.timestamp)
            && field_eq(&self.operation, Some(&entry.operation))
            && field_eq(&self.action, Some(&entry.action))
            && field_eq(&self.artifact_id, entry.artifact_id.as_deref())
            && field_eq(&self.user, entry.user.as_deref())
            && field_eq(&self.module, entry.module.as_deref())
            && self.success.map_or(true, |s| entry.success == s)
    }
}

/// Failure counts over a window of the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub errors_by_operation: BTreeMap<String, usize>,
    /// Entries without a module are counted under `unknown`
    pub errors_by_module: BTreeMap<String, usize>,
    pub unique_error_messages: Vec<String>,
    pub time_range: TimeRange,
}

impl ErrorSummary {
    pub fn from_entries(errors: &[AuditEntry], time_range: TimeRange) -> Self {
        let mut summary = ErrorSummary {
            total_errors: errors.len(),
            time_range,
            ..Default::default()
        };
        let mut messages = BTreeSet::new();

        for error in errors {
            *summary
                .errors_by_operation
                .entry(error.operation.clone())
                .or_default() += 1;
            let module = error.module.clone().unwrap_or_else(|| "unknown".to_string());
            *summary.errors_by_module.entry(module).or_default() += 1;
            if let Some(msg) = error.error_message.as_deref().filter(|m| !m.is_empty()) {
                messages.insert(msg.to_string());
            }
        }

        summary.unique_error_messages = messages.into_iter().collect();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{actions, operations};

    #[test]
    fn test_empty_query_matches_everything() {
        let entry = AuditEntry::new(operations::ARTIFACT_ACCESS, actions::GET_FILE);
        assert!(AuditQuery::new().matches(&entry));
    }

    #[test]
    fn test_artifact_filter_excludes_null_ids() {
        let with_id = AuditEntry::new(operations::ARTIFACT_CREATION, actions::CREATE).artifact("a-1");
        let other_id = AuditEntry::new(operations::ARTIFACT_CREATION, actions::CREATE).artifact("a-2");
        let without = AuditEntry::new(operations::PROCESSING_RUN, actions::START);

        let query = AuditQuery::new().artifact_id("a-1");
        assert!(query.matches(&with_id));
        assert!(!query.matches(&other_id));
        assert!(!query.matches(&without));
    }

    #[test]
    fn test_predicates_are_conjunctive() {
        let entry = AuditEntry::new(operations::ARTIFACT_UPDATE, actions::UPDATE_STATUS)
            .module(Some("whisperx".to_string()))
            .failed("timeout");

        assert!(AuditQuery::new().module("whisperx").success(false).matches(&entry));
        assert!(!AuditQuery::new().module("whisperx").success(true).matches(&entry));
        assert!(!AuditQuery::new().operation("artifact_update").action("create").matches(&entry));
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let entry = AuditEntry::new(operations::ARTIFACT_ACCESS, actions::GET_METADATA);
        let at = entry.timestamp;
        assert!(AuditQuery::new().since(at).until(at).matches(&entry));
        assert!(!AuditQuery::new()
            .since(at + chrono::Duration::seconds(1))
            .matches(&entry));
        assert!(!AuditQuery::new()
            .until(at - chrono::Duration::seconds(1))
            .matches(&entry));
    }

    #[test]
    fn test_error_summary_aggregates() {
        let errors = vec![
            AuditEntry::new(operations::ARTIFACT_STORAGE, actions::STORE)
                .module(Some("ffmpeg".to_string()))
                .failed("disk full"),
            AuditEntry::new(operations::ARTIFACT_STORAGE, actions::STORE).failed("disk full"),
            AuditEntry::new(operations::ARTIFACT_UPDATE, actions::UPDATE_STATUS).success(false),
        ];

        let summary = ErrorSummary::from_entries(&errors, TimeRange::default());
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.errors_by_operation["artifact_storage"], 2);
        assert_eq!(summary.errors_by_operation["artifact_update"], 1);
        assert_eq!(summary.errors_by_module["ffmpeg"], 1);
        assert_eq!(summary.errors_by_module["unknown"], 2);
        assert_eq!(summary.unique_error_messages, vec!["disk full".to_string()]);
    }
}
