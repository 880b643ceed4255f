//! Audit record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Metadata, MetadataValue};

/// Operation categories written by the manager.
pub mod operations {
    pub const PROCESSING_RUN: &str = "processing_run";
    pub const ARTIFACT_CREATION: &str = "artifact_creation";
    pub const ARTIFACT_STORAGE: &str = "artifact_storage";
    pub const ARTIFACT_UPDATE: &str = "artifact_update";
    pub const ARTIFACT_ACCESS: &str = "artifact_access";
    pub const ARTIFACT_LINK: &str = "artifact_link";
    pub const ARTIFACT_CLEANUP: &str = "artifact_cleanup";
    pub const PROCESSING: &str = "processing";
}

/// Verbs paired with the operation categories.
pub mod actions {
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const CREATE: &str = "create";
    pub const STORE: &str = "store";
    pub const UPDATE_STATUS: &str = "update_status";
    pub const GET_METADATA: &str = "get_metadata";
    pub const GET_FILE: &str = "get_file";
    pub const CREATE_RELATIONSHIP: &str = "create_relationship";
    pub const REMOVE_OLD: &str = "remove_old";
    pub const STAGE: &str = "stage";
}

/// One immutable record of an operation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,

    pub timestamp: DateTime<Utc>,

    /// Category, e.g. `artifact_creation`
    pub operation: String,

    #[serde(default)]
    pub artifact_id: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub module: Option<String>,

    /// Verb, e.g. `create`
    pub action: String,

    #[serde(default)]
    pub details: Metadata,

    pub success: bool,

    #[serde(default)]
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// Serialized keys in record order.
    pub const FIELDS: [&'static str; 10] = [
        "entry_id",
        "timestamp",
        "operation",
        "artifact_id",
        "user",
        "module",
        "action",
        "details",
        "success",
        "error_message",
    ];

    /// A successful entry with no artifact, user, module or details.
    pub fn new(operation: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation: operation.into(),
            artifact_id: None,
            user: None,
            module: None,
            action: action.into(),
            details: Metadata::new(),
            success: true,
            error_message: None,
        }
    }

    pub fn artifact(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn module(mut self, module: Option<String>) -> Self {
        self.module = module;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Mark as failed with a message.
    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }
}
