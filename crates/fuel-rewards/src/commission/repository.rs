use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{CommissionRule, CommissionSettings, RuleId};

/// Storage abstraction for commission rules so the service can be exercised in isolation.
pub trait RuleRepository: Send + Sync {
    fn insert(&self, rule: CommissionRule) -> Result<CommissionRule, RepositoryError>;
    fn update(&self, rule: CommissionRule) -> Result<(), RepositoryError>;
    fn delete(&self, id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError>;
    fn fetch(&self, id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError>;
    fn list(&self) -> Result<Vec<CommissionRule>, RepositoryError>;
}

/// Read (and rare write) access to the global commission settings.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Result<Option<CommissionSettings>, RepositoryError>;
    fn replace(&self, settings: CommissionSettings) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Append-only audit trail. Callers never wait on or react to the outcome beyond logging it.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RuleCreated,
    RuleUpdated,
    RuleDeleted,
    RuleToggled,
    SettingsReplaced,
    RecalculationRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor: String,
    pub action: AuditAction,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(actor: impl Into<String>, action: AuditAction, subject: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action,
            subject: subject.into(),
            before: None,
            after: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn with_after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }
}

/// Audit dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Transport(String),
}
