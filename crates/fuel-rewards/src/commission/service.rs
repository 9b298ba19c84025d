use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    CommissionResult, CommissionRule, CommissionSettings, EvaluationRequest, RuleDraft, RuleId,
    SettingsSnapshot,
};
use super::evaluation::{evaluation_order, CommissionEngine, ComputationError, RuleSet};
use super::repository::{
    AuditAction, AuditRecord, AuditSink, RepositoryError, RuleRepository, SettingsProvider,
};
use super::validation::{validate_draft, validate_settings, ValidationError};

/// Service composing rule storage, settings access, the audit trail, and the engine.
pub struct CommissionRuleService<R, S, A> {
    rules: Arc<R>,
    settings: Arc<S>,
    audit: Arc<A>,
}

static RULE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_rule_id() -> RuleId {
    let id = RULE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RuleId(format!("rule-{id:06}"))
}

impl<R, S, A> CommissionRuleService<R, S, A>
where
    R: RuleRepository + 'static,
    S: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    pub fn new(rules: Arc<R>, settings: Arc<S>, audit: Arc<A>) -> Self {
        Self {
            rules,
            settings,
            audit,
        }
    }

    /// Validate and store a new rule.
    pub fn create(&self, actor: &str, draft: RuleDraft) -> Result<CommissionRule, CommissionError> {
        let validated = validate_draft(draft)?;
        let now = Utc::now();
        let rule = CommissionRule {
            id: next_rule_id(),
            name: validated.name,
            description: validated.description,
            rate: validated.rate,
            rule_type: validated.rule_type,
            priority: validated.priority,
            conditions: validated.conditions,
            is_active: validated.is_active,
            created_at: now,
            updated_at: now,
        };

        let stored = self.rules.insert(rule)?;
        info!(rule_id = %stored.id, %actor, priority = stored.priority, "commission rule created");
        self.audit(
            AuditRecord::new(actor, AuditAction::RuleCreated, stored.id.0.clone())
                .with_after(&stored),
        );
        Ok(stored)
    }

    /// Replace the editable fields of an existing rule, keeping its id and creation time.
    pub fn update(
        &self,
        actor: &str,
        id: &RuleId,
        draft: RuleDraft,
    ) -> Result<CommissionRule, CommissionError> {
        let validated = validate_draft(draft)?;
        let before = self.get(id)?;

        let rule = CommissionRule {
            id: before.id.clone(),
            name: validated.name,
            description: validated.description,
            rate: validated.rate,
            rule_type: validated.rule_type,
            priority: validated.priority,
            conditions: validated.conditions,
            is_active: validated.is_active,
            created_at: before.created_at,
            updated_at: Utc::now(),
        };

        self.rules.update(rule.clone())?;
        info!(rule_id = %rule.id, %actor, "commission rule updated");
        self.audit(
            AuditRecord::new(actor, AuditAction::RuleUpdated, rule.id.0.clone())
                .with_before(&before)
                .with_after(&rule),
        );
        Ok(rule)
    }

    pub fn delete(&self, actor: &str, id: &RuleId) -> Result<CommissionRule, CommissionError> {
        let removed = self
            .rules
            .delete(id)?
            .ok_or_else(|| NotFoundError::Rule(id.clone()))?;

        info!(rule_id = %removed.id, %actor, "commission rule deleted");
        self.audit(
            AuditRecord::new(actor, AuditAction::RuleDeleted, removed.id.0.clone())
                .with_before(&removed),
        );
        Ok(removed)
    }

    /// Flip `is_active` and return the stored result.
    pub fn toggle(&self, actor: &str, id: &RuleId) -> Result<CommissionRule, CommissionError> {
        let before = self.get(id)?;
        let mut rule = before.clone();
        rule.is_active = !before.is_active;
        rule.updated_at = Utc::now();

        self.rules.update(rule.clone())?;
        info!(rule_id = %rule.id, %actor, is_active = rule.is_active, "commission rule toggled");
        self.audit(
            AuditRecord::new(actor, AuditAction::RuleToggled, rule.id.0.clone())
                .with_before(&before)
                .with_after(&rule),
        );
        Ok(rule)
    }

    pub fn get(&self, id: &RuleId) -> Result<CommissionRule, CommissionError> {
        let rule = self
            .rules
            .fetch(id)?
            .ok_or_else(|| NotFoundError::Rule(id.clone()))?;
        Ok(rule)
    }

    /// All rules, highest priority first.
    pub fn list(&self) -> Result<Vec<CommissionRule>, CommissionError> {
        let mut rules = self.rules.list()?;
        rules.sort_by(evaluation_order);
        Ok(rules)
    }

    pub fn settings(&self) -> Result<CommissionSettings, CommissionError> {
        let settings = self.settings.current()?.ok_or(NotFoundError::Settings)?;
        Ok(settings)
    }

    /// Validate and store new settings, bumping the version used in snapshot references.
    pub fn replace_settings(
        &self,
        actor: &str,
        mut settings: CommissionSettings,
    ) -> Result<CommissionSettings, CommissionError> {
        validate_settings(&settings)?;
        let before = self.settings.current()?;

        settings.version = before.as_ref().map_or(1, |current| current.version + 1);
        settings.updated_at = Utc::now();
        self.settings.replace(settings.clone())?;

        info!(%actor, version = settings.version, "commission settings replaced");
        let mut record = AuditRecord::new(
            actor,
            AuditAction::SettingsReplaced,
            format!("settings-v{}", settings.version),
        )
        .with_after(&settings);
        if let Some(previous) = &before {
            record = record.with_before(previous);
        }
        self.audit(record);
        Ok(settings)
    }

    /// Engine bound to the current settings and the current active rule set.
    pub fn engine(&self) -> Result<CommissionEngine, CommissionError> {
        let settings = self.settings()?;
        let snapshot = SettingsSnapshot::capture(&settings, Utc::now());
        let rules = RuleSet::new(self.rules.list()?);
        Ok(CommissionEngine::new(snapshot, rules))
    }

    /// Evaluate a sale without persisting anything.
    pub fn evaluate(&self, request: EvaluationRequest) -> Result<CommissionResult, CommissionError> {
        let context = request.into_context()?;
        let engine = self.engine()?;
        let result = engine.evaluate(&context)?;
        Ok(result)
    }

    fn audit(&self, record: AuditRecord) {
        let action = record.action;
        if let Err(err) = self.audit.append(record) {
            warn!(?action, error = %err, "audit record dropped");
        }
    }
}

/// A required record is missing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotFoundError {
    #[error("commission rule {0} not found")]
    Rule(RuleId),
    #[error("commission settings have not been configured")]
    Settings,
}

/// Error raised by the commission service.
#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

impl CommissionError {
    pub fn code(&self) -> &'static str {
        match self {
            CommissionError::Validation(_) => "VALIDATION_ERROR",
            CommissionError::NotFound(_) | CommissionError::Persistence(RepositoryError::NotFound) => {
                "NOT_FOUND"
            }
            CommissionError::Computation(_) => "COMPUTATION_ERROR",
            CommissionError::Persistence(RepositoryError::Conflict) => "CONFLICT",
            CommissionError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}
