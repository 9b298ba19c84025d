//! Commission rule management and the evaluation engine that turns a sale into a commission and
//! cashback payout.

pub mod domain;
pub mod evaluation;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    CommissionResult, CommissionRule, CommissionSettings, EvaluationRequest, RuleConditions,
    RuleDraft, RuleId, RuleType, RuleUsed, SaleContext, SettingsSnapshot, Tier,
    DEFAULT_COMMISSION_CAP,
};
pub use evaluation::{CommissionEngine, ComputationError, RuleSet};
pub use repository::{
    AuditAction, AuditError, AuditRecord, AuditSink, RepositoryError, RuleRepository,
    SettingsProvider,
};
pub use router::commission_router;
pub use service::{CommissionError, CommissionRuleService, NotFoundError};
pub use validation::ValidationError;
