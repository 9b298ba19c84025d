use rust_decimal::Decimal;

use super::domain::{CommissionSettings, RuleConditions, RuleDraft, RuleType};

pub const MAX_RULE_RATE: Decimal = Decimal::ONE_THOUSAND;
pub const MAX_RULE_PRIORITY: i64 = 100;

/// Malformed administrative input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("rule name must not be empty")]
    EmptyName,
    #[error("rate {0} must be between 0 and 1000")]
    RateOutOfRange(Decimal),
    #[error("unknown rule type '{0}', expected 'percentage' or 'fixed'")]
    UnknownRuleType(String),
    #[error("priority {0} must be between 0 and 100")]
    PriorityOutOfRange(i64),
    #[error("condition {field} must not be negative")]
    NegativeCondition { field: &'static str },
    #[error("unknown tier '{0}'")]
    UnknownTier(String),
    #[error("setting {field} must not be negative")]
    NegativeSetting { field: String },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Rule fields that passed validation, ready to be stamped with an id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRule {
    pub name: String,
    pub description: String,
    pub rate: Decimal,
    pub rule_type: RuleType,
    pub priority: u8,
    pub conditions: RuleConditions,
    pub is_active: bool,
}

pub fn validate_draft(draft: RuleDraft) -> Result<ValidatedRule, ValidationError> {
    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    if draft.rate < Decimal::ZERO || draft.rate > MAX_RULE_RATE {
        return Err(ValidationError::RateOutOfRange(draft.rate));
    }

    let rule_type = draft.rule_type.parse::<RuleType>()?;

    if !(0..=MAX_RULE_PRIORITY).contains(&draft.priority) {
        return Err(ValidationError::PriorityOutOfRange(draft.priority));
    }
    let priority = u8::try_from(draft.priority)
        .map_err(|_| ValidationError::PriorityOutOfRange(draft.priority))?;

    if draft
        .conditions
        .minimum_growth
        .is_some_and(|growth| growth < Decimal::ZERO)
    {
        return Err(ValidationError::NegativeCondition {
            field: "minimum_growth",
        });
    }

    Ok(ValidatedRule {
        name,
        description: draft.description.trim().to_string(),
        rate: draft.rate,
        rule_type,
        priority,
        conditions: draft.conditions,
        is_active: draft.is_active,
    })
}

pub fn validate_settings(settings: &CommissionSettings) -> Result<(), ValidationError> {
    let negative = |field: &str| ValidationError::NegativeSetting {
        field: field.to_string(),
    };

    if settings.base_commission_rate < Decimal::ZERO {
        return Err(negative("base_commission_rate"));
    }
    if settings.cashback_rate < Decimal::ZERO {
        return Err(negative("cashback_rate"));
    }
    if settings
        .commission_cap
        .is_some_and(|cap| cap < Decimal::ZERO)
    {
        return Err(negative("commission_cap"));
    }
    if let Some((tier, _)) = settings
        .tier_multipliers
        .iter()
        .find(|(_, multiplier)| **multiplier < Decimal::ZERO)
    {
        return Err(negative(&format!("tier_multipliers.{tier}")));
    }

    Ok(())
}
