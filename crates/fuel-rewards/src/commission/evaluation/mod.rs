pub(super) mod calculator;
mod cashback;
mod conditions;
mod selector;

pub use selector::RuleSet;
pub(crate) use selector::evaluation_order;

use rust_decimal::Decimal;
use tracing::debug;

use super::domain::{CommissionResult, RuleUsed, SaleContext, SettingsSnapshot};
use calculator::{fallback_commission, finalize_commission, rule_commission};

/// Numeric input that cannot produce a meaningful payout.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputationError {
    #[error("sale amount {0} must not be negative")]
    NegativeAmount(Decimal),
    #[error("liters {0} must not be negative")]
    NegativeLiters(Decimal),
    #[error("{left} x {right} exceeds the representable decimal range")]
    Overflow { left: Decimal, right: Decimal },
    #[error("effective rate of {commission} on a sale of {total_amount} is out of range")]
    RateOutOfRange {
        commission: Decimal,
        total_amount: Decimal,
    },
}

/// Stateless evaluator bound to one settings snapshot and one rule set.
///
/// Both inputs are fixed at construction so every sale evaluated through the same engine sees
/// identical rates, which is what the recalculation job relies on.
#[derive(Debug, Clone)]
pub struct CommissionEngine {
    snapshot: SettingsSnapshot,
    rules: RuleSet,
}

impl CommissionEngine {
    pub fn new(snapshot: SettingsSnapshot, rules: RuleSet) -> Self {
        Self { snapshot, rules }
    }

    pub fn snapshot(&self) -> &SettingsSnapshot {
        &self.snapshot
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn evaluate(&self, context: &SaleContext) -> Result<CommissionResult, ComputationError> {
        if context.total_amount < Decimal::ZERO {
            return Err(ComputationError::NegativeAmount(context.total_amount));
        }
        if context.liters < Decimal::ZERO {
            return Err(ComputationError::NegativeLiters(context.liters));
        }

        let (raw, rule_used) = match self.rules.select(context) {
            Some(rule) => (
                rule_commission(rule, context.total_amount)?,
                RuleUsed::Rule(rule.id.clone()),
            ),
            None => (
                fallback_commission(context, &self.snapshot)?,
                RuleUsed::Fallback,
            ),
        };

        let figures =
            finalize_commission(raw, context.total_amount, self.snapshot.commission_cap)?;
        let cashback_amount = cashback::cashback_amount(context, &self.snapshot)?;

        debug!(
            rule = %rule_used,
            raw = %figures.raw,
            commission = %figures.amount,
            cashback = %cashback_amount,
            "commission evaluated"
        );

        Ok(CommissionResult {
            commission_amount: figures.amount,
            commission_rate: figures.effective_rate,
            cashback_amount,
            rule_used,
            settings_snapshot: self.snapshot.clone(),
        })
    }
}
