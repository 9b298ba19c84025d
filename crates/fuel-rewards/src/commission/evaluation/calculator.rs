use rust_decimal::{Decimal, RoundingStrategy};

use super::super::domain::{CommissionRule, RuleType, SaleContext, SettingsSnapshot};
use super::ComputationError;

/// Commission figures after the cap has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommissionFigures {
    pub raw: Decimal,
    pub amount: Decimal,
    pub effective_rate: Decimal,
}

/// Round to cents and pin the scale so values always render with two decimals.
pub(crate) fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

pub(crate) fn checked_mul(left: Decimal, right: Decimal) -> Result<Decimal, ComputationError> {
    left.checked_mul(right).ok_or(ComputationError::Overflow { left, right })
}

fn percent_of(amount: Decimal, rate: Decimal) -> Result<Decimal, ComputationError> {
    Ok(checked_mul(amount, rate)? / Decimal::ONE_HUNDRED)
}

/// Raw commission for a matched rule. Fixed rules ignore the sale amount.
pub(crate) fn rule_commission(
    rule: &CommissionRule,
    total_amount: Decimal,
) -> Result<Decimal, ComputationError> {
    match rule.rule_type {
        RuleType::Percentage => percent_of(total_amount, rule.rate),
        RuleType::Fixed => Ok(rule.rate),
    }
}

/// Raw commission from the base rate scaled by the user's tier multiplier.
pub(crate) fn fallback_commission(
    context: &SaleContext,
    snapshot: &SettingsSnapshot,
) -> Result<Decimal, ComputationError> {
    let base = percent_of(context.total_amount, snapshot.base_commission_rate)?;
    checked_mul(base, snapshot.tier_multiplier(context.user_tier))
}

/// Clamp to the cap, round, and derive the effective rate. A zero sale amount yields a zero rate.
pub(crate) fn finalize_commission(
    raw: Decimal,
    total_amount: Decimal,
    commission_cap: Decimal,
) -> Result<CommissionFigures, ComputationError> {
    let amount = round2(raw.min(commission_cap));
    let effective_rate = if total_amount > Decimal::ZERO {
        let out_of_range = || ComputationError::RateOutOfRange {
            commission: amount,
            total_amount,
        };
        amount
            .checked_div(total_amount)
            .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
            .map(round2)
            .ok_or_else(out_of_range)?
    } else {
        Decimal::ZERO
    };

    Ok(CommissionFigures {
        raw,
        amount,
        effective_rate,
    })
}
