use rust_decimal::Decimal;

use super::super::domain::{SaleContext, SettingsSnapshot};
use super::calculator::{checked_mul, round2};
use super::ComputationError;

/// Cashback is paid per liter and scaled by tier. The sale amount never enters the formula.
pub(crate) fn cashback_amount(
    context: &SaleContext,
    snapshot: &SettingsSnapshot,
) -> Result<Decimal, ComputationError> {
    let per_liter = checked_mul(context.liters, snapshot.cashback_rate)?;
    Ok(round2(checked_mul(
        per_liter,
        snapshot.tier_multiplier(context.user_tier),
    )?))
}
