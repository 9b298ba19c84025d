use super::super::domain::{RuleConditions, SaleContext};

/// A rule matches only when every condition it sets is satisfied by the sale.
/// A condition whose context metric is absent is not satisfied.
pub(crate) fn conditions_match(conditions: &RuleConditions, context: &SaleContext) -> bool {
    let sales_ok = conditions.minimum_sales.map_or(true, |minimum| {
        context.sales_count.is_some_and(|count| count >= minimum)
    });

    let users_ok = conditions.minimum_users.map_or(true, |minimum| {
        context.network_size.is_some_and(|size| size >= minimum)
    });

    let growth_ok = conditions.minimum_growth.map_or(true, |minimum| {
        context.growth_rate.is_some_and(|growth| growth >= minimum)
    });

    let tier_ok = conditions.tier_restrictions.is_empty()
        || conditions.tier_restrictions.contains(&context.user_tier);

    sales_ok && users_ok && growth_ok && tier_ok
}
