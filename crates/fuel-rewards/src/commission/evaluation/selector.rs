use std::cmp::Ordering;

use super::super::domain::{CommissionRule, SaleContext};
use super::conditions::conditions_match;

/// Active rules held in evaluation order: priority descending, then creation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    ordered: Vec<CommissionRule>,
}

impl RuleSet {
    pub fn new(rules: impl IntoIterator<Item = CommissionRule>) -> Self {
        let mut ordered: Vec<CommissionRule> =
            rules.into_iter().filter(|rule| rule.is_active).collect();
        ordered.sort_by(evaluation_order);
        Self { ordered }
    }

    /// First rule in evaluation order whose conditions match the sale.
    pub fn select(&self, context: &SaleContext) -> Option<&CommissionRule> {
        self.ordered
            .iter()
            .find(|rule| conditions_match(&rule.conditions, context))
    }

    pub fn rules(&self) -> &[CommissionRule] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Priority descending, then earlier `created_at`, then smaller id.
pub(crate) fn evaluation_order(left: &CommissionRule, right: &CommissionRule) -> Ordering {
    right
        .priority
        .cmp(&left.priority)
        .then_with(|| left.created_at.cmp(&right.created_at))
        .then_with(|| left.id.cmp(&right.id))
}
