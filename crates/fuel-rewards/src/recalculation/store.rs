use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commission::{CommissionResult, RuleUsed, SaleContext, Tier};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SaleId(pub String);

impl fmt::Display for SaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commission fields stored on a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleCommission {
    pub amount: Decimal,
    pub rate: Decimal,
    pub rule_used: RuleUsed,
}

/// Historical sale as seen by the recalculation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: SaleId,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub liters: Option<Decimal>,
    pub commission: Option<SaleCommission>,
    pub cashback_earned: Option<Decimal>,
    pub settings_snapshot: Option<String>,
}

impl SaleRecord {
    pub fn apply(&mut self, result: &CommissionResult) {
        self.commission = Some(SaleCommission {
            amount: result.commission_amount,
            rate: result.commission_rate,
            rule_used: result.rule_used.clone(),
        });
        self.cashback_earned = Some(result.cashback_amount);
        self.settings_snapshot = Some(result.settings_snapshot.reference.clone());
    }
}

/// User attributes feeding rule conditions and tier multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub tier: Tier,
    #[serde(default)]
    pub sales_count: Option<u64>,
    #[serde(default)]
    pub network_size: Option<u64>,
    #[serde(default)]
    pub growth_rate: Option<Decimal>,
}

impl UserProfile {
    /// Sale context for one of this user's sales, or `None` when liters were never recorded.
    pub fn context_for(&self, sale: &SaleRecord) -> Option<SaleContext> {
        let liters = sale.liters?;
        Some(SaleContext {
            total_amount: sale.total_amount,
            liters,
            user_tier: self.tier,
            sales_count: self.sales_count,
            network_size: self.network_size,
            growth_rate: self.growth_rate,
        })
    }
}

/// Read access to commissioned sales and their users, plus the per-sale commission write.
pub trait SaleStore: Send + Sync {
    /// Sales that currently carry commission data.
    fn commissioned_sales(&self) -> Result<Vec<SaleRecord>, PersistenceError>;
    fn user(&self, id: &UserId) -> Result<Option<UserProfile>, PersistenceError>;
    /// Overwrite the sale's commission, cashback, and settings snapshot reference.
    fn write_commission(
        &self,
        id: &SaleId,
        result: &CommissionResult,
    ) -> Result<(), PersistenceError>;
}

/// Sale store failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("sale {0} not found")]
    SaleNotFound(SaleId),
    #[error("sale store unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected for sale {sale_id}: {reason}")]
    WriteRejected { sale_id: SaleId, reason: String },
}
