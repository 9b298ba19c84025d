use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::validation::ValidationError;

/// Commission cap applied when settings leave it unset.
pub const DEFAULT_COMMISSION_CAP: Decimal = Decimal::ONE_THOUSAND;

/// Identifier wrapper for commission rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loyalty level attached to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Lead,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lead" => Ok(Self::Lead),
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "platinum" => Ok(Self::Platinum),
            _ => Err(ValidationError::UnknownTier(raw.to_string())),
        }
    }
}

/// How a rule's rate turns into a raw commission value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// `rate` is a percentage (0-100 scale) of the sale amount.
    Percentage,
    /// `rate` is a flat currency amount.
    Fixed,
}

impl FromStr for RuleType {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            _ => Err(ValidationError::UnknownRuleType(raw.to_string())),
        }
    }
}

/// Optional matching constraints. An unset field places no constraint on the sale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_sales: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_users: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_growth: Option<Decimal>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tier_restrictions: BTreeSet<Tier>,
}

/// Persisted commission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub id: RuleId,
    pub name: String,
    pub description: String,
    pub rate: Decimal,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub priority: u8,
    pub conditions: RuleConditions,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Untrusted rule payload as received from administrators or seed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rate: Decimal,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub conditions: RuleConditions,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Global fallback settings used when no rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSettings {
    /// Percentage (0-100 scale) of the sale amount.
    pub base_commission_rate: Decimal,
    #[serde(default)]
    pub tier_multipliers: BTreeMap<Tier, Decimal>,
    #[serde(default)]
    pub commission_cap: Option<Decimal>,
    /// Currency paid per liter sold.
    pub cashback_rate: Decimal,
    #[serde(default)]
    pub version: u64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionSettings {
    pub fn tier_multiplier(&self, tier: Tier) -> Decimal {
        self.tier_multipliers
            .get(&tier)
            .copied()
            .unwrap_or(Decimal::ONE)
    }

    pub fn effective_cap(&self) -> Decimal {
        self.commission_cap.unwrap_or(DEFAULT_COMMISSION_CAP)
    }
}

/// Immutable copy of the settings values used for one evaluation or one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub reference: String,
    pub captured_at: DateTime<Utc>,
    pub base_commission_rate: Decimal,
    pub tier_multipliers: BTreeMap<Tier, Decimal>,
    pub commission_cap: Decimal,
    pub cashback_rate: Decimal,
}

impl SettingsSnapshot {
    pub fn capture(settings: &CommissionSettings, captured_at: DateTime<Utc>) -> Self {
        Self {
            reference: format!("settings-v{}", settings.version),
            captured_at,
            base_commission_rate: settings.base_commission_rate,
            tier_multipliers: settings.tier_multipliers.clone(),
            commission_cap: settings.effective_cap(),
            cashback_rate: settings.cashback_rate,
        }
    }

    pub fn tier_multiplier(&self, tier: Tier) -> Decimal {
        self.tier_multipliers
            .get(&tier)
            .copied()
            .unwrap_or(Decimal::ONE)
    }
}

/// Sale facts needed to select a rule and compute the payout.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleContext {
    pub total_amount: Decimal,
    pub liters: Decimal,
    pub user_tier: Tier,
    pub sales_count: Option<u64>,
    pub network_size: Option<u64>,
    pub growth_rate: Option<Decimal>,
}

impl SaleContext {
    pub fn new(total_amount: Decimal, liters: Decimal, user_tier: Tier) -> Self {
        Self {
            total_amount,
            liters,
            user_tier,
            sales_count: None,
            network_size: None,
            growth_rate: None,
        }
    }
}

/// Evaluate-on-demand payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub sales_amount: Decimal,
    pub user_tier: String,
    #[serde(default)]
    pub liters: Decimal,
    #[serde(default)]
    pub sales_count: Option<u64>,
    #[serde(default)]
    pub network_size: Option<u64>,
    #[serde(default)]
    pub growth_rate: Option<Decimal>,
}

impl EvaluationRequest {
    pub fn into_context(self) -> Result<SaleContext, ValidationError> {
        let user_tier = self.user_tier.parse::<Tier>()?;
        Ok(SaleContext {
            total_amount: self.sales_amount,
            liters: self.liters,
            user_tier,
            sales_count: self.sales_count,
            network_size: self.network_size,
            growth_rate: self.growth_rate,
        })
    }
}

/// Which path produced a commission value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleUsed {
    Rule(RuleId),
    Fallback,
}

const FALLBACK_LABEL: &str = "fallback";

impl fmt::Display for RuleUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleUsed::Rule(id) => f.write_str(&id.0),
            RuleUsed::Fallback => f.write_str(FALLBACK_LABEL),
        }
    }
}

impl RuleUsed {
    pub fn from_label(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == FALLBACK_LABEL {
            RuleUsed::Fallback
        } else {
            RuleUsed::Rule(RuleId(raw.to_string()))
        }
    }
}

impl Serialize for RuleUsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuleUsed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RuleUsed::from_label(&raw))
    }
}

/// Output of one commission evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionResult {
    pub commission_amount: Decimal,
    pub commission_rate: Decimal,
    pub cashback_amount: Decimal,
    pub rule_used: RuleUsed,
    pub settings_snapshot: SettingsSnapshot,
}
