use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::commission::domain::{
    CommissionRule, CommissionSettings, RuleConditions, RuleDraft, RuleId, RuleType, SaleContext,
    SettingsSnapshot, Tier,
};
use crate::commission::evaluation::{CommissionEngine, RuleSet};
use crate::commission::repository::{
    AuditError, AuditRecord, AuditSink, RepositoryError, RuleRepository, SettingsProvider,
};
use crate::commission::{commission_router, CommissionRuleService};

pub(super) fn created(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, minute, 0)
        .single()
        .expect("valid timestamp")
}

/// Settings from the reference gold-tier scenario: 5% base, gold 1.5x, cap 1000, 0.5 per liter.
pub(super) fn settings() -> CommissionSettings {
    let mut tier_multipliers = BTreeMap::new();
    tier_multipliers.insert(Tier::Silver, dec!(1.2));
    tier_multipliers.insert(Tier::Gold, dec!(1.5));
    tier_multipliers.insert(Tier::Platinum, dec!(2));

    CommissionSettings {
        base_commission_rate: dec!(5),
        tier_multipliers,
        commission_cap: Some(dec!(1000)),
        cashback_rate: dec!(0.5),
        version: 3,
        updated_at: created(0),
    }
}

pub(super) fn snapshot() -> SettingsSnapshot {
    SettingsSnapshot::capture(&settings(), created(30))
}

pub(super) fn rule(id: &str, rule_type: RuleType, rate: Decimal, priority: u8) -> CommissionRule {
    CommissionRule {
        id: RuleId(id.to_string()),
        name: format!("{id} rule"),
        description: String::new(),
        rate,
        rule_type,
        priority,
        conditions: RuleConditions::default(),
        is_active: true,
        created_at: created(1),
        updated_at: created(1),
    }
}

pub(super) fn restricted_to(mut rule: CommissionRule, tiers: &[Tier]) -> CommissionRule {
    rule.conditions.tier_restrictions = tiers.iter().copied().collect::<BTreeSet<_>>();
    rule
}

pub(super) fn gold_sale(total_amount: Decimal, liters: Decimal) -> SaleContext {
    SaleContext::new(total_amount, liters, Tier::Gold)
}

pub(super) fn engine_with(rules: Vec<CommissionRule>) -> CommissionEngine {
    CommissionEngine::new(snapshot(), RuleSet::new(rules))
}

pub(super) fn draft(name: &str, rule_type: &str, rate: Decimal, priority: i64) -> RuleDraft {
    RuleDraft {
        name: name.to_string(),
        description: format!("{name} description"),
        rate,
        rule_type: rule_type.to_string(),
        priority,
        conditions: RuleConditions::default(),
        is_active: true,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRules {
    pub(super) records: Arc<Mutex<HashMap<RuleId, CommissionRule>>>,
}

impl RuleRepository for MemoryRules {
    fn insert(&self, rule: CommissionRule) -> Result<CommissionRule, RepositoryError> {
        let mut guard = self.records.lock().expect("rules mutex poisoned");
        if guard.contains_key(&rule.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    fn update(&self, rule: CommissionRule) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("rules mutex poisoned");
        match guard.get_mut(&rule.id) {
            Some(existing) => {
                *existing = rule;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete(&self, id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("rules mutex poisoned")
            .remove(id))
    }

    fn fetch(&self, id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("rules mutex poisoned")
            .get(id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<CommissionRule>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("rules mutex poisoned")
            .values()
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemorySettings {
    current: Arc<Mutex<Option<CommissionSettings>>>,
}

impl MemorySettings {
    pub(super) fn with(settings: CommissionSettings) -> Self {
        Self {
            current: Arc::new(Mutex::new(Some(settings))),
        }
    }
}

impl SettingsProvider for MemorySettings {
    fn current(&self) -> Result<Option<CommissionSettings>, RepositoryError> {
        Ok(self.current.lock().expect("settings mutex poisoned").clone())
    }

    fn replace(&self, settings: CommissionSettings) -> Result<(), RepositoryError> {
        *self.current.lock().expect("settings mutex poisoned") = Some(settings);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAudit {
    pub(super) fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for MemoryAudit {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .expect("audit mutex poisoned")
            .push(record);
        Ok(())
    }
}

pub(super) struct BrokenAudit;

impl AuditSink for BrokenAudit {
    fn append(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Transport("audit queue full".to_string()))
    }
}

pub(super) struct UnavailableRules;

impl RuleRepository for UnavailableRules {
    fn insert(&self, _rule: CommissionRule) -> Result<CommissionRule, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _rule: CommissionRule) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<CommissionRule>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) type MemoryService = CommissionRuleService<MemoryRules, MemorySettings, MemoryAudit>;

pub(super) fn build_service() -> (MemoryService, Arc<MemoryRules>, Arc<MemoryAudit>) {
    let rules = Arc::new(MemoryRules::default());
    let audit = Arc::new(MemoryAudit::default());
    let service = CommissionRuleService::new(
        rules.clone(),
        Arc::new(MemorySettings::with(settings())),
        audit.clone(),
    );
    (service, rules, audit)
}

pub(super) fn router_with_service(service: MemoryService) -> axum::Router {
    commission_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
