use chrono::Utc;
use fuel_rewards::commission::{
    AuditError, AuditRecord, AuditSink, CommissionResult, CommissionRule, CommissionRuleService,
    CommissionSettings, RepositoryError, RuleId, RuleRepository, SettingsProvider, Tier,
};
use fuel_rewards::config::{RecalculationConfig, SeedConfig};
use fuel_rewards::error::AppError;
use fuel_rewards::import;
use fuel_rewards::recalculation::{
    PersistenceError, RecalculationJob, SaleId, SaleRecord, SaleStore, UserId, UserProfile,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

const SEED_ACTOR: &str = "seed";

pub(crate) type CommissionService =
    CommissionRuleService<InMemoryRuleRepository, InMemorySettings, InMemoryAuditLog>;

pub(crate) type InMemoryRecalculationJob = RecalculationJob<
    InMemorySaleStore,
    InMemoryRuleRepository,
    InMemorySettings,
    InMemoryAuditLog,
>;

/// In-memory adapters wired to one commission service.
#[derive(Clone)]
pub(crate) struct Backend {
    pub(crate) rules: Arc<InMemoryRuleRepository>,
    pub(crate) settings: Arc<InMemorySettings>,
    pub(crate) sales: Arc<InMemorySaleStore>,
    pub(crate) audit: Arc<InMemoryAuditLog>,
    pub(crate) service: Arc<CommissionService>,
}

impl Backend {
    pub(crate) fn new() -> Self {
        let rules = Arc::new(InMemoryRuleRepository::default());
        let settings = Arc::new(InMemorySettings::default());
        let audit = Arc::new(InMemoryAuditLog::default());
        let service = Arc::new(CommissionRuleService::new(
            Arc::clone(&rules),
            Arc::clone(&settings),
            Arc::clone(&audit),
        ));

        Self {
            rules,
            settings,
            sales: Arc::new(InMemorySaleStore::default()),
            audit,
            service,
        }
    }

    /// Load settings (or the built-in defaults) and rule drafts through the service so seeded
    /// data passes the same validation as API input.
    pub(crate) fn seeded(seed: &SeedConfig) -> Result<Self, AppError> {
        let backend = Self::new();

        let settings = match &seed.settings_path {
            Some(path) => import::load_settings(path)?,
            None => default_settings(),
        };
        backend.service.replace_settings(SEED_ACTOR, settings)?;

        if let Some(path) = &seed.rules_path {
            let drafts = import::load_rule_drafts(path)?;
            let count = drafts.len();
            for draft in drafts {
                backend.service.create(SEED_ACTOR, draft)?;
            }
            info!(count, path = %path.display(), "commission rules seeded");
        }

        Ok(backend)
    }

    pub(crate) fn recalculation_job(&self, config: RecalculationConfig) -> InMemoryRecalculationJob {
        RecalculationJob::new(
            Arc::clone(&self.sales),
            Arc::clone(&self.rules),
            Arc::clone(&self.settings),
            Arc::clone(&self.audit),
            config,
        )
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRuleRepository {
    records: Arc<Mutex<HashMap<RuleId, CommissionRule>>>,
}

impl RuleRepository for InMemoryRuleRepository {
    fn insert(&self, rule: CommissionRule) -> Result<CommissionRule, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&rule.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    fn update(&self, rule: CommissionRule) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&rule.id) {
            guard.insert(rule.id.clone(), rule);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn delete(&self, id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.remove(id))
    }

    fn fetch(&self, id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<CommissionRule>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySettings {
    current: Arc<Mutex<Option<CommissionSettings>>>,
}

impl SettingsProvider for InMemorySettings {
    fn current(&self) -> Result<Option<CommissionSettings>, RepositoryError> {
        let guard = self.current.lock().expect("settings mutex poisoned");
        Ok(guard.clone())
    }

    fn replace(&self, settings: CommissionSettings) -> Result<(), RepositoryError> {
        let mut guard = self.current.lock().expect("settings mutex poisoned");
        *guard = Some(settings);
        Ok(())
    }
}

/// Sales and users held in memory; commission writes update the stored sale in place.
#[derive(Default, Clone)]
pub(crate) struct InMemorySaleStore {
    sales: Arc<Mutex<BTreeMap<SaleId, SaleRecord>>>,
    users: Arc<Mutex<HashMap<UserId, UserProfile>>>,
}

impl InMemorySaleStore {
    pub(crate) fn load(&self, sales: Vec<SaleRecord>, users: Vec<UserProfile>) {
        let mut sale_guard = self.sales.lock().expect("sales mutex poisoned");
        sale_guard.extend(sales.into_iter().map(|sale| (sale.id.clone(), sale)));
        let mut user_guard = self.users.lock().expect("users mutex poisoned");
        user_guard.extend(users.into_iter().map(|user| (user.id.clone(), user)));
    }

    /// Every stored sale in id order, commissioned or not.
    pub(crate) fn sales(&self) -> Vec<SaleRecord> {
        let guard = self.sales.lock().expect("sales mutex poisoned");
        guard.values().cloned().collect()
    }
}

impl SaleStore for InMemorySaleStore {
    fn commissioned_sales(&self) -> Result<Vec<SaleRecord>, PersistenceError> {
        let guard = self.sales.lock().expect("sales mutex poisoned");
        Ok(guard
            .values()
            .filter(|sale| sale.commission.is_some())
            .cloned()
            .collect())
    }

    fn user(&self, id: &UserId) -> Result<Option<UserProfile>, PersistenceError> {
        let guard = self.users.lock().expect("users mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn write_commission(
        &self,
        id: &SaleId,
        result: &CommissionResult,
    ) -> Result<(), PersistenceError> {
        let mut guard = self.sales.lock().expect("sales mutex poisoned");
        let sale = guard
            .get_mut(id)
            .ok_or_else(|| PersistenceError::SaleNotFound(id.clone()))?;
        sale.apply(result);
        Ok(())
    }
}

/// Audit sink that logs every record and keeps it for inspection.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        info!(
            actor = %record.actor,
            action = ?record.action,
            subject = %record.subject,
            "audit record appended"
        );
        let mut guard = self.records.lock().expect("audit mutex poisoned");
        guard.push(record);
        Ok(())
    }
}

#[cfg(test)]
impl InMemoryAuditLog {
    pub(crate) fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit mutex poisoned").clone()
    }
}

/// Settings used when no seed file is configured.
pub(crate) fn default_settings() -> CommissionSettings {
    let tier_multipliers = BTreeMap::from([
        (Tier::Lead, Decimal::ONE),
        (Tier::Bronze, Decimal::ONE),
        (Tier::Silver, Decimal::new(11, 1)),
        (Tier::Gold, Decimal::new(125, 2)),
        (Tier::Platinum, Decimal::new(15, 1)),
    ]);

    CommissionSettings {
        base_commission_rate: Decimal::new(5, 0),
        tier_multipliers,
        commission_cap: None,
        cashback_rate: Decimal::new(10, 2),
        version: 1,
        updated_at: Utc::now(),
    }
}
