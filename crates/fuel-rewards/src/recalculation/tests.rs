use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::*;
use crate::commission::{
    AuditError, CommissionResult, CommissionRule, CommissionSettings, RuleConditions, RuleId,
    RuleType, RuleUsed, Tier,
};
use crate::config::RecalculationConfig;

#[derive(Default)]
struct MemorySales {
    sales: Mutex<BTreeMap<SaleId, SaleRecord>>,
    users: HashMap<UserId, UserProfile>,
    rejected: HashSet<SaleId>,
    panicking: HashSet<SaleId>,
    cancel_after: Option<(usize, CancellationFlag)>,
    writes: Mutex<Vec<SaleId>>,
}

impl MemorySales {
    fn new(sales: Vec<SaleRecord>, users: Vec<UserProfile>) -> Self {
        Self {
            sales: Mutex::new(sales.into_iter().map(|sale| (sale.id.clone(), sale)).collect()),
            users: users.into_iter().map(|user| (user.id.clone(), user)).collect(),
            ..Self::default()
        }
    }

    fn rejecting(mut self, id: &str) -> Self {
        self.rejected.insert(SaleId(id.to_string()));
        self
    }

    fn panicking_on(mut self, id: &str) -> Self {
        self.panicking.insert(SaleId(id.to_string()));
        self
    }

    fn cancelling_after(mut self, writes: usize, cancel: &CancellationFlag) -> Self {
        self.cancel_after = Some((writes, cancel.clone()));
        self
    }

    fn sale(&self, id: &str) -> SaleRecord {
        self.sales
            .lock()
            .expect("sales mutex poisoned")
            .get(&SaleId(id.to_string()))
            .cloned()
            .expect("sale exists")
    }

    fn write_count(&self) -> usize {
        self.writes.lock().expect("writes mutex poisoned").len()
    }
}

impl SaleStore for MemorySales {
    fn commissioned_sales(&self) -> Result<Vec<SaleRecord>, PersistenceError> {
        Ok(self
            .sales
            .lock()
            .expect("sales mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn user(&self, id: &UserId) -> Result<Option<UserProfile>, PersistenceError> {
        Ok(self.users.get(id).cloned())
    }

    fn write_commission(
        &self,
        id: &SaleId,
        result: &CommissionResult,
    ) -> Result<(), PersistenceError> {
        if self.rejected.contains(id) {
            return Err(PersistenceError::WriteRejected {
                sale_id: id.clone(),
                reason: "row locked by another writer".to_string(),
            });
        }
        if self.panicking.contains(id) {
            panic!("storage driver crashed on {id}");
        }
        let mut sales = self.sales.lock().expect("sales mutex poisoned");
        let sale = sales
            .get_mut(id)
            .ok_or_else(|| PersistenceError::SaleNotFound(id.clone()))?;
        sale.apply(result);
        let mut writes = self.writes.lock().expect("writes mutex poisoned");
        writes.push(id.clone());
        if let Some((limit, cancel)) = &self.cancel_after {
            if writes.len() == *limit {
                cancel.cancel();
            }
        }
        Ok(())
    }
}

struct UnavailableSales;

impl SaleStore for UnavailableSales {
    fn commissioned_sales(&self) -> Result<Vec<SaleRecord>, PersistenceError> {
        Err(PersistenceError::Unavailable("replica lagging".to_string()))
    }

    fn user(&self, _id: &UserId) -> Result<Option<UserProfile>, PersistenceError> {
        Err(PersistenceError::Unavailable("replica lagging".to_string()))
    }

    fn write_commission(
        &self,
        id: &SaleId,
        _result: &CommissionResult,
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::SaleNotFound(id.clone()))
    }
}

#[derive(Default)]
struct FixedRules(Vec<CommissionRule>);

impl RuleRepository for FixedRules {
    fn insert(&self, rule: CommissionRule) -> Result<CommissionRule, RepositoryError> {
        Ok(rule)
    }

    fn update(&self, _rule: CommissionRule) -> Result<(), RepositoryError> {
        Ok(())
    }

    fn delete(&self, _id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        Ok(None)
    }

    fn fetch(&self, id: &RuleId) -> Result<Option<CommissionRule>, RepositoryError> {
        Ok(self.0.iter().find(|rule| &rule.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<CommissionRule>, RepositoryError> {
        Ok(self.0.clone())
    }
}

struct FixedSettings(Option<CommissionSettings>);

impl SettingsProvider for FixedSettings {
    fn current(&self) -> Result<Option<CommissionSettings>, RepositoryError> {
        Ok(self.0.clone())
    }

    fn replace(&self, _settings: CommissionSettings) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }
}

#[derive(Default)]
struct RecordingAudit(Mutex<Vec<AuditRecord>>);

impl AuditSink for RecordingAudit {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.0.lock().expect("audit mutex poisoned").push(record);
        Ok(())
    }
}

fn settings() -> CommissionSettings {
    CommissionSettings {
        base_commission_rate: dec!(5),
        tier_multipliers: BTreeMap::from([(Tier::Gold, dec!(1.5)), (Tier::Silver, dec!(1.2))]),
        commission_cap: None,
        cashback_rate: dec!(0.5),
        version: 7,
        updated_at: Utc
            .with_ymd_and_hms(2025, 4, 2, 9, 0, 0)
            .single()
            .expect("valid timestamp"),
    }
}

fn silver_rule() -> CommissionRule {
    let created = Utc
        .with_ymd_and_hms(2025, 4, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    CommissionRule {
        id: RuleId("silver-flat".to_string()),
        name: "Silver flat".to_string(),
        description: String::new(),
        rate: dec!(12),
        rule_type: RuleType::Fixed,
        priority: 50,
        conditions: RuleConditions {
            tier_restrictions: [Tier::Silver].into_iter().collect(),
            ..RuleConditions::default()
        },
        is_active: true,
        created_at: created,
        updated_at: created,
    }
}

fn user(id: &str, tier: Tier) -> UserProfile {
    UserProfile {
        id: UserId(id.to_string()),
        tier,
        sales_count: None,
        network_size: None,
        growth_rate: None,
    }
}

fn stale_commission() -> Option<SaleCommission> {
    Some(SaleCommission {
        amount: dec!(1),
        rate: dec!(0.1),
        rule_used: RuleUsed::Fallback,
    })
}

fn sale(id: &str, user_id: &str, total: Decimal, liters: Option<Decimal>) -> SaleRecord {
    SaleRecord {
        id: SaleId(id.to_string()),
        user_id: UserId(user_id.to_string()),
        total_amount: total,
        liters,
        commission: stale_commission(),
        cashback_earned: Some(dec!(0.5)),
        settings_snapshot: Some("settings-v1".to_string()),
    }
}

fn job<S: SaleStore + 'static>(
    store: Arc<S>,
    settings: Option<CommissionSettings>,
    workers: usize,
) -> (
    RecalculationJob<S, FixedRules, FixedSettings, RecordingAudit>,
    Arc<RecordingAudit>,
) {
    let audit = Arc::new(RecordingAudit::default());
    let job = RecalculationJob::new(
        store,
        Arc::new(FixedRules(vec![silver_rule()])),
        Arc::new(FixedSettings(settings)),
        Arc::clone(&audit),
        RecalculationConfig {
            workers,
            actor: "nightly-job".to_string(),
        },
    );
    (job, audit)
}

fn mixed_store() -> MemorySales {
    MemorySales::new(
        vec![
            sale("s-1", "gold-user", dec!(1000), Some(dec!(50))),
            sale("s-2", "silver-user", dec!(300), Some(dec!(10))),
            sale("s-3", "ghost", dec!(40), Some(dec!(2))),
            sale("s-4", "gold-user", dec!(80), None),
            SaleRecord {
                commission: None,
                ..sale("s-5", "gold-user", dec!(20), Some(dec!(1)))
            },
        ],
        vec![user("gold-user", Tier::Gold), user("silver-user", Tier::Silver)],
    )
}

#[tokio::test]
async fn classifies_every_sale_and_rewrites_commission() {
    let store = Arc::new(mixed_store());
    let (job, _audit) = job(Arc::clone(&store), Some(settings()), 3);

    let summary = job
        .run(&CancellationFlag::new())
        .await
        .expect("run completes");

    assert_eq!(summary.total, 5);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.errored, 0);
    assert_eq!(summary.processed(), summary.total);
    assert_eq!(summary.rules_loaded, 1);
    assert!(!summary.cancelled);

    let gold = store.sale("s-1");
    let commission = gold.commission.expect("commission rewritten");
    assert_eq!(commission.amount, dec!(75.00));
    assert_eq!(commission.rule_used, RuleUsed::Fallback);
    assert_eq!(gold.cashback_earned, Some(dec!(37.50)));
    assert_eq!(gold.settings_snapshot.as_deref(), Some("settings-v7"));

    let silver = store.sale("s-2");
    let commission = silver.commission.expect("commission rewritten");
    assert_eq!(commission.amount, dec!(12.00));
    assert_eq!(
        commission.rule_used,
        RuleUsed::Rule(RuleId("silver-flat".to_string()))
    );

    let untouched = store.sale("s-4");
    assert_eq!(untouched.commission, stale_commission());
    assert_eq!(untouched.settings_snapshot.as_deref(), Some("settings-v1"));
}

#[tokio::test]
async fn one_failed_write_does_not_stop_the_batch() {
    let store = Arc::new(mixed_store().rejecting("s-1"));
    let (job, _audit) = job(Arc::clone(&store), Some(settings()), 2);

    let summary = job
        .run(&CancellationFlag::new())
        .await
        .expect("run completes");

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errored, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].sale_id, Some(SaleId("s-1".to_string())));
    assert!(summary.failures[0].reason.contains("row locked"));
    assert_eq!(store.sale("s-2").settings_snapshot.as_deref(), Some("settings-v7"));
}

#[tokio::test]
async fn missing_settings_abort_before_any_write() {
    let store = Arc::new(mixed_store());
    let (job, audit) = job(Arc::clone(&store), None, 2);

    let err = job
        .run(&CancellationFlag::new())
        .await
        .expect_err("settings are required");

    assert!(matches!(err, RecalculationError::SettingsMissing));
    assert_eq!(store.write_count(), 0);
    assert!(audit.0.lock().expect("audit mutex poisoned").is_empty());
}

#[tokio::test]
async fn unavailable_sales_abort_the_run() {
    let (job, _audit) = job(Arc::new(UnavailableSales), Some(settings()), 2);

    let err = job
        .run(&CancellationFlag::new())
        .await
        .expect_err("sales listing fails");

    assert!(matches!(err, RecalculationError::SalesUnavailable(_)));
}

#[tokio::test]
async fn cancelled_run_processes_nothing() {
    let store = Arc::new(mixed_store());
    let (job, _audit) = job(Arc::clone(&store), Some(settings()), 2);
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let summary = job.run(&cancel).await.expect("run completes");

    assert!(summary.cancelled);
    assert_eq!(summary.processed(), 0);
    assert_eq!(summary.total, 5);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn cancelling_mid_run_keeps_completed_writes() {
    let cancel = CancellationFlag::new();
    let store = Arc::new(
        MemorySales::new(
            (1..=5)
                .map(|n| sale(&format!("s-{n}"), "gold-user", dec!(1000), Some(dec!(50))))
                .collect(),
            vec![user("gold-user", Tier::Gold)],
        )
        .cancelling_after(2, &cancel),
    );
    let (job, _audit) = job(Arc::clone(&store), Some(settings()), 1);

    let summary = job.run(&cancel).await.expect("run completes");

    assert!(summary.cancelled);
    assert_eq!(summary.total, 5);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.processed(), 2);
    assert_eq!(store.write_count(), 2);

    for id in ["s-1", "s-2"] {
        let rewritten = store.sale(id);
        let commission = rewritten.commission.expect("commission rewritten");
        assert_eq!(commission.amount, dec!(75.00));
        assert_eq!(rewritten.cashback_earned, Some(dec!(37.50)));
        assert_eq!(rewritten.settings_snapshot.as_deref(), Some("settings-v7"));
    }
    for id in ["s-3", "s-4", "s-5"] {
        let untouched = store.sale(id);
        assert_eq!(untouched.commission, stale_commission());
        assert_eq!(untouched.cashback_earned, Some(dec!(0.5)));
        assert_eq!(untouched.settings_snapshot.as_deref(), Some("settings-v1"));
    }
}

#[tokio::test]
async fn panicking_write_is_reported_against_its_sale() {
    let store = Arc::new(mixed_store().panicking_on("s-2"));
    let (job, _audit) = job(Arc::clone(&store), Some(settings()), 2);

    let summary = job
        .run(&CancellationFlag::new())
        .await
        .expect("run completes");

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errored, 1);
    assert_eq!(summary.failures[0].sale_id, Some(SaleId("s-2".to_string())));
    assert!(summary.failures[0].reason.contains("storage driver crashed"));
    assert_eq!(store.sale("s-1").settings_snapshot.as_deref(), Some("settings-v7"));
}

#[tokio::test]
async fn overflowing_sale_is_isolated() {
    let store = Arc::new(MemorySales::new(
        vec![
            sale("s-1", "gold-user", dec!(1000), Some(dec!(50))),
            sale("s-2", "gold-user", Decimal::MAX, Some(dec!(1))),
        ],
        vec![user("gold-user", Tier::Gold)],
    ));
    let (job, _audit) = job(Arc::clone(&store), Some(settings()), 2);

    let summary = job
        .run(&CancellationFlag::new())
        .await
        .expect("run completes");

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errored, 1);
    assert_eq!(summary.failures[0].sale_id, Some(SaleId("s-2".to_string())));
    assert!(summary.failures[0].reason.contains("exceeds"));
    assert_eq!(store.sale("s-2").commission, stale_commission());
}

#[tokio::test]
async fn rerunning_with_same_inputs_is_idempotent() {
    let store = Arc::new(mixed_store());
    let (job, _audit) = job(Arc::clone(&store), Some(settings()), 4);

    job.run(&CancellationFlag::new())
        .await
        .expect("first run completes");
    let first: Vec<SaleRecord> = store.commissioned_sales().expect("sales listed");

    job.run(&CancellationFlag::new())
        .await
        .expect("second run completes");
    let second: Vec<SaleRecord> = store.commissioned_sales().expect("sales listed");

    assert_eq!(first, second);
}

#[tokio::test]
async fn single_worker_produces_same_results_as_many() {
    let serial = Arc::new(mixed_store());
    let parallel = Arc::new(mixed_store());
    let (serial_job, _) = job(Arc::clone(&serial), Some(settings()), 1);
    let (parallel_job, _) = job(Arc::clone(&parallel), Some(settings()), 8);

    let serial_summary = serial_job
        .run(&CancellationFlag::new())
        .await
        .expect("serial run completes");
    let parallel_summary = parallel_job
        .run(&CancellationFlag::new())
        .await
        .expect("parallel run completes");

    assert_eq!(serial_summary, parallel_summary);
    assert_eq!(
        serial.commissioned_sales().expect("sales listed"),
        parallel.commissioned_sales().expect("sales listed")
    );
}

#[tokio::test]
async fn run_is_recorded_in_audit_trail() {
    let store = Arc::new(mixed_store());
    let (job, audit) = job(Arc::clone(&store), Some(settings()), 2);

    job.run(&CancellationFlag::new())
        .await
        .expect("run completes");

    let records = audit.0.lock().expect("audit mutex poisoned").clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor, "nightly-job");
    assert_eq!(records[0].action, AuditAction::RecalculationRun);
    assert_eq!(records[0].subject, "settings-v7");
    assert_eq!(
        records[0]
            .after
            .as_ref()
            .and_then(|after| after["updated"].as_u64()),
        Some(2)
    );
}
