//! Batch recomputation of commission and cashback over historical sales.
//!
//! One settings snapshot and one rule set are loaded before the first sale is touched and shared
//! by every worker, so the whole run is priced with the same rates. Sales are processed on a
//! bounded pool of blocking workers; a failing sale is counted and logged without affecting the
//! others.

mod locks;
pub mod store;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::commission::{
    AuditAction, AuditRecord, AuditSink, CommissionEngine, RepositoryError, RuleRepository,
    RuleSet, SettingsProvider, SettingsSnapshot,
};
use crate::config::RecalculationConfig;
use locks::{acquire, SaleLocks};
pub use store::{
    PersistenceError, SaleCommission, SaleId, SaleRecord, SaleStore, UserId, UserProfile,
};

/// Cooperative stop signal checked between sales.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why a sale was left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    NoCommission,
    MissingUser { user_id: UserId },
    MissingLiters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<SaleId>,
    pub reason: String,
}

/// Classification of one processed sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Updated(SaleId),
    Skipped { sale_id: SaleId, reason: SkipReason },
    Errored(ItemFailure),
}

/// End-of-run report, produced even when every sale failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecalculationSummary {
    pub snapshot_reference: String,
    pub rules_loaded: usize,
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errored: usize,
    pub cancelled: bool,
    pub failures: Vec<ItemFailure>,
}

impl RecalculationSummary {
    fn new(snapshot_reference: String, rules_loaded: usize, total: usize) -> Self {
        Self {
            snapshot_reference,
            rules_loaded,
            total,
            updated: 0,
            skipped: 0,
            errored: 0,
            cancelled: false,
            failures: Vec::new(),
        }
    }

    fn record(mut self, outcome: ItemOutcome) -> Self {
        match outcome {
            ItemOutcome::Updated(_) => self.updated += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Errored(failure) => {
                self.errored += 1;
                self.failures.push(failure);
            }
        }
        self
    }

    pub fn processed(&self) -> usize {
        self.updated + self.skipped + self.errored
    }
}

/// Failures that abort the run before any sale is processed.
#[derive(Debug, thiserror::Error)]
pub enum RecalculationError {
    #[error("commission settings could not be loaded: {0}")]
    SettingsUnavailable(#[source] RepositoryError),
    #[error("commission settings have not been configured")]
    SettingsMissing,
    #[error("commission rules could not be loaded: {0}")]
    RulesUnavailable(#[source] RepositoryError),
    #[error("commissioned sales could not be listed: {0}")]
    SalesUnavailable(#[source] PersistenceError),
    #[error("recalculation worker pool closed unexpectedly")]
    WorkerPoolClosed,
}

/// Batch driver re-deriving commission results for every commissioned sale.
pub struct RecalculationJob<S, R, P, A> {
    sales: Arc<S>,
    rules: Arc<R>,
    settings: Arc<P>,
    audit: Arc<A>,
    config: RecalculationConfig,
}

impl<S, R, P, A> RecalculationJob<S, R, P, A>
where
    S: SaleStore + 'static,
    R: RuleRepository + 'static,
    P: SettingsProvider + 'static,
    A: AuditSink + 'static,
{
    pub fn new(
        sales: Arc<S>,
        rules: Arc<R>,
        settings: Arc<P>,
        audit: Arc<A>,
        config: RecalculationConfig,
    ) -> Self {
        Self {
            sales,
            rules,
            settings,
            audit,
            config,
        }
    }

    pub async fn run(
        &self,
        cancel: &CancellationFlag,
    ) -> Result<RecalculationSummary, RecalculationError> {
        let engine = Arc::new(self.load_engine()?);
        let sales = self
            .sales
            .commissioned_sales()
            .map_err(RecalculationError::SalesUnavailable)?;

        let workers = self.config.workers.max(1);
        info!(
            snapshot = %engine.snapshot().reference,
            rules = engine.rules().len(),
            sales = sales.len(),
            workers,
            "commission recalculation started"
        );

        let mut summary = RecalculationSummary::new(
            engine.snapshot().reference.clone(),
            engine.rules().len(),
            sales.len(),
        );
        let semaphore = Arc::new(Semaphore::new(workers));
        let locks = Arc::new(SaleLocks::default());
        let mut pool = JoinSet::new();

        for sale in sales {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| RecalculationError::WorkerPoolClosed)?;
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let store = Arc::clone(&self.sales);
            let engine = Arc::clone(&engine);
            let locks = Arc::clone(&locks);
            pool.spawn_blocking(move || {
                let sale_id = sale.id.clone();
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    recalculate_sale(store.as_ref(), &engine, &locks, sale)
                }))
                .unwrap_or_else(|payload| worker_panicked(sale_id, payload.as_ref()));
                drop(permit);
                outcome
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = pool.join_next().await {
            outcomes.push(joined.unwrap_or_else(|err| {
                warn!(error = %err, "recalculation worker did not complete");
                ItemOutcome::Errored(ItemFailure {
                    sale_id: None,
                    reason: format!("worker did not complete: {err}"),
                })
            }));
        }
        let summary = outcomes
            .into_iter()
            .fold(summary, RecalculationSummary::record);

        info!(
            snapshot = %summary.snapshot_reference,
            updated = summary.updated,
            skipped = summary.skipped,
            errored = summary.errored,
            cancelled = summary.cancelled,
            "commission recalculation finished"
        );

        let record = AuditRecord::new(
            self.config.actor.clone(),
            AuditAction::RecalculationRun,
            summary.snapshot_reference.clone(),
        )
        .with_after(&summary);
        if let Err(err) = self.audit.append(record) {
            warn!(error = %err, "audit record dropped");
        }

        Ok(summary)
    }

    fn load_engine(&self) -> Result<CommissionEngine, RecalculationError> {
        let settings = self
            .settings
            .current()
            .map_err(RecalculationError::SettingsUnavailable)?
            .ok_or(RecalculationError::SettingsMissing)?;
        let snapshot = SettingsSnapshot::capture(&settings, Utc::now());
        let rules = self
            .rules
            .list()
            .map_err(RecalculationError::RulesUnavailable)?;
        Ok(CommissionEngine::new(snapshot, RuleSet::new(rules)))
    }
}

fn worker_panicked(sale_id: SaleId, payload: &(dyn Any + Send)) -> ItemOutcome {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    warn!(sale_id = %sale_id, %message, "recalculation worker panicked");
    ItemOutcome::Errored(ItemFailure {
        sale_id: Some(sale_id),
        reason: format!("worker panicked: {message}"),
    })
}

fn recalculate_sale<S>(
    store: &S,
    engine: &CommissionEngine,
    locks: &SaleLocks,
    sale: SaleRecord,
) -> ItemOutcome
where
    S: SaleStore + ?Sized,
{
    let sale_id = sale.id.clone();
    let errored = |reason: String| {
        warn!(sale_id = %sale_id, %reason, "sale recalculation failed");
        ItemOutcome::Errored(ItemFailure {
            sale_id: Some(sale_id.clone()),
            reason,
        })
    };
    let skipped = |reason: SkipReason| {
        debug!(sale_id = %sale_id, ?reason, "sale skipped");
        ItemOutcome::Skipped {
            sale_id: sale_id.clone(),
            reason,
        }
    };

    if sale.commission.is_none() {
        return skipped(SkipReason::NoCommission);
    }

    let user = match store.user(&sale.user_id) {
        Ok(Some(user)) => user,
        Ok(None) => {
            return skipped(SkipReason::MissingUser {
                user_id: sale.user_id.clone(),
            })
        }
        Err(err) => return errored(err.to_string()),
    };

    let Some(context) = user.context_for(&sale) else {
        return skipped(SkipReason::MissingLiters);
    };

    let result = match engine.evaluate(&context) {
        Ok(result) => result,
        Err(err) => return errored(err.to_string()),
    };

    let lock = match locks.lock_for(&sale.id) {
        Ok(lock) => lock,
        Err(err) => return errored(err.to_string()),
    };
    let written = match acquire(&lock, &sale.id) {
        Ok(_guard) => store.write_commission(&sale.id, &result),
        Err(err) => return errored(err.to_string()),
    };

    match written {
        Ok(()) => {
            debug!(
                sale_id = %sale.id,
                commission = %result.commission_amount,
                cashback = %result.cashback_amount,
                rule = %result.rule_used,
                "sale recalculated"
            );
            ItemOutcome::Updated(sale.id)
        }
        Err(err) => errored(err.to_string()),
    }
}
