use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::store::SaleId;

/// Hands out one mutex per sale id so concurrent workers never write the same sale at once.
#[derive(Debug, Default)]
pub(crate) struct SaleLocks {
    inner: Mutex<HashMap<SaleId, Arc<Mutex<()>>>>,
}

#[derive(Debug, thiserror::Error)]
#[error("write lock poisoned for sale {0}")]
pub(crate) struct LockPoisoned(pub SaleId);

impl SaleLocks {
    pub(crate) fn lock_for(&self, id: &SaleId) -> Result<Arc<Mutex<()>>, LockPoisoned> {
        let mut registry = self
            .inner
            .lock()
            .map_err(|_| LockPoisoned(id.clone()))?;
        Ok(registry
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }
}

pub(crate) fn acquire<'a>(
    lock: &'a Mutex<()>,
    id: &SaleId,
) -> Result<MutexGuard<'a, ()>, LockPoisoned> {
    lock.lock().map_err(|_| LockPoisoned(id.clone()))
}
