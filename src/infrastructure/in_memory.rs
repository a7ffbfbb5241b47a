use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::REFERENCE_SEED;
use crate::domain::permit::{Mtop, Permit, PermitId, MTOP_MAX};
use crate::domain::ports::RegistryStore;
use crate::domain::transaction::{
    PendingTransaction, ReferenceNumber, TransactionId, TransactionKind,
};
use crate::error::{RegistryError, Result};

#[derive(Default)]
struct RegistryInner {
    permits: HashMap<PermitId, Permit>,
    pending: HashMap<TransactionId, PendingTransaction>,
}

/// A thread-safe in-memory registry holding both collections behind one
/// `Arc<RwLock<…>>`.
///
/// Every batch write (`stage`, `settle`, `unstage`) holds the write lock
/// for its whole duration, which gives the atomic multi-record commit
/// the lifecycle transitions require and makes the active-MTOP
/// uniqueness check race-free: two concurrent new issues for the same
/// MTOP serialize on the lock and exactly one wins.
#[derive(Clone)]
pub struct InMemoryRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    reference_seed: u32,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_seed(REFERENCE_SEED)
    }

    pub fn with_seed(reference_seed: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            reference_seed,
        }
    }
}

impl RegistryInner {
    fn next_reference(&self, seed: u32) -> ReferenceNumber {
        self.pending
            .values()
            .map(|tx| tx.reference_number)
            .max()
            .map(|reference| reference.next())
            .unwrap_or(ReferenceNumber(seed))
    }

    fn mtop_taken(&self, mtop: Mtop) -> bool {
        let held_active = self
            .permits
            .values()
            .any(|permit| permit.is_active() && permit.mtop == mtop);
        let held_staged = self
            .pending
            .values()
            .any(|tx| tx.is_open() && tx.mtop == mtop);
        held_active || held_staged
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistry {
    async fn permit(&self, id: PermitId) -> Result<Option<Permit>> {
        let inner = self.inner.read().await;
        Ok(inner.permits.get(&id).cloned())
    }

    async fn active_by_mtop(&self, mtop: Mtop) -> Result<Option<Permit>> {
        let inner = self.inner.read().await;
        Ok(inner
            .permits
            .values()
            .find(|permit| permit.is_active() && permit.mtop == mtop)
            .cloned())
    }

    async fn active_permits(&self) -> Result<Vec<Permit>> {
        let inner = self.inner.read().await;
        let mut permits: Vec<Permit> = inner
            .permits
            .values()
            .filter(|permit| permit.is_active())
            .cloned()
            .collect();
        permits.sort_by_key(|permit| permit.mtop);
        Ok(permits)
    }

    async fn archived_permits(&self) -> Result<Vec<Permit>> {
        let inner = self.inner.read().await;
        let mut permits: Vec<Permit> = inner
            .permits
            .values()
            .filter(|permit| !permit.is_active())
            .cloned()
            .collect();
        // Most recently archived first.
        permits.sort_by_key(|permit| {
            std::cmp::Reverse(permit.archival.as_ref().map(|archival| archival.at))
        });
        Ok(permits)
    }

    async fn pending(&self, id: TransactionId) -> Result<Option<PendingTransaction>> {
        let inner = self.inner.read().await;
        Ok(inner.pending.get(&id).cloned())
    }

    async fn open_pending(&self) -> Result<Vec<PendingTransaction>> {
        let inner = self.inner.read().await;
        let mut open: Vec<PendingTransaction> = inner
            .pending
            .values()
            .filter(|tx| tx.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|tx| tx.reference_number);
        Ok(open)
    }

    async fn settled_pending(&self) -> Result<Vec<PendingTransaction>> {
        let inner = self.inner.read().await;
        let mut settled: Vec<PendingTransaction> = inner
            .pending
            .values()
            .filter(|tx| tx.settled)
            .cloned()
            .collect();
        settled.sort_by_key(|tx| std::cmp::Reverse(tx.reference_number));
        Ok(settled)
    }

    async fn available_mtops(&self) -> Result<Vec<Mtop>> {
        let inner = self.inner.read().await;
        Ok((1..=MTOP_MAX)
            .filter_map(|value| Mtop::new(value).ok())
            .filter(|mtop| !inner.mtop_taken(*mtop))
            .collect())
    }

    async fn stage(
        &self,
        mut tx: PendingTransaction,
        source: Option<Permit>,
    ) -> Result<ReferenceNumber> {
        let mut inner = self.inner.write().await;
        if tx.kind == TransactionKind::NewIssue && inner.mtop_taken(tx.mtop) {
            return Err(RegistryError::DuplicateMtop(tx.mtop));
        }
        if let Some(linked) = tx.linked_permit {
            let already_pending = inner
                .permits
                .get(&linked)
                .is_some_and(|stored| stored.pending);
            if already_pending {
                return Err(RegistryError::Validation(format!(
                    "franchise {linked} already has an open pending transaction"
                )));
            }
        }
        let reference = inner.next_reference(self.reference_seed);
        tx.reference_number = reference;
        inner.pending.insert(tx.id, tx);
        if let Some(permit) = source {
            inner.permits.insert(permit.id, permit);
        }
        Ok(reference)
    }

    async fn settle(&self, tx: PendingTransaction, upserts: Vec<Permit>) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.pending.get(&tx.id) {
            None => {
                return Err(RegistryError::NotFound(format!(
                    "pending transaction {}",
                    tx.id
                )));
            }
            Some(stored) if stored.settled => {
                return Err(RegistryError::Validation(format!(
                    "transaction {} has already been settled",
                    tx.id
                )));
            }
            Some(_) => {}
        }
        inner.pending.insert(tx.id, tx);
        for permit in upserts {
            inner.permits.insert(permit.id, permit);
        }
        Ok(())
    }

    async fn unstage(&self, id: TransactionId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(tx) = inner.pending.remove(&id) else {
            return Ok(());
        };
        if let Some(linked) = tx.linked_permit {
            if let Some(permit) = inner.permits.get_mut(&linked) {
                permit.pending = false;
                permit.display_schedule = None;
            }
        }
        Ok(())
    }

    async fn update_permit(&self, permit: Permit) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.permits.insert(permit.id, permit);
        Ok(())
    }
}
