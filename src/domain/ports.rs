use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::permit::{Mtop, Permit, PermitId};
use crate::domain::transaction::{PendingTransaction, ReferenceNumber, TransactionId};
use crate::error::Result;

pub type RegistryStoreBox = Box<dyn RegistryStore>;
pub type AuditSinkBox = Box<dyn AuditSink>;

/// Durable storage for the two registry collections: committed permits
/// and the pending-transaction staging area.
///
/// The write methods (`stage`, `settle`, `unstage`, `update_permit`) are
/// atomic multi-record commits: either every record they name becomes
/// visible, or none do. `stage` also owns the active-MTOP uniqueness
/// constraint, closing the check-then-insert race inside the store's own
/// critical section rather than in application code.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn permit(&self, id: PermitId) -> Result<Option<Permit>>;
    async fn active_by_mtop(&self, mtop: Mtop) -> Result<Option<Permit>>;
    async fn active_permits(&self) -> Result<Vec<Permit>>;
    async fn archived_permits(&self) -> Result<Vec<Permit>>;

    async fn pending(&self, id: TransactionId) -> Result<Option<PendingTransaction>>;
    async fn open_pending(&self) -> Result<Vec<PendingTransaction>>;
    async fn settled_pending(&self) -> Result<Vec<PendingTransaction>>;

    /// MTOP numbers not held by any active permit or open transaction.
    async fn available_mtops(&self) -> Result<Vec<Mtop>>;

    /// Atomically allocates the next reference number, enforces the
    /// active-MTOP uniqueness constraint for new issues, rejects staging
    /// against a source permit whose stored record is already pending,
    /// writes the transaction, and applies the updated source permit when
    /// given one. The transaction's `reference_number` field is
    /// overwritten with the allocated value, which is also returned.
    async fn stage(
        &self,
        tx: PendingTransaction,
        source: Option<Permit>,
    ) -> Result<ReferenceNumber>;

    /// Atomically marks the transaction settled and upserts the given
    /// permits (creations, in-place overwrites, and archivals alike).
    /// Fails if the stored transaction is absent or already settled, so
    /// that concurrent commits for one transaction resolve to a single
    /// winner inside the store's critical section.
    async fn settle(&self, tx: PendingTransaction, upserts: Vec<Permit>) -> Result<()>;

    /// Deletes a staged transaction and restores its linked permit (if
    /// any) to pending=false with its display schedule cleared. The
    /// restore state is derived from the stored records inside the same
    /// critical section. Deleting an absent transaction is a no-op.
    async fn unstage(&self, id: TransactionId) -> Result<()>;

    async fn update_permit(&self, permit: Permit) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Ok,
    Failed,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub performed_by: String,
    pub target: String,
    pub module: String,
    pub source_addr: String,
    pub status: AuditStatus,
}

/// Append-only action log. Calls are fire-and-forget at every call site:
/// a failure here is logged locally and never reaches the caller or
/// rolls back the primary transition.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
}
