use chrono::{Datelike, Months, NaiveDate, Utc};
use std::future::Future;

use crate::config::RegistryConfig;
use crate::domain::fees::{self, FeeSchedule, TransferChanges};
use crate::domain::permit::{
    Archival, ArchivalReason, Mtop, Permit, PermitFields, PermitId,
};
use crate::domain::ports::{
    AuditEvent, AuditSinkBox, AuditStatus, RegistryStoreBox,
};
use crate::domain::renewal;
use crate::domain::transaction::{
    PaymentReceipt, PendingTransaction, ReferenceNumber, TransactionId, TransactionKind,
};
use crate::error::{RegistryError, Result};

/// The authenticated principal performing an operation, as supplied by
/// the surrounding request-handling layer.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub source_addr: String,
}

#[derive(Debug, Clone)]
pub struct NewIssueRequest {
    pub mtop: Mtop,
    pub renewal_date: NaiveDate,
    pub fields: PermitFields,
    pub processed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenewalRequest {
    pub renewal_date: NaiveDate,
    pub fields: PermitFields,
    pub processed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub renewal_date: NaiveDate,
    pub changes: TransferChanges,
    pub fields: PermitFields,
    pub processed_by: Option<String>,
}

/// What the caller gets back after staging a transaction.
#[derive(Debug, Clone)]
pub struct StagedReceipt {
    pub transaction_id: TransactionId,
    pub reference_number: ReferenceNumber,
    pub fee_schedule: FeeSchedule,
}

/// Orchestrates every permit state transition: new issue, renewal,
/// transfer, payment commit, cancellation, and direct archival.
///
/// Each operation is a single logical unit of work. Multi-record writes
/// go through the store's atomic batch methods, every storage call is
/// awaited under a bounded timeout, and one audit event is emitted per
/// operation on a best-effort basis.
pub struct LifecycleCoordinator {
    store: RegistryStoreBox,
    audit: AuditSinkBox,
    config: RegistryConfig,
}

impl LifecycleCoordinator {
    pub fn new(store: RegistryStoreBox, audit: AuditSinkBox, config: RegistryConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Stages a brand-new franchise as a pending transaction. No permit
    /// record exists until the cashier commits the payment.
    pub async fn issue_new(
        &self,
        actor: &Actor,
        request: NewIssueRequest,
    ) -> Result<ReferenceNumber> {
        let target = format!("MTOP {}", request.mtop);
        let result = self.issue_new_inner(request).await;
        self.emit(actor, "ADD_NEW_FRANCHISE", target, "Franchise", &result)
            .await;
        result
    }

    async fn issue_new_inner(&self, request: NewIssueRequest) -> Result<ReferenceNumber> {
        request.fields.validate_for_new_issue()?;
        let due_date = renewal::renewal_due_date(&request.fields.plate_no, request.renewal_date)?;
        let tx = PendingTransaction {
            id: TransactionId::generate(),
            kind: TransactionKind::NewIssue,
            reference_number: ReferenceNumber(0), // allocated by the store
            mtop: request.mtop,
            linked_permit: None,
            fields: request.fields,
            fee_schedule: fees::new_issue_schedule(),
            renewal_date: request.renewal_date,
            renewal_due_date: due_date,
            last_renewal_at: None,
            expires_at: expiry_of(request.renewal_date)?,
            created_at: Utc::now(),
            processed_by: request.processed_by,
            settled: false,
            payment: None,
        };
        self.bounded(self.store.stage(tx, None)).await
    }

    /// Stages a renewal for an active permit, computing the lapse-aware
    /// fee schedule and projecting it onto the source permit for display.
    pub async fn renew(
        &self,
        actor: &Actor,
        permit_id: PermitId,
        request: RenewalRequest,
    ) -> Result<StagedReceipt> {
        let result = self.renew_inner(permit_id, request).await;
        self.emit(
            actor,
            "FRANCHISE_RENEWAL",
            format!("Franchise ID: {permit_id}"),
            "Franchise",
            &result,
        )
        .await;
        result
    }

    async fn renew_inner(
        &self,
        permit_id: PermitId,
        request: RenewalRequest,
    ) -> Result<StagedReceipt> {
        let permit = self.stageable_permit(permit_id).await?;

        let schedule = fees::renewal_schedule(
            permit.renewal_due_date,
            request.renewal_date,
            permit.last_renewal_year(),
            request.renewal_date.year(),
        );

        // The renewal timestamp only moves when the requested date really
        // differs from the one on record.
        let last_renewal_at = if request.renewal_date != permit.renewal_date {
            Some(request.renewal_date)
        } else {
            permit.last_renewal_at
        };

        let tx = PendingTransaction {
            id: TransactionId::generate(),
            kind: TransactionKind::Renewal,
            reference_number: ReferenceNumber(0),
            mtop: permit.mtop,
            linked_permit: Some(permit.id),
            fields: request.fields,
            fee_schedule: schedule.clone(),
            renewal_date: request.renewal_date,
            renewal_due_date: permit.renewal_due_date,
            last_renewal_at,
            expires_at: expiry_of(request.renewal_date)?,
            created_at: Utc::now(),
            processed_by: request.processed_by,
            settled: false,
            payment: None,
        };
        let tx_id = tx.id;

        let mut source = permit;
        source.pending = true;
        source.display_schedule = Some(schedule.clone());

        let reference_number = self.bounded(self.store.stage(tx, Some(source))).await?;
        Ok(StagedReceipt {
            transaction_id: tx_id,
            reference_number,
            fee_schedule: schedule,
        })
    }

    /// Stages a transfer of an active permit with a flat per-change fee
    /// menu.
    pub async fn transfer(
        &self,
        actor: &Actor,
        permit_id: PermitId,
        request: TransferRequest,
    ) -> Result<StagedReceipt> {
        let result = self.transfer_inner(permit_id, request).await;
        self.emit(
            actor,
            "TRANSFER_FRANCHISE",
            format!("Franchise ID: {permit_id}"),
            "Franchise",
            &result,
        )
        .await;
        result
    }

    async fn transfer_inner(
        &self,
        permit_id: PermitId,
        request: TransferRequest,
    ) -> Result<StagedReceipt> {
        let permit = self.stageable_permit(permit_id).await?;
        let schedule = fees::transfer_schedule(&request.changes);
        let due_date = renewal::renewal_due_date(&request.fields.plate_no, request.renewal_date)?;

        let tx = PendingTransaction {
            id: TransactionId::generate(),
            kind: TransactionKind::Transfer,
            reference_number: ReferenceNumber(0),
            mtop: permit.mtop,
            linked_permit: Some(permit.id),
            fields: request.fields,
            fee_schedule: schedule.clone(),
            renewal_date: request.renewal_date,
            renewal_due_date: due_date,
            last_renewal_at: permit.last_renewal_at,
            expires_at: expiry_of(request.renewal_date)?,
            created_at: Utc::now(),
            processed_by: request.processed_by,
            settled: false,
            payment: None,
        };
        let tx_id = tx.id;

        let mut source = permit;
        source.pending = true;
        source.display_schedule = Some(schedule.clone());

        let reference_number = self.bounded(self.store.stage(tx, Some(source))).await?;
        Ok(StagedReceipt {
            transaction_id: tx_id,
            reference_number,
            fee_schedule: schedule,
        })
    }

    /// Settles a staged transaction against its payment receipt.
    ///
    /// New issues materialize a brand-new permit; renewals overwrite the
    /// linked permit in place, preserving its identity; transfers archive
    /// the linked permit and create its successor with a version link.
    /// All record writes land in one atomic batch.
    pub async fn commit_payment(
        &self,
        actor: &Actor,
        tx_id: TransactionId,
        receipt: PaymentReceipt,
    ) -> Result<Permit> {
        let result = self.commit_payment_inner(actor, tx_id, receipt).await;
        self.emit(
            actor,
            "FRANCHISE_PAYMENT",
            format!("Transaction ID: {tx_id}"),
            "Cashier",
            &result,
        )
        .await;
        result
    }

    async fn commit_payment_inner(
        &self,
        actor: &Actor,
        tx_id: TransactionId,
        receipt: PaymentReceipt,
    ) -> Result<Permit> {
        let mut tx = self
            .bounded(self.store.pending(tx_id))
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("pending transaction {tx_id}")))?;
        // Fast path only: the store's `settle` re-checks this inside its
        // critical section, so a concurrent commit cannot slip past here.
        if tx.settled {
            return Err(RegistryError::Validation(format!(
                "transaction {tx_id} has already been settled"
            )));
        }

        let (committed, upserts) = match tx.kind {
            TransactionKind::NewIssue => {
                let permit = self.permit_from_snapshot(&tx, &receipt, None);
                (permit.clone(), vec![permit])
            }
            TransactionKind::Renewal => {
                let linked = self.linked_permit(&tx).await?;
                let mut updated = self.permit_from_snapshot(&tx, &receipt, None);
                // Same identity before and after: the permit is renewed,
                // not replaced.
                updated.id = linked.id;
                updated.created_at = linked.created_at;
                updated.supersedes = linked.supersedes;
                (updated.clone(), vec![updated])
            }
            TransactionKind::Transfer => {
                let mut linked = self.linked_permit(&tx).await?;
                let mut successor = self.permit_from_snapshot(&tx, &receipt, Some(linked.id));
                linked.pending = false;
                linked.display_schedule = None;
                linked.superseded_by = Some(successor.id);
                linked.archival = Some(Archival {
                    at: Utc::now(),
                    by: actor.name.clone(),
                    reason: ArchivalReason::Transferred,
                });
                successor.supersedes = Some(linked.id);
                (successor.clone(), vec![linked, successor])
            }
        };

        tx.settled = true;
        tx.payment = Some(receipt);
        self.bounded(self.store.settle(tx, upserts)).await?;
        Ok(committed)
    }

    /// Cancels a staged transaction. Idempotent: cancelling an id that no
    /// longer exists is a no-op. The linked permit (if any) is restored
    /// to pending=false with its display schedule cleared.
    pub async fn cancel(&self, actor: &Actor, tx_id: TransactionId) -> Result<()> {
        let result = self.cancel_inner(tx_id).await;
        self.emit(
            actor,
            "CANCEL_OR",
            format!("Transaction ID: {tx_id}"),
            "Cashier",
            &result,
        )
        .await;
        result
    }

    async fn cancel_inner(&self, tx_id: TransactionId) -> Result<()> {
        self.bounded(self.store.unstage(tx_id)).await
    }

    /// Archives an active permit directly (a revocation, typically),
    /// independent of any pending transaction.
    pub async fn archive(
        &self,
        actor: &Actor,
        permit_id: PermitId,
        reason: ArchivalReason,
    ) -> Result<Permit> {
        let result = self.archive_inner(actor, permit_id, reason).await;
        self.emit(
            actor,
            "ARCHIVE_FRANCHISE",
            format!("Franchise ID: {permit_id}"),
            "Franchise",
            &result,
        )
        .await;
        result
    }

    async fn archive_inner(
        &self,
        actor: &Actor,
        permit_id: PermitId,
        reason: ArchivalReason,
    ) -> Result<Permit> {
        let mut permit = self.active_permit(permit_id).await?;
        permit.archival = Some(Archival {
            at: Utc::now(),
            by: actor.name.clone(),
            reason,
        });
        self.bounded(self.store.update_permit(permit.clone())).await?;
        Ok(permit)
    }

    async fn active_permit(&self, id: PermitId) -> Result<Permit> {
        self.bounded(self.store.permit(id))
            .await?
            .filter(Permit::is_active)
            .ok_or_else(|| RegistryError::NotFound(format!("active franchise {id}")))
    }

    /// An active permit with no open transaction already staged against
    /// it. Each permit carries at most one open transaction at a time;
    /// this is a fast path, and `stage` re-checks the stored record
    /// inside its critical section.
    async fn stageable_permit(&self, id: PermitId) -> Result<Permit> {
        let permit = self.active_permit(id).await?;
        if permit.pending {
            return Err(RegistryError::Validation(format!(
                "franchise {id} already has an open pending transaction"
            )));
        }
        Ok(permit)
    }

    async fn linked_permit(&self, tx: &PendingTransaction) -> Result<Permit> {
        let id = tx.linked_permit.ok_or_else(|| {
            RegistryError::Storage(format!(
                "{} transaction {} has no linked permit",
                tx.kind, tx.id
            ))
        })?;
        self.active_permit(id).await
    }

    fn permit_from_snapshot(
        &self,
        tx: &PendingTransaction,
        receipt: &PaymentReceipt,
        supersedes: Option<PermitId>,
    ) -> Permit {
        Permit {
            id: PermitId::generate(),
            mtop: tx.mtop,
            fields: tx.fields.clone(),
            renewal_due_date: tx.renewal_due_date,
            renewal_date: tx.renewal_date,
            last_renewal_at: tx.last_renewal_at,
            expires_at: tx.expires_at,
            created_at: tx.created_at,
            pending: false,
            display_schedule: None,
            archival: None,
            supersedes,
            superseded_by: None,
            payment_or: Some(receipt.or_number.clone()),
            payment_or_date: Some(receipt.or_date),
        }
    }

    /// Bounds a storage future by the configured timeout. An elapsed
    /// timeout surfaces as `StorageTimeout` with no partial mutation.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>> + Send) -> Result<T> {
        tokio::time::timeout(self.config.storage_timeout, fut)
            .await
            .map_err(|_| RegistryError::StorageTimeout(self.config.storage_timeout))?
    }

    /// Best-effort audit emit. Sink failures are logged and swallowed:
    /// they must never block or roll back the primary operation.
    async fn emit<T>(
        &self,
        actor: &Actor,
        action: &str,
        target: String,
        module: &str,
        result: &Result<T>,
    ) {
        let event = AuditEvent {
            action: action.to_string(),
            performed_by: actor.name.clone(),
            target,
            module: module.to_string(),
            source_addr: actor.source_addr.clone(),
            status: if result.is_ok() {
                AuditStatus::Ok
            } else {
                AuditStatus::Failed
            },
        };
        if let Err(err) = self.audit.record(event).await {
            tracing::warn!(action, error = %err, "audit sink failure ignored");
        }
    }
}

fn expiry_of(renewal_date: NaiveDate) -> Result<NaiveDate> {
    renewal_date
        .checked_add_months(Months::new(12))
        .ok_or_else(|| {
            RegistryError::Validation(format!("renewal date {renewal_date} out of range"))
        })
}
