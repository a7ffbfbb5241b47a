use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use mtop_registry::application::lifecycle::{
    Actor, LifecycleCoordinator, NewIssueRequest, RenewalRequest,
};
use mtop_registry::config::RegistryConfig;
use mtop_registry::domain::permit::{ArchivalReason, Mtop, Permit, PermitFields, PermitId};
use mtop_registry::domain::ports::{AuditEvent, AuditSink, AuditStatus, RegistryStore};
use mtop_registry::domain::transaction::{
    PaymentReceipt, PendingTransaction, ReferenceNumber, TransactionId,
};
use mtop_registry::error::{RegistryError, Result};
use mtop_registry::infrastructure::audit::MemoryAuditSink;
use mtop_registry::infrastructure::in_memory::InMemoryRegistry;

fn actor() -> Actor {
    Actor {
        name: "clerk".into(),
        source_addr: "10.0.0.7".into(),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fields(plate: &str) -> PermitFields {
    PermitFields {
        owner_first_name: "Liza".into(),
        owner_last_name: "Garcia".into(),
        owner_address: "Zone 4".into(),
        owner_contact: "09190000001".into(),
        driver_name: "Ramon Garcia".into(),
        driver_address: "Zone 4".into(),
        make: "Honda".into(),
        model: "TMX155".into(),
        plate_no: plate.into(),
        motor_no: "MN-1".into(),
        or_no: "OR-1".into(),
        cr_no: "CR-1".into(),
        ..Default::default()
    }
}

fn new_issue(mtop: u16, plate: &str) -> NewIssueRequest {
    NewIssueRequest {
        mtop: Mtop::new(mtop).unwrap(),
        renewal_date: date(2024, 4, 1),
        fields: fields(plate),
        processed_by: Some("clerk".into()),
    }
}

#[tokio::test]
async fn test_concurrent_new_issues_for_same_mtop() {
    let registry = InMemoryRegistry::new();
    let coordinator = LifecycleCoordinator::new(
        Box::new(registry.clone()),
        Box::new(MemoryAuditSink::new()),
        RegistryConfig::default(),
    );

    let actor = actor();
    let (a, b) = tokio::join!(
        coordinator.issue_new(&actor, new_issue(900, "AB-9001")),
        coordinator.issue_new(&actor, new_issue(900, "CD-9002")),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one staging must win the MTOP");
    let failure = if a.is_err() { a } else { b };
    assert!(matches!(
        failure.unwrap_err(),
        RegistryError::DuplicateMtop(_)
    ));
    assert_eq!(registry.open_pending().await.unwrap().len(), 1);
}

/// Store that adds latency to single-record reads before delegating,
/// widening any check-then-act window between a coordinator read and the
/// matching store write.
struct SlowReads(InMemoryRegistry);

impl SlowReads {
    async fn lag(&self) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[async_trait]
impl RegistryStore for SlowReads {
    async fn permit(&self, id: PermitId) -> Result<Option<Permit>> {
        self.lag().await;
        self.0.permit(id).await
    }
    async fn active_by_mtop(&self, mtop: Mtop) -> Result<Option<Permit>> {
        self.0.active_by_mtop(mtop).await
    }
    async fn active_permits(&self) -> Result<Vec<Permit>> {
        self.0.active_permits().await
    }
    async fn archived_permits(&self) -> Result<Vec<Permit>> {
        self.0.archived_permits().await
    }
    async fn pending(&self, id: TransactionId) -> Result<Option<PendingTransaction>> {
        self.lag().await;
        self.0.pending(id).await
    }
    async fn open_pending(&self) -> Result<Vec<PendingTransaction>> {
        self.0.open_pending().await
    }
    async fn settled_pending(&self) -> Result<Vec<PendingTransaction>> {
        self.0.settled_pending().await
    }
    async fn available_mtops(&self) -> Result<Vec<Mtop>> {
        self.0.available_mtops().await
    }
    async fn stage(
        &self,
        tx: PendingTransaction,
        source: Option<Permit>,
    ) -> Result<ReferenceNumber> {
        self.0.stage(tx, source).await
    }
    async fn settle(&self, tx: PendingTransaction, upserts: Vec<Permit>) -> Result<()> {
        self.0.settle(tx, upserts).await
    }
    async fn unstage(&self, id: TransactionId) -> Result<()> {
        self.0.unstage(id).await
    }
    async fn update_permit(&self, permit: Permit) -> Result<()> {
        self.0.update_permit(permit).await
    }
}

fn receipt(or_number: &str) -> PaymentReceipt {
    PaymentReceipt {
        or_number: or_number.into(),
        or_date: date(2024, 4, 2),
        collecting_officer: None,
    }
}

#[tokio::test]
async fn test_concurrent_commits_settle_a_transaction_once() {
    let registry = InMemoryRegistry::new();
    let coordinator = LifecycleCoordinator::new(
        Box::new(SlowReads(registry.clone())),
        Box::new(MemoryAuditSink::new()),
        RegistryConfig::default(),
    );

    coordinator
        .issue_new(&actor(), new_issue(920, "AB-9201"))
        .await
        .unwrap();
    let tx = registry.open_pending().await.unwrap().pop().unwrap();

    let actor = actor();
    let (a, b) = tokio::join!(
        coordinator.commit_payment(&actor, tx.id, receipt("OR-C1")),
        coordinator.commit_payment(&actor, tx.id, receipt("OR-C2")),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one commit must settle the transaction");
    let active = registry.active_permits().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].mtop, Mtop::new(920).unwrap());
}

#[tokio::test]
async fn test_concurrent_renewals_stage_at_most_one_transaction() {
    let registry = InMemoryRegistry::new();
    let coordinator = LifecycleCoordinator::new(
        Box::new(SlowReads(registry.clone())),
        Box::new(MemoryAuditSink::new()),
        RegistryConfig::default(),
    );

    coordinator
        .issue_new(&actor(), new_issue(921, "AB-9211"))
        .await
        .unwrap();
    let staged = registry.open_pending().await.unwrap().pop().unwrap();
    let permit = coordinator
        .commit_payment(&actor(), staged.id, receipt("OR-C3"))
        .await
        .unwrap();

    let renewal = || RenewalRequest {
        renewal_date: date(2025, 11, 15),
        fields: fields("AB-9211"),
        processed_by: None,
    };
    let actor = actor();
    let (a, b) = tokio::join!(
        coordinator.renew(&actor, permit.id, renewal()),
        coordinator.renew(&actor, permit.id, renewal()),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "only one renewal may hold the permit");
    assert_eq!(registry.open_pending().await.unwrap().len(), 1);
}

/// Audit sink that always fails, standing in for an unreachable log
/// service.
struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: AuditEvent) -> Result<()> {
        Err(RegistryError::Storage("audit sink unreachable".into()))
    }
}

#[tokio::test]
async fn test_audit_failure_never_blocks_the_operation() {
    let registry = InMemoryRegistry::new();
    let coordinator = LifecycleCoordinator::new(
        Box::new(registry.clone()),
        Box::new(FailingAuditSink),
        RegistryConfig::default(),
    );

    let reference = coordinator
        .issue_new(&actor(), new_issue(901, "AB-9011"))
        .await
        .expect("primary operation must survive a dead audit sink");
    assert_eq!(reference, ReferenceNumber(154_687));
}

#[tokio::test]
async fn test_audit_events_carry_status() {
    let registry = InMemoryRegistry::new();
    let sink = MemoryAuditSink::new();
    let coordinator = LifecycleCoordinator::new(
        Box::new(registry.clone()),
        Box::new(sink.clone()),
        RegistryConfig::default(),
    );

    coordinator
        .issue_new(&actor(), new_issue(902, "AB-9021"))
        .await
        .unwrap();
    // Same MTOP again: fails, and the failure is audited too.
    coordinator
        .issue_new(&actor(), new_issue(902, "AB-9022"))
        .await
        .unwrap_err();

    let events = sink.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "ADD_NEW_FRANCHISE");
    assert_eq!(events[0].status, AuditStatus::Ok);
    assert_eq!(events[1].status, AuditStatus::Failed);
    assert_eq!(events[1].performed_by, "clerk");
}

/// Store whose reads hang long enough to trip the coordinator's timeout.
struct StalledStore;

#[async_trait]
impl RegistryStore for StalledStore {
    async fn permit(&self, _id: PermitId) -> Result<Option<Permit>> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(None)
    }
    async fn active_by_mtop(&self, _mtop: Mtop) -> Result<Option<Permit>> {
        Ok(None)
    }
    async fn active_permits(&self) -> Result<Vec<Permit>> {
        Ok(Vec::new())
    }
    async fn archived_permits(&self) -> Result<Vec<Permit>> {
        Ok(Vec::new())
    }
    async fn pending(&self, _id: TransactionId) -> Result<Option<PendingTransaction>> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(None)
    }
    async fn open_pending(&self) -> Result<Vec<PendingTransaction>> {
        Ok(Vec::new())
    }
    async fn settled_pending(&self) -> Result<Vec<PendingTransaction>> {
        Ok(Vec::new())
    }
    async fn available_mtops(&self) -> Result<Vec<Mtop>> {
        Ok(Vec::new())
    }
    async fn stage(
        &self,
        _tx: PendingTransaction,
        _source: Option<Permit>,
    ) -> Result<ReferenceNumber> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(ReferenceNumber(0))
    }
    async fn settle(&self, _tx: PendingTransaction, _upserts: Vec<Permit>) -> Result<()> {
        Ok(())
    }
    async fn unstage(&self, _id: TransactionId) -> Result<()> {
        Ok(())
    }
    async fn update_permit(&self, _permit: Permit) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_stalled_storage_maps_to_timeout() {
    let coordinator = LifecycleCoordinator::new(
        Box::new(StalledStore),
        Box::new(MemoryAuditSink::new()),
        RegistryConfig {
            storage_timeout: Duration::from_millis(20),
            ..Default::default()
        },
    );

    let err = coordinator
        .issue_new(&actor(), new_issue(903, "AB-9031"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::StorageTimeout(_)));

    let err = coordinator
        .archive(&actor(), PermitId::generate(), ArchivalReason::Revoked)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::StorageTimeout(_)));
}

#[tokio::test]
async fn test_reference_numbers_are_monotonic_across_kinds() {
    let registry = InMemoryRegistry::new();
    let coordinator = LifecycleCoordinator::new(
        Box::new(registry.clone()),
        Box::new(MemoryAuditSink::new()),
        RegistryConfig::default(),
    );

    let first = coordinator
        .issue_new(&actor(), new_issue(910, "AB-9101"))
        .await
        .unwrap();
    let second = coordinator
        .issue_new(&actor(), new_issue(911, "AB-9111"))
        .await
        .unwrap();
    assert_eq!(second.0, first.0 + 1);
}
