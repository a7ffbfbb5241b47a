use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::fees::FeeSchedule;
use crate::domain::permit::{Mtop, PermitFields, PermitId};

/// Identity of a staged transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receipt reference number. Monotonically increasing across all staged
/// transactions, seeded at a fixed baseline when the staging area is
/// empty.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReferenceNumber(pub u32);

impl ReferenceNumber {
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    NewIssue,
    Renewal,
    Transfer,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NewIssue => "New Franchise",
            Self::Renewal => "Franchise Renewal",
            Self::Transfer => "Transfer Franchise",
        };
        f.write_str(s)
    }
}

/// Official-receipt details recorded when the cashier settles a
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub or_number: String,
    pub or_date: NaiveDate,
    pub collecting_officer: Option<String>,
}

/// A staged, not-yet-paid change awaiting payment confirmation.
///
/// Carries a full copy of the target permit's field set so the cashier
/// can settle it without re-reading the source record. `settled` flips to
/// true exactly once, on payment commit; cancellation deletes the record
/// instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub reference_number: ReferenceNumber,
    pub mtop: Mtop,
    /// The permit version this transaction will supersede. Absent for new
    /// issues, which create their permit only at payment commit.
    pub linked_permit: Option<PermitId>,
    pub fields: PermitFields,
    pub fee_schedule: FeeSchedule,
    pub renewal_date: NaiveDate,
    pub renewal_due_date: NaiveDate,
    pub last_renewal_at: Option<NaiveDate>,
    pub expires_at: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub processed_by: Option<String>,
    pub settled: bool,
    pub payment: Option<PaymentReceipt>,
}

impl PendingTransaction {
    pub fn is_open(&self) -> bool {
        !self.settled
    }
}
