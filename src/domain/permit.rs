use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::fees::FeeSchedule;
use crate::error::RegistryError;

/// Highest route/unit number the authority hands out.
pub const MTOP_MAX: u16 = 8500;

/// The unique route/unit registration number identifying a franchise.
///
/// Rendered as a 4-digit zero-padded string (`0001`..`8500`). At most one
/// non-archived permit may hold a given `Mtop` at any time; the storage
/// layer enforces that at staging time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mtop(u16);

impl Mtop {
    pub fn new(value: u16) -> Result<Self, RegistryError> {
        if (1..=MTOP_MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(RegistryError::Validation(format!(
                "MTOP must be between 1 and {MTOP_MAX}, got {value}"
            )))
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Mtop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for Mtop {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u16 = s
            .trim()
            .parse()
            .map_err(|_| RegistryError::Validation(format!("invalid MTOP '{s}'")))?;
        Self::new(value)
    }
}

impl Serialize for Mtop {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Mtop {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a committed permit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermitId(pub Uuid);

impl PermitId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a permit left the active register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchivalReason {
    Revoked,
    Transferred,
}

/// Archival metadata, present only on archived permits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archival {
    pub at: DateTime<Utc>,
    pub by: String,
    pub reason: ArchivalReason,
}

/// The descriptive field set shared by committed permits and staged
/// transactions. A staged transaction carries a full copy; payment commit
/// moves the copy onto a permit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PermitFields {
    pub owner_first_name: String,
    pub owner_last_name: String,
    pub owner_middle_initial: Option<String>,
    pub owner_address: String,
    pub owner_contact: String,
    pub owner_sex: Option<String>,
    pub driver_name: String,
    pub driver_address: String,
    pub driver_contact: Option<String>,
    pub driver_license_no: Option<String>,
    pub driver_sex: Option<String>,
    pub make: String,
    pub model: String,
    pub plate_no: String,
    pub motor_no: String,
    pub chassis_no: Option<String>,
    pub stroke: Option<String>,
    pub fuel_displacement: Option<String>,
    pub or_no: String,
    pub cr_no: String,
    pub tpl_provider: Option<String>,
    pub tpl_date_from: Option<NaiveDate>,
    pub tpl_date_to: Option<NaiveDate>,
    pub franchise_type: Option<String>,
    pub kind_of_business: Option<String>,
    pub toda: Option<String>,
    pub route: Option<String>,
    pub remarks: Option<String>,
}

impl PermitFields {
    /// Checks the mandatory subset required before a new issue may be
    /// staged. Nothing is persisted when this fails.
    pub fn validate_for_new_issue(&self) -> Result<(), RegistryError> {
        let required = [
            ("owner first name", &self.owner_first_name),
            ("owner last name", &self.owner_last_name),
            ("owner address", &self.owner_address),
            ("owner contact", &self.owner_contact),
            ("driver name", &self.driver_name),
            ("driver address", &self.driver_address),
            ("make", &self.make),
            ("model", &self.model),
            ("plate number", &self.plate_no),
            ("motor number", &self.motor_no),
            ("OR number", &self.or_no),
            ("CR number", &self.cr_no),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(RegistryError::Validation(format!("{label} is required")));
            }
        }
        Ok(())
    }
}

/// A committed, currently-in-force (or archived) operating authorization.
///
/// `pending` marks the existence of exactly one open staged transaction
/// targeting this permit; `display_schedule` is a denormalized projection
/// of that transaction's fee schedule, never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permit {
    pub id: PermitId,
    pub mtop: Mtop,
    pub fields: PermitFields,
    /// Legally fixed annual deadline derived from the plate's last digit.
    pub renewal_due_date: NaiveDate,
    pub renewal_date: NaiveDate,
    pub last_renewal_at: Option<NaiveDate>,
    pub expires_at: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub pending: bool,
    pub display_schedule: Option<FeeSchedule>,
    pub archival: Option<Archival>,
    /// Back-reference to the permit this one replaced on transfer.
    pub supersedes: Option<PermitId>,
    pub superseded_by: Option<PermitId>,
    pub payment_or: Option<String>,
    pub payment_or_date: Option<NaiveDate>,
}

impl Permit {
    pub fn is_active(&self) -> bool {
        self.archival.is_none()
    }

    /// Year of the permit's most recent renewal, falling back to the
    /// recorded renewal date when it has never been renewed.
    pub fn last_renewal_year(&self) -> i32 {
        use chrono::Datelike;
        self.last_renewal_at
            .unwrap_or(self.renewal_date)
            .year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> PermitFields {
        PermitFields {
            owner_first_name: "Juan".into(),
            owner_last_name: "Dela Cruz".into(),
            owner_address: "Zone 2".into(),
            owner_contact: "09170000000".into(),
            driver_name: "Pedro Santos".into(),
            driver_address: "Zone 3".into(),
            make: "Honda".into(),
            model: "TMX155".into(),
            plate_no: "AB-1234".into(),
            motor_no: "M-99".into(),
            or_no: "OR-1".into(),
            cr_no: "CR-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_mtop_display_zero_padded() {
        let mtop = Mtop::new(7).unwrap();
        assert_eq!(mtop.to_string(), "0007");
        assert_eq!("0007".parse::<Mtop>().unwrap(), mtop);
    }

    #[test]
    fn test_mtop_range() {
        assert!(Mtop::new(0).is_err());
        assert!(Mtop::new(8501).is_err());
        assert!(Mtop::new(8500).is_ok());
    }

    #[test]
    fn test_validate_complete_fields() {
        assert!(fields().validate_for_new_issue().is_ok());
    }

    #[test]
    fn test_validate_missing_field() {
        let mut f = fields();
        f.motor_no = "  ".into();
        let err = f.validate_for_new_issue().unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(err.to_string().contains("motor number"));
    }
}
