//! Bulk import of franchise records from the legacy CSV ledger.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

use crate::domain::permit::{Mtop, PermitFields};
use crate::error::{RegistryError, Result};

/// One row of the legacy ledger export. Column names follow the legacy
/// spreadsheet headers.
#[derive(Debug, Clone, Deserialize)]
pub struct PermitRow {
    #[serde(rename = "MTOP")]
    pub mtop: String,
    #[serde(rename = "DATE_RENEWAL")]
    pub renewal_date: NaiveDate,
    #[serde(rename = "LASTNAME")]
    pub last_name: String,
    #[serde(rename = "FIRSTNAME")]
    pub first_name: String,
    #[serde(rename = "ADDRESS")]
    pub address: String,
    #[serde(rename = "OWNER_NO")]
    pub owner_contact: String,
    #[serde(rename = "DRIVERS_NAME")]
    pub driver_name: String,
    #[serde(rename = "DRIVERS_ADDRESS")]
    pub driver_address: String,
    #[serde(rename = "MAKE")]
    pub make: String,
    #[serde(rename = "MODEL")]
    pub model: String,
    #[serde(rename = "PLATE_NO")]
    pub plate_no: String,
    #[serde(rename = "MOTOR_NO")]
    pub motor_no: String,
    #[serde(rename = "OR")]
    pub or_no: String,
    #[serde(rename = "CR")]
    pub cr_no: String,
    #[serde(rename = "TODA", default)]
    pub toda: Option<String>,
    #[serde(rename = "ROUTE", default)]
    pub route: Option<String>,
}

impl PermitRow {
    pub fn mtop(&self) -> Result<Mtop> {
        self.mtop.parse()
    }

    pub fn into_fields(self) -> PermitFields {
        PermitFields {
            owner_first_name: self.first_name,
            owner_last_name: self.last_name,
            owner_address: self.address,
            owner_contact: self.owner_contact,
            driver_name: self.driver_name,
            driver_address: self.driver_address,
            make: self.make,
            model: self.model,
            plate_no: self.plate_no,
            motor_no: self.motor_no,
            or_no: self.or_no,
            cr_no: self.cr_no,
            toda: self.toda,
            route: self.route,
            ..Default::default()
        }
    }
}

/// Reads permit rows from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record
/// lengths, and yields rows lazily so large ledgers stream without
/// loading everything into memory.
pub struct PermitCsvReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PermitCsvReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn rows(self) -> impl Iterator<Item = Result<PermitRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(RegistryError::from))
    }
}

/// MTOP values appearing more than once in an import batch. The legacy
/// ledger was hand-maintained and duplicates were common.
pub fn duplicate_mtops(rows: &[PermitRow]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row.mtop.as_str()).or_default() += 1;
    }
    let mut duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(mtop, _)| mtop.to_string())
        .collect();
    duplicates.sort();
    duplicates
}
