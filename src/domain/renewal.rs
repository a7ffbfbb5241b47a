//! Plate-derived renewal deadline rule.
//!
//! The authority fixes each franchise's annual renewal month by the last
//! digit of its vehicle plate. Digit 0 maps to October (a historical
//! fiscal-year offset); digits 1 through 9 map to January through
//! September. The due date is the last calendar day of that month in the
//! year after the reference date.

use chrono::{Datelike, NaiveDate};

use crate::domain::fees::days_in_month;
use crate::error::{RegistryError, Result};

/// Maps a plate's trailing digit to its 1-based renewal month.
fn renewal_month(digit: u32) -> u32 {
    match digit {
        0 => 10,
        d => d,
    }
}

/// The rightmost digit in a plate identifier, if any.
fn last_digit(plate: &str) -> Option<u32> {
    plate.chars().rev().find_map(|c| c.to_digit(10))
}

/// Derives the legally mandated renewal due date from a plate identifier.
///
/// Fails with `InvalidPlate` when the plate contains no digit at all.
/// Example: plate `ABC-1230`, reference in 2024 -> digit 0 -> October ->
/// 2025-10-31.
pub fn renewal_due_date(plate: &str, reference: NaiveDate) -> Result<NaiveDate> {
    let digit =
        last_digit(plate).ok_or_else(|| RegistryError::InvalidPlate(plate.to_string()))?;
    let month = renewal_month(digit);
    let year = reference.year() + 1;
    let day = days_in_month(year, month);
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| RegistryError::InvalidPlate(plate.to_string()))
}
