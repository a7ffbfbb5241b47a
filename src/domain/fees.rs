//! Fee schedule policy for franchise transactions.
//!
//! Everything here is pure: the same inputs always produce the same
//! itemized schedule. Amounts are `rust_decimal::Decimal`; display
//! rounding happens at 2 decimal places while stored totals keep full
//! precision.
//!
//! The renewal lapse policy applies two tiers in a fixed order. Tier 2
//! (multi-year lapse) layers its adjustments on top of tier 1's
//! intermediate values — the tiers are deliberately NOT mutually
//! exclusive, and the sequencing below reproduces the ordinance as
//! enforced, not a cleaned-up reading of it.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const MAYORS_PERMIT: Decimal = dec!(385.00);
pub const FRANCHISE_TAX: Decimal = dec!(110.00);
pub const HEALTH_SSF: Decimal = dec!(63.80);
pub const STICKER_COLOR_CODING: Decimal = dec!(55.00);
pub const DOCKET_FEE: Decimal = dec!(27.50);
pub const FILING_FEE: Decimal = dec!(27.50);
pub const TIN_PLATE_REGISTRATION: Decimal = dec!(345.00);
pub const GARBAGE_STICKER: Decimal = dec!(50.00);
pub const GARBAGE_NOTARIAL: Decimal = dec!(50.00);
pub const GARBAGE_FEE: Decimal = dec!(50.00);

pub const CHANGE_OF_OWNER: Decimal = dec!(165.00);
pub const CHANGE_OF_DRIVER: Decimal = dec!(300.00);
pub const CHANGE_OF_MOTOR: Decimal = dec!(165.00);
pub const CHANGE_OF_TODA: Decimal = dec!(165.00);

/// One line of a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLineItem {
    pub label: String,
    pub amount: Decimal,
}

impl FeeLineItem {
    fn new(label: &str, amount: Decimal) -> Self {
        Self {
            label: label.to_string(),
            amount,
        }
    }

    /// Amount rounded for display; the stored value keeps full precision.
    pub fn display_amount(&self) -> Decimal {
        self.amount.round_dp(2)
    }
}

/// An ordered list of fee line items with their total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub items: Vec<FeeLineItem>,
    pub total: Decimal,
}

impl FeeSchedule {
    fn from_items(items: Vec<FeeLineItem>) -> Self {
        let total = items.iter().map(|item| item.amount).sum();
        Self { items, total }
    }
}

/// Which parts of a franchise a transfer touches. Each requested change
/// adds one flat fee to the schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferChanges {
    pub owner: bool,
    pub driver: bool,
    pub motor: bool,
    pub toda: bool,
}

/// Fixed menu charged when a brand-new franchise is issued.
pub fn new_issue_schedule() -> FeeSchedule {
    FeeSchedule::from_items(vec![
        FeeLineItem::new("Mayor's Permit", MAYORS_PERMIT),
        FeeLineItem::new("Franchise Tax", FRANCHISE_TAX),
        FeeLineItem::new("Health / S.S.F.", HEALTH_SSF),
        FeeLineItem::new("Sticker - Color Coding", STICKER_COLOR_CODING),
        FeeLineItem::new("Docket Fee", DOCKET_FEE),
        FeeLineItem::new("Filing Fee", FILING_FEE),
        FeeLineItem::new("Tin Plate/Registration", TIN_PLATE_REGISTRATION),
        FeeLineItem::new("Sticker for Garbage", GARBAGE_STICKER),
        FeeLineItem::new("Garbage/Notarial Fee", GARBAGE_NOTARIAL),
    ])
}

/// Flat per-change menu for a franchise transfer. Only requested changes
/// appear on the receipt.
pub fn transfer_schedule(changes: &TransferChanges) -> FeeSchedule {
    let mut items = Vec::new();
    if changes.owner {
        items.push(FeeLineItem::new("CHANGE OF OWNER", CHANGE_OF_OWNER));
    }
    if changes.driver {
        items.push(FeeLineItem::new("CHANGE OF DRIVER", CHANGE_OF_DRIVER));
    }
    if changes.motor {
        items.push(FeeLineItem::new("CHANGE OF MOTOR", CHANGE_OF_MOTOR));
    }
    if changes.toda {
        items.push(FeeLineItem::new("CHANGE OF TODA", CHANGE_OF_TODA));
    }
    FeeSchedule::from_items(items)
}

/// Whole calendar months elapsed from `from` to `to`, clamping the
/// day-of-month the way a month-granular date diff does (Oct 31 -> Nov 30
/// counts as one month). Returns 0 when `to` is not after `from`.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let mut months =
        (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    if months > 0 && add_months_clamped(from, months) > to {
        months -= 1;
    }
    months.max(0) as u32
}

fn add_months_clamped(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
    let day = date.day().min(days_in_month(year, month0 + 1));
    NaiveDate::from_ymd_opt(year, month0 + 1, day).unwrap_or(date)
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}

/// Computes the itemized renewal schedule for a franchise.
///
/// * `due_date` — the plate-derived legal deadline for the last period.
/// * `payment_date` — when the renewal is being paid.
/// * `last_renewal_year` / `current_year` — drive the multi-year lapse
///   tier.
///
/// `months_late` is `months_between(due, paid) + 1` once the payment date
/// has passed the due date, otherwise 0. Tier 1 (under a year late) adds
/// surcharges and monthly interest; tier 2 (lapsed two-plus years)
/// doubles most base fees and reworks the franchise-tax-derived values on
/// top of whatever tier 1 left behind.
pub fn renewal_schedule(
    due_date: NaiveDate,
    payment_date: NaiveDate,
    last_renewal_year: i32,
    current_year: i32,
) -> FeeSchedule {
    let months_late: u32 = if payment_date > due_date {
        months_between(due_date, payment_date) + 1
    } else {
        0
    };

    let mut mayors_permit = MAYORS_PERMIT;
    let mut franchise_tax = FRANCHISE_TAX;
    let mut health = HEALTH_SSF;
    let mut sticker = STICKER_COLOR_CODING;
    let mut docket = DOCKET_FEE;
    let mut filing = FILING_FEE;
    let mut garbage = GARBAGE_FEE;
    let mut mayors_surcharge = Decimal::ZERO;
    let mut franchise_surcharge = Decimal::ZERO;
    let mut interest = Decimal::ZERO;

    // Tier 1: lapsed, but under a year.
    if (1..12).contains(&months_late) {
        mayors_surcharge = mayors_permit * dec!(0.5);
        franchise_surcharge = franchise_tax * dec!(0.25);
        interest = franchise_surcharge * dec!(0.02) * Decimal::from(months_late);
    }

    // Tier 2: renewal has lapsed roughly two full years or more. Runs
    // after tier 1 and overwrites its surcharges at the doubled bases;
    // the franchise tax itself doubles only after the interest is fixed.
    if current_year - last_renewal_year >= 3 || last_renewal_year + 2 == current_year {
        let months_over_a_year = months_late as i64 - 12;
        mayors_permit *= dec!(2);
        health *= dec!(2);
        sticker *= dec!(2);
        docket *= dec!(2);
        filing *= dec!(2);
        garbage *= dec!(2);

        mayors_surcharge = mayors_permit * dec!(0.5);
        franchise_surcharge = franchise_tax * dec!(0.25);

        interest = franchise_surcharge * dec!(0.1) * dec!(12);
        if months_over_a_year >= 1 {
            interest += franchise_surcharge * dec!(0.2) * Decimal::from(months_late);
        }

        franchise_tax *= dec!(2);
        franchise_surcharge = franchise_tax * dec!(0.125);
    }

    FeeSchedule::from_items(vec![
        FeeLineItem::new("Mayor's Permit", mayors_permit),
        FeeLineItem::new("Surcharge", mayors_surcharge),
        FeeLineItem::new("Franchise Tax", franchise_tax),
        FeeLineItem::new("Surcharge", franchise_surcharge),
        FeeLineItem::new("Interest", interest),
        FeeLineItem::new("Health / S.S.F.", health),
        FeeLineItem::new("Sticker - Color Coding", sticker),
        FeeLineItem::new("Docket Fee", docket),
        FeeLineItem::new("Filing Fee", filing),
        FeeLineItem::new("Garbage Fee", garbage),
    ])
}
