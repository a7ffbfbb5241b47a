//! Domain layer: permit records, staged transactions, the fee policy and
//! the plate-derived renewal-date rule, plus the storage/audit ports.

pub mod fees;
pub mod permit;
pub mod ports;
pub mod renewal;
pub mod transaction;
