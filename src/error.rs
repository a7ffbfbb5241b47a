use std::time::Duration;
use thiserror::Error;

use crate::domain::permit::Mtop;

/// Errors surfaced by registry operations.
///
/// Every variant carries enough context to render a user-facing message.
/// Validation failures are reported before anything is persisted; storage
/// failures abort the whole transition with no partial state.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("MTOP {0} is already held by an active franchise")]
    DuplicateMtop(Mtop),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("plate number '{0}' contains no digit to derive a renewal month from")]
    InvalidPlate(String),
    #[error("storage operation timed out after {0:?}")]
    StorageTimeout(Duration),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
