//! The module contains the errors the engine can throw.
//!
//! Every variant carries a human-readable message naming the offending field
//! or entity. All of them abort the enclosing database transaction; the
//! engine never retries on its own.
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or out-of-range input (bad enum value, empty summary, ...).
    #[error("Validation failed: {0}")]
    Validation(String),
    /// Non-positive amount, fee exceeding gross, non-finite input.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    /// Requested transition is not allowed from the current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Referenced account/transaction/dispute does not exist.
    #[error("\"{0}\" not found!")]
    NotFound(String),
    /// Uniqueness or single-active-dispute invariant violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Evidence store failure while appending a dispute event.
    #[error("Evidence store error: {0}")]
    Evidence(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidState(a), Self::InvalidState(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Evidence(a), Self::Evidence(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
