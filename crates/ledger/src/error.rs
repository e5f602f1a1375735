//! The module contains the errors the ledger can throw.
//!
//! The errors are:
//!
//! - [`PermissionDenied`] thrown when the caller's role or ownership does not
//!   allow the operation.
//! - [`NotFound`] thrown when an item is missing or not visible to the caller.
//! - [`InvalidState`] thrown when the operation would break a ledger rule
//!   (same-account transfer, deleting a funded account, zero amounts, ...).
//! - [`InsufficientFunds`] thrown when a transfer source is underfunded.
//! - [`DependencyConflict`] thrown when a deletion is blocked by references.
//!
//!  [`PermissionDenied`]: EngineError::PermissionDenied
//!  [`NotFound`]: EngineError::NotFound
//!  [`InvalidState`]: EngineError::InvalidState
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`DependencyConflict`]: EngineError::DependencyConflict
use sea_orm::DbErr;
use thiserror::Error;

/// Ledger custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Direct posting to an account that only accepts transfers.
    #[error("Invalid account type: {0}")]
    InvalidAccountType(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Dependency conflict: {0}")]
    DependencyConflict(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid role: {0}")]
    InvalidRole(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::PermissionDenied(a), Self::PermissionDenied(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::InvalidState(a), Self::InvalidState(b)) => a == b,
            (Self::InvalidAccountType(a), Self::InvalidAccountType(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::DependencyConflict(a), Self::DependencyConflict(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidRole(a), Self::InvalidRole(b)) => a == b,
            (Self::InvalidValue(a), Self::InvalidValue(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
