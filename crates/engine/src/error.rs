//! The module contains the error the engine can throw.
//!
//! The errors are:
//!
//! - [`Validation`] thrown when a command is rejected before any write.
//! - [`KeyNotFound`] thrown when an invoice or item does not exist (or is not
//!   owned by the caller).
//! - [`Consistency`] thrown when a recompute cannot produce a coherent total.
//! - [`Allocation`] thrown when an installment write fails; the whole
//!   allocation has been rolled back when the caller sees it.
//!
//!  [`Validation`]: EngineError::Validation
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`Consistency`]: EngineError::Consistency
//!  [`Allocation`]: EngineError::Allocation
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Inconsistent state: {0}")]
    Consistency(String),
    #[error("installment {installment}/{count} failed, nothing was saved: {source}")]
    Allocation {
        installment: u32,
        count: u32,
        #[source]
        source: Box<EngineError>,
    },
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Returns `true` when the error was raised before touching the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::Consistency(a), Self::Consistency(b)) => a == b,
            (
                Self::Allocation {
                    installment: ia,
                    count: ca,
                    source: sa,
                },
                Self::Allocation {
                    installment: ib,
                    count: cb,
                    source: sb,
                },
            ) => ia == ib && ca == cb && sa == sb,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
