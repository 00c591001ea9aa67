//! Bank error types

use crate::types::Amount;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Insufficient reserves: interest {requested}, reserves {available}")]
    InsufficientReserves { requested: Amount, available: Amount },

    #[error("External transfer failed: {0}")]
    ExternalTransferFailed(String),

    #[error("Receipt mismatch: claimed {claimed}, observed {observed}")]
    ReceiptMismatch { claimed: Amount, observed: Amount },

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Operations are paused")]
    Paused,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

pub type Result<T> = std::result::Result<T, BankError>;
