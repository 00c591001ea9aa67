//! Token error types

use custody_core::Amount;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Insufficient allowance: requested {requested}, available {available}")]
    InsufficientAllowance { requested: Amount, available: Amount },

    #[error("Invalid recipient")]
    InvalidRecipient,

    #[error("Receiver rejected transfer: {0}")]
    ReceiverRejected(String),

    #[error("Transfer refused: {0}")]
    Refused(String),

    #[error("Supply overflow")]
    Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermitError {
    #[error("Permit expired at {deadline}, now {now}")]
    Expired { deadline: u64, now: u64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,
}

pub type Result<T> = std::result::Result<T, TokenError>;
