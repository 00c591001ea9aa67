//! Custody Token
//!
//! In-memory fungible token used as the banks' transfer, permit and receiver
//! collaborator in scenarios and tests.

pub mod error;
pub mod keys;
pub mod permit;
pub mod token;

pub use error::{PermitError, Result, TokenError};
pub use keys::Keypair;
pub use permit::{permit_digest, sign_permit};
pub use token::{InMemoryToken, FEE_DENOMINATOR};
