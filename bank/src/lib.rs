//! Custody Bank
//!
//! The `Custodian` facade holding token and native deposits on top of the
//! interest-bearing core:
//! - Pull, permit, push and native deposit paths
//! - Withdrawals paid interest-first
//! - Owner-funded interest reserves
//! - Owner and pause gating
//! - Event log of committed operations

pub mod access;
pub mod config;
pub mod custodian;
pub mod events;

pub use access::AccessControl;
pub use config::{BankConfig, ConfigError, InterestConfig};
pub use custodian::{Custodian, CustodianSnapshot};
pub use events::{BankEvent, EventLog, EventRecord};

pub use custody_core::{BankError, Result};
