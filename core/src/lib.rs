//! Custody Core Library
//!
//! Interest-bearing ledger core shared by the custodial banks:
//! - Balance ledger (per asset/owner principal and asset aggregates)
//! - Interest accrual with whole-day settlement
//! - Withdrawal allocation (interest before principal)
//! - Top-K depositor leaderboard
//!
//! All mutations go through [`BankState::transact`], which stages writes in an
//! overlay and commits them only when the whole operation succeeds.

pub mod accrual;
pub mod allocator;
pub mod clock;
pub mod constants;
pub mod error;
pub mod external;
pub mod ledger;
pub mod operations;
pub mod ranking;
pub mod state;
pub mod types;

// Re-export main types
pub use accrual::InterestRate;
pub use allocator::Allocation;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BankError, Result};
pub use external::{
    verify_acknowledgement, Permit, PermitCheckpoint, PermitVerifier, TokenHoldings, TokenReceiver, TokenTransfer,
};
pub use operations::{DepositOutcome, WithdrawalOutcome};
pub use ranking::{Leaderboard, RankChange};
pub use state::{BankState, Position, PositionStore, Staged};
pub use types::{Address, Amount, AssetId, CallContext, Timestamp};
