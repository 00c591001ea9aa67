//! Ledger constants

use crate::types::Amount;

/// Interest numerator per elapsed day (0.1% per day)
pub const RATE_NUMERATOR: Amount = 1;

/// Interest denominator per elapsed day
pub const RATE_DENOMINATOR: Amount = 1_000;

/// Length of one accrual period in seconds
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Number of slots on each asset leaderboard
pub const LEADERBOARD_SIZE: usize = 3;

/// Marker a receiver returns from `on_transfer_received` to accept a transfer
pub const TRANSFER_RECEIVED_ACK: [u8; 4] = [0x88, 0xa7, 0xca, 0x5c];

/// Reserved asset id for the native currency
pub const NATIVE_ASSET_BYTES: [u8; 32] = [0xee; 32];
