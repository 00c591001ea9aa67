//! Interest accrual engine
//!
//! Simple, non-compounding interest over whole elapsed days. Pending interest
//! is derived from the time since the last settlement; settling folds it into
//! `settled_interest` (never into principal) and restarts the timer.

use crate::constants::{RATE_DENOMINATOR, RATE_NUMERATOR, SECONDS_PER_DAY};
use crate::error::{BankError, Result};
use crate::state::{Position, PositionStore};
use crate::types::{Address, Amount, AssetId, Timestamp};
use serde::{Deserialize, Serialize};

/// Fixed linear rate: `numerator / denominator` of principal per period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRate {
    pub numerator: Amount,
    pub denominator: Amount,
    pub period_secs: u64,
}

impl Default for InterestRate {
    fn default() -> Self {
        Self {
            numerator: RATE_NUMERATOR,
            denominator: RATE_DENOMINATOR,
            period_secs: SECONDS_PER_DAY,
        }
    }
}

impl InterestRate {
    pub fn validate(&self) -> Result<()> {
        if self.denominator == 0 {
            return Err(BankError::InvalidArgument(
                "interest denominator must be non-zero".to_string(),
            ));
        }
        if self.period_secs == 0 {
            return Err(BankError::InvalidArgument(
                "accrual period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whole periods between `since` and `now`; partial periods are truncated
    pub fn elapsed_periods(&self, since: Timestamp, now: Timestamp) -> u64 {
        now.saturating_sub(since) / self.period_secs
    }

    /// `floor(principal * periods * numerator / denominator)`
    pub fn interest_for(&self, principal: Amount, periods: u64) -> Result<Amount> {
        let scaled = principal
            .checked_mul(periods as Amount)
            .and_then(|v| v.checked_mul(self.numerator))
            .ok_or(BankError::ArithmeticOverflow("interest calculation"))?;
        Ok(scaled / self.denominator)
    }
}

/// Interest accrued since the last settlement, not yet locked in
pub fn pending_interest(position: &Position, rate: &InterestRate, now: Timestamp) -> Result<Amount> {
    if position.principal == 0 || position.last_settlement == 0 {
        return Ok(0);
    }
    let periods = rate.elapsed_periods(position.last_settlement, now);
    if periods == 0 {
        return Ok(0);
    }
    rate.interest_for(position.principal, periods)
}

/// Settled plus pending interest, without mutating anything
pub fn total_interest(position: &Position, rate: &InterestRate, now: Timestamp) -> Result<Amount> {
    position
        .settled_interest
        .checked_add(pending_interest(position, rate, now)?)
        .ok_or(BankError::ArithmeticOverflow("total interest"))
}

/// Restart or clear the settlement timer to match the principal
pub fn sync_timer(position: &mut Position, now: Timestamp) {
    if position.principal == 0 {
        position.last_settlement = 0;
    } else if position.last_settlement == 0 {
        position.last_settlement = now;
    }
}

/// Lock in pending interest for (asset, owner). Returns the amount settled.
///
/// Must run before every principal change for the pair. The timer restarts at
/// `now` while principal is non-zero and is forced to 0 otherwise, so a later
/// re-deposit never accrues over an empty period.
pub fn settle<S: PositionStore>(
    store: &mut S,
    rate: &InterestRate,
    asset: &AssetId,
    owner: &Address,
    now: Timestamp,
) -> Result<Amount> {
    let before = store.position(asset, owner);
    let accrued = pending_interest(&before, rate, now)?;

    let mut after = before;
    if accrued > 0 {
        after.settled_interest = after
            .settled_interest
            .checked_add(accrued)
            .ok_or(BankError::ArithmeticOverflow("settled interest"))?;
    }
    after.last_settlement = if after.principal == 0 { 0 } else { now };

    if after != before {
        store.set_position(asset, owner, after);
    }
    if accrued > 0 {
        tracing::debug!(%asset, ?owner, accrued, "settled interest");
    }
    Ok(accrued)
}
