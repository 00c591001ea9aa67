//! Top-K depositor leaderboard
//!
//! A fixed array of [`LEADERBOARD_SIZE`] slots kept in descending order of
//! each account's current principal. Updated incrementally on deposits only:
//! withdrawals never re-rank or evict, so an account that withdraws stays on
//! the board until someone else overtakes it.

use crate::constants::LEADERBOARD_SIZE;
use crate::error::{BankError, Result};
use crate::types::{Address, Amount};
use serde::{Deserialize, Serialize};

/// What a deposit did to the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankChange {
    /// Board untouched (already in place, or did not qualify)
    Unchanged,
    /// Account already ranked and bubbled up
    Moved { from: usize, to: usize },
    /// Account entered the board, possibly pushing the last entry off
    Inserted {
        at: usize,
        evicted: Option<Address>,
    },
}

impl RankChange {
    pub fn is_changed(&self) -> bool {
        !matches!(self, RankChange::Unchanged)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaderboard {
    slots: [Option<Address>; LEADERBOARD_SIZE],
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reposition `account` after its balance rose to `new_balance`.
    ///
    /// `balance_of` returns the current balance of the other ranked accounts.
    /// Ties keep the earlier-placed entry ahead.
    pub fn record_deposit<F>(
        &mut self,
        account: &Address,
        new_balance: Amount,
        balance_of: F,
    ) -> RankChange
    where
        F: Fn(&Address) -> Amount,
    {
        if let Some(from) = self.position_of(account) {
            let mut i = from;
            while i > 0 {
                let ahead = match self.slots[i - 1] {
                    Some(ahead) => ahead,
                    None => break,
                };
                if balance_of(&ahead) >= new_balance {
                    break;
                }
                self.slots.swap(i - 1, i);
                i -= 1;
            }
            return if i == from {
                RankChange::Unchanged
            } else {
                RankChange::Moved { from, to: i }
            };
        }

        if let Some(Some(last)) = self.slots.last() {
            if new_balance <= balance_of(last) {
                return RankChange::Unchanged;
            }
        }

        let at = self.slots.iter().position(|slot| match slot {
            None => true,
            Some(occupant) => balance_of(occupant) < new_balance,
        });

        match at {
            Some(at) => {
                let evicted = self.slots[LEADERBOARD_SIZE - 1];
                for j in (at + 1..LEADERBOARD_SIZE).rev() {
                    self.slots[j] = self.slots[j - 1];
                }
                self.slots[at] = Some(*account);
                RankChange::Inserted { at, evicted }
            }
            None => RankChange::Unchanged,
        }
    }

    pub fn position_of(&self, account: &Address) -> Option<usize> {
        self.slots.iter().position(|slot| slot.as_ref() == Some(account))
    }

    pub fn contains(&self, account: &Address) -> bool {
        self.position_of(account).is_some()
    }

    /// Ranked accounts, best first
    pub fn accounts(&self) -> Vec<Address> {
        self.slots.iter().flatten().copied().collect()
    }

    pub fn slots(&self) -> &[Option<Address>; LEADERBOARD_SIZE] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Empty slots only after populated ones, and no account twice
    pub fn check_well_formed(&self) -> Result<()> {
        let populated = self.len();
        if self.slots[..populated].iter().any(Option::is_none) {
            return Err(BankError::InvariantViolated(
                "leaderboard has a gap before a populated slot".to_string(),
            ));
        }
        let accounts = self.accounts();
        for (i, account) in accounts.iter().enumerate() {
            if accounts[i + 1..].contains(account) {
                return Err(BankError::InvariantViolated(format!(
                    "leaderboard lists {:?} twice",
                    account
                )));
            }
        }
        Ok(())
    }
}
