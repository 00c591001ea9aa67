//! Withdrawal allocator: settled interest is drawn down before principal

use crate::accrual::{self, InterestRate};
use crate::error::{BankError, Result};
use crate::ledger;
use crate::state::PositionStore;
use crate::types::{Address, Amount, AssetId, Timestamp};
use serde::{Deserialize, Serialize};

/// How a withdrawal is split between interest and principal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub interest_used: Amount,
    pub principal_used: Amount,
}

impl Allocation {
    pub fn total(&self) -> Amount {
        self.interest_used + self.principal_used
    }
}

/// Split `requested` against the available interest and principal
pub fn allocate(interest: Amount, principal: Amount, requested: Amount) -> Result<Allocation> {
    let available = interest
        .checked_add(principal)
        .ok_or(BankError::ArithmeticOverflow("available balance"))?;
    if requested > available {
        return Err(BankError::InsufficientBalance {
            requested,
            available,
        });
    }

    if requested <= interest {
        Ok(Allocation {
            interest_used: requested,
            principal_used: 0,
        })
    } else {
        Ok(Allocation {
            interest_used: interest,
            principal_used: requested - interest,
        })
    }
}

/// Settle, split and apply a withdrawal of `requested` for (asset, owner).
///
/// Only touches internal state; the caller moves the tokens afterwards and
/// discards the staged writes if that fails.
pub fn withdraw<S: PositionStore>(
    store: &mut S,
    rate: &InterestRate,
    asset: &AssetId,
    owner: &Address,
    requested: Amount,
    now: Timestamp,
) -> Result<(Allocation, Amount)> {
    let accrued = accrual::settle(store, rate, asset, owner, now)?;

    let position = store.position(asset, owner);
    let allocation = allocate(position.settled_interest, position.principal, requested)?;

    if allocation.interest_used > 0 {
        let mut position = store.position(asset, owner);
        position.settled_interest -= allocation.interest_used;
        store.set_position(asset, owner, position);
    }
    if allocation.principal_used > 0 {
        ledger::debit(store, asset, owner, allocation.principal_used)?;
    }

    let mut position = store.position(asset, owner);
    accrual::sync_timer(&mut position, now);
    store.set_position(asset, owner, position);

    Ok((allocation, accrued))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BankState, Position};

    const T0: Timestamp = 1_700_000_000;

    fn asset() -> AssetId {
        AssetId::token(Address::from_seed("usdc"))
    }

    fn state_with(settled: Amount, principal: Amount) -> (BankState, Address) {
        let mut state = BankState::new();
        let owner = Address::from_seed("alice");
        ledger::credit(&mut state, &asset(), &owner, principal).unwrap();
        let mut position = state.position(&asset(), &owner);
        position.settled_interest = settled;
        position.last_settlement = T0;
        state.set_position(&asset(), &owner, position);
        (state, owner)
    }

    #[test]
    fn test_interest_only_withdrawal() {
        let (mut state, owner) = state_with(50, 100);

        let (allocation, _) =
            withdraw(&mut state, &InterestRate::default(), &asset(), &owner, 30, T0).unwrap();

        assert_eq!(
            allocation,
            Allocation {
                interest_used: 30,
                principal_used: 0
            }
        );
        let position = state.position(&asset(), &owner);
        assert_eq!(position.settled_interest, 20);
        assert_eq!(position.principal, 100);
        assert_eq!(state.total_deposits(&asset()), 100);
    }

    #[test]
    fn test_interest_then_principal() {
        let (mut state, owner) = state_with(50, 100);

        let (allocation, _) =
            withdraw(&mut state, &InterestRate::default(), &asset(), &owner, 120, T0).unwrap();

        assert_eq!(
            allocation,
            Allocation {
                interest_used: 50,
                principal_used: 70
            }
        );
        let position = state.position(&asset(), &owner);
        assert_eq!(position.settled_interest, 0);
        assert_eq!(position.principal, 30);
        assert_eq!(state.total_deposits(&asset()), 30);
    }

    #[test]
    fn test_withdraw_everything_clears_timer() {
        let (mut state, owner) = state_with(50, 100);

        withdraw(&mut state, &InterestRate::default(), &asset(), &owner, 150, T0).unwrap();

        assert_eq!(state.position(&asset(), &owner), Position::default());
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_over_withdrawal_rejected() {
        assert_eq!(
            allocate(50, 100, 151),
            Err(BankError::InsufficientBalance {
                requested: 151,
                available: 150
            })
        );
    }
}
