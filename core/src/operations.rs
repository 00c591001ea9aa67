//! Deposit and withdrawal flows over any [`PositionStore`].
//!
//! Deposit: settle -> credit -> restart timer -> rerank.
//! Withdrawal: settle -> allocate -> debit -> restart/clear timer.

use crate::accrual::{self, InterestRate};
use crate::allocator::{self, Allocation};
use crate::error::{BankError, Result};
use crate::ledger;
use crate::ranking::RankChange;
use crate::state::PositionStore;
use crate::types::{Address, Amount, AssetId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOutcome {
    /// Interest settled before the principal changed
    pub accrued: Amount,
    /// Principal after the deposit
    pub principal: Amount,
    pub rank: RankChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalOutcome {
    pub accrued: Amount,
    pub allocation: Allocation,
    pub principal: Amount,
    pub settled_interest: Amount,
}

/// Reject zero amounts, zero ids and a zero clock before touching state
pub fn validate_request(
    asset: &AssetId,
    owner: &Address,
    amount: Amount,
    now: Timestamp,
) -> Result<()> {
    if amount == 0 {
        return Err(BankError::InvalidArgument(
            "amount must be greater than zero".to_string(),
        ));
    }
    if asset.is_zero() {
        return Err(BankError::InvalidArgument("zero asset id".to_string()));
    }
    if owner.is_zero() {
        return Err(BankError::InvalidArgument("zero account id".to_string()));
    }
    // 0 is the "never settled" sentinel, so it cannot be a real settlement time
    if now == 0 {
        return Err(BankError::InvalidArgument(
            "timestamp must be non-zero".to_string(),
        ));
    }
    Ok(())
}

pub fn deposit<S: PositionStore>(
    store: &mut S,
    rate: &InterestRate,
    asset: &AssetId,
    owner: &Address,
    amount: Amount,
    now: Timestamp,
) -> Result<DepositOutcome> {
    validate_request(asset, owner, amount, now)?;

    let accrued = accrual::settle(store, rate, asset, owner, now)?;
    let principal = ledger::credit(store, asset, owner, amount)?;

    // Settlement left the timer at 0 for a first deposit; arm it now
    let mut position = store.position(asset, owner);
    accrual::sync_timer(&mut position, now);
    store.set_position(asset, owner, position);

    let mut board = store.leaderboard(asset);
    let rank = board.record_deposit(owner, principal, |account| {
        store.position(asset, account).principal
    });
    if rank.is_changed() {
        store.set_leaderboard(asset, board);
    }

    Ok(DepositOutcome {
        accrued,
        principal,
        rank,
    })
}

pub fn withdraw<S: PositionStore>(
    store: &mut S,
    rate: &InterestRate,
    asset: &AssetId,
    owner: &Address,
    amount: Amount,
    now: Timestamp,
) -> Result<WithdrawalOutcome> {
    validate_request(asset, owner, amount, now)?;

    let (allocation, accrued) = allocator::withdraw(store, rate, asset, owner, amount, now)?;
    let position = store.position(asset, owner);

    Ok(WithdrawalOutcome {
        accrued,
        allocation,
        principal: position.principal,
        settled_interest: position.settled_interest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SECONDS_PER_DAY;
    use crate::state::BankState;

    const T0: Timestamp = 1_700_000_000;
    const DAY: u64 = SECONDS_PER_DAY;

    fn asset() -> AssetId {
        AssetId::token(Address::from_seed("usdc"))
    }

    #[test]
    fn test_deposit_settles_before_credit() {
        let mut state = BankState::new();
        let rate = InterestRate::default();
        let alice = Address::from_seed("alice");

        deposit(&mut state, &rate, &asset(), &alice, 100_000, T0).unwrap();
        let outcome = deposit(&mut state, &rate, &asset(), &alice, 100_000, T0 + 10 * DAY).unwrap();

        // Interest for the first 10 days is on the old principal only
        assert_eq!(outcome.accrued, 1_000);
        assert_eq!(outcome.principal, 200_000);
        let position = state.position(&asset(), &alice);
        assert_eq!(position.settled_interest, 1_000);
        assert_eq!(position.last_settlement, T0 + 10 * DAY);
    }

    #[test]
    fn test_same_day_deposit_accrues_nothing() {
        let mut state = BankState::new();
        let rate = InterestRate::default();
        let alice = Address::from_seed("alice");

        deposit(&mut state, &rate, &asset(), &alice, 100_000, T0).unwrap();
        let outcome = deposit(&mut state, &rate, &asset(), &alice, 1, T0 + DAY - 1).unwrap();

        assert_eq!(outcome.accrued, 0);
    }

    #[test]
    fn test_full_withdrawal_prevents_back_accrual() {
        let mut state = BankState::new();
        let rate = InterestRate::default();
        let alice = Address::from_seed("alice");

        deposit(&mut state, &rate, &asset(), &alice, 100_000, T0).unwrap();
        withdraw(&mut state, &rate, &asset(), &alice, 100_000, T0 + 1).unwrap();
        assert_eq!(state.position(&asset(), &alice).last_settlement, 0);

        // Thirty empty days later, re-deposit
        let outcome = deposit(&mut state, &rate, &asset(), &alice, 100_000, T0 + 30 * DAY).unwrap();
        assert_eq!(outcome.accrued, 0);
        assert_eq!(state.position(&asset(), &alice).settled_interest, 0);
        assert_eq!(state.position(&asset(), &alice).last_settlement, T0 + 30 * DAY);
    }

    #[test]
    fn test_deposit_updates_leaderboard() {
        let mut state = BankState::new();
        let rate = InterestRate::default();
        let alice = Address::from_seed("alice");
        let bob = Address::from_seed("bob");

        deposit(&mut state, &rate, &asset(), &alice, 10, T0).unwrap();
        let outcome = deposit(&mut state, &rate, &asset(), &bob, 20, T0).unwrap();

        assert_eq!(outcome.rank, RankChange::Inserted { at: 0, evicted: None });
        assert_eq!(state.leaderboard(&asset()).accounts(), vec![bob, alice]);
    }

    #[test]
    fn test_withdraw_does_not_rerank() {
        let mut state = BankState::new();
        let rate = InterestRate::default();
        let alice = Address::from_seed("alice");
        let bob = Address::from_seed("bob");

        deposit(&mut state, &rate, &asset(), &alice, 100, T0).unwrap();
        deposit(&mut state, &rate, &asset(), &bob, 50, T0).unwrap();
        withdraw(&mut state, &rate, &asset(), &alice, 100, T0).unwrap();

        assert_eq!(state.leaderboard(&asset()).accounts(), vec![alice, bob]);
    }

    #[test]
    fn test_invalid_requests() {
        let mut state = BankState::new();
        let rate = InterestRate::default();
        let alice = Address::from_seed("alice");

        for (asset, owner, amount, now) in [
            (asset(), alice, 0, T0),
            (AssetId::token(Address::ZERO), alice, 1, T0),
            (asset(), Address::ZERO, 1, T0),
            (asset(), alice, 1, 0),
        ] {
            assert!(matches!(
                deposit(&mut state, &rate, &asset, &owner, amount, now),
                Err(BankError::InvalidArgument(_))
            ));
        }
        assert_eq!(state, BankState::new());
    }
}
