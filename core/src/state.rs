//! Bank state and the staging overlay used to make operations all-or-nothing

use crate::error::{BankError, Result};
use crate::ranking::Leaderboard;
use crate::types::{Address, Amount, AssetId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ledger entry and accrual state for one (asset, owner) pair.
///
/// `last_settlement == 0` means "never deposited or fully withdrawn" and holds
/// exactly when `principal == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub principal: Amount,
    pub settled_interest: Amount,
    pub last_settlement: Timestamp,
}

impl Position {
    pub fn is_empty(&self) -> bool {
        self.principal == 0 && self.settled_interest == 0 && self.last_settlement == 0
    }
}

/// Read/write access to positions, aggregates and leaderboards.
///
/// Implemented by the committed [`BankState`] and by the [`Staged`] overlay so
/// the ledger, accrual, allocator and ranking code runs unchanged on either.
pub trait PositionStore {
    fn position(&self, asset: &AssetId, owner: &Address) -> Position;
    fn set_position(&mut self, asset: &AssetId, owner: &Address, position: Position);
    fn total_deposits(&self, asset: &AssetId) -> Amount;
    fn set_total_deposits(&mut self, asset: &AssetId, total: Amount);
    fn leaderboard(&self, asset: &AssetId) -> Leaderboard;
    fn set_leaderboard(&mut self, asset: &AssetId, board: Leaderboard);
}

/// Committed bank state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankState {
    positions: BTreeMap<AssetId, BTreeMap<Address, Position>>,
    totals: BTreeMap<AssetId, Amount>,
    leaderboards: BTreeMap<AssetId, Leaderboard>,
}

impl BankState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a staging overlay and commit its writes only if it
    /// returns `Ok`. On error the committed state is left untouched.
    pub fn transact<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Staged<'_>) -> Result<T>,
    {
        let mut staged = Staged::new(self);
        let output = f(&mut staged)?;
        let changes = staged.into_changes();
        self.apply(changes);
        Ok(output)
    }

    fn apply(&mut self, changes: ChangeSet) {
        for ((asset, owner), position) in changes.positions {
            let by_owner = self.positions.entry(asset).or_default();
            if position.is_empty() {
                by_owner.remove(&owner);
            } else {
                by_owner.insert(owner, position);
            }
        }
        self.positions.retain(|_, by_owner| !by_owner.is_empty());
        for (asset, total) in changes.totals {
            self.totals.insert(asset, total);
        }
        for (asset, board) in changes.leaderboards {
            self.leaderboards.insert(asset, board);
        }
    }

    /// Assets that have ever seen a deposit
    pub fn assets(&self) -> Vec<AssetId> {
        let mut assets: Vec<AssetId> = self.totals.keys().copied().collect();
        for asset in self.leaderboards.keys() {
            if !assets.contains(asset) {
                assets.push(*asset);
            }
        }
        assets.sort();
        assets
    }

    /// Non-empty positions for one asset, ordered by owner id
    pub fn positions(&self, asset: &AssetId) -> Vec<(Address, Position)> {
        self.positions
            .get(asset)
            .map(|by_owner| by_owner.iter().map(|(o, p)| (*o, *p)).collect())
            .unwrap_or_default()
    }

    /// Sum of all principals for an asset, recomputed from the positions
    pub fn sum_principal(&self, asset: &AssetId) -> Result<Amount> {
        self.positions(asset)
            .iter()
            .try_fold(0u128, |acc, (_, p)| acc.checked_add(p.principal))
            .ok_or(BankError::ArithmeticOverflow("principal sum"))
    }

    /// Verify the structural invariants of the committed state
    pub fn check_invariants(&self) -> Result<()> {
        for asset in self.assets() {
            let sum = self.sum_principal(&asset)?;
            let total = self.total_deposits(&asset);
            if sum != total {
                return Err(BankError::InvariantViolated(format!(
                    "aggregate for {} is {} but principals sum to {}",
                    asset, total, sum
                )));
            }

            for (owner, position) in self.positions(&asset) {
                if (position.principal == 0) != (position.last_settlement == 0) {
                    return Err(BankError::InvariantViolated(format!(
                        "settlement timer out of sync for {:?} on {}",
                        owner, asset
                    )));
                }
            }

            self.leaderboard(&asset).check_well_formed()?;
        }
        Ok(())
    }
}

impl PositionStore for BankState {
    fn position(&self, asset: &AssetId, owner: &Address) -> Position {
        self.positions
            .get(asset)
            .and_then(|by_owner| by_owner.get(owner))
            .copied()
            .unwrap_or_default()
    }

    fn set_position(&mut self, asset: &AssetId, owner: &Address, position: Position) {
        let mut changes = ChangeSet::default();
        changes.positions.insert((*asset, *owner), position);
        self.apply(changes);
    }

    fn total_deposits(&self, asset: &AssetId) -> Amount {
        self.totals.get(asset).copied().unwrap_or(0)
    }

    fn set_total_deposits(&mut self, asset: &AssetId, total: Amount) {
        self.totals.insert(*asset, total);
    }

    fn leaderboard(&self, asset: &AssetId) -> Leaderboard {
        self.leaderboards.get(asset).copied().unwrap_or_default()
    }

    fn set_leaderboard(&mut self, asset: &AssetId, board: Leaderboard) {
        self.leaderboards.insert(*asset, board);
    }
}

/// Buffered writes produced by a [`Staged`] overlay
#[derive(Debug, Default)]
struct ChangeSet {
    positions: BTreeMap<(AssetId, Address), Position>,
    totals: BTreeMap<AssetId, Amount>,
    leaderboards: BTreeMap<AssetId, Leaderboard>,
}

/// Copy-on-write view over a committed [`BankState`].
///
/// Reads fall through to the base state; writes stay in the overlay until the
/// enclosing [`BankState::transact`] commits them.
pub struct Staged<'a> {
    base: &'a BankState,
    changes: ChangeSet,
}

impl<'a> Staged<'a> {
    fn new(base: &'a BankState) -> Self {
        Self {
            base,
            changes: ChangeSet::default(),
        }
    }

    fn into_changes(self) -> ChangeSet {
        self.changes
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.changes.positions.len() + self.changes.totals.len() + self.changes.leaderboards.len()
    }
}

impl PositionStore for Staged<'_> {
    fn position(&self, asset: &AssetId, owner: &Address) -> Position {
        match self.changes.positions.get(&(*asset, *owner)) {
            Some(position) => *position,
            None => self.base.position(asset, owner),
        }
    }

    fn set_position(&mut self, asset: &AssetId, owner: &Address, position: Position) {
        self.changes.positions.insert((*asset, *owner), position);
    }

    fn total_deposits(&self, asset: &AssetId) -> Amount {
        match self.changes.totals.get(asset) {
            Some(total) => *total,
            None => self.base.total_deposits(asset),
        }
    }

    fn set_total_deposits(&mut self, asset: &AssetId, total: Amount) {
        self.changes.totals.insert(*asset, total);
    }

    fn leaderboard(&self, asset: &AssetId) -> Leaderboard {
        match self.changes.leaderboards.get(asset) {
            Some(board) => *board,
            None => self.base.leaderboard(asset),
        }
    }

    fn set_leaderboard(&mut self, asset: &AssetId, board: Leaderboard) {
        self.changes.leaderboards.insert(*asset, board);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> AssetId {
        AssetId::token(Address::from_seed("usdc"))
    }

    #[test]
    fn test_transact_commits_on_success() {
        let mut state = BankState::new();
        let alice = Address::from_seed("alice");

        state
            .transact(|staged| {
                staged.set_position(
                    &asset(),
                    &alice,
                    Position {
                        principal: 10,
                        settled_interest: 0,
                        last_settlement: 5,
                    },
                );
                staged.set_total_deposits(&asset(), 10);
                Ok(())
            })
            .unwrap();

        assert_eq!(state.position(&asset(), &alice).principal, 10);
        assert_eq!(state.total_deposits(&asset()), 10);
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_transact_discards_on_error() {
        let mut state = BankState::new();
        let alice = Address::from_seed("alice");
        let before = state.clone();

        let result: Result<()> = state.transact(|staged| {
            staged.set_total_deposits(&asset(), 99);
            assert_eq!(staged.total_deposits(&asset()), 99);
            Err(BankError::ExternalTransferFailed("refused".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(state, before);
        assert_eq!(state.position(&asset(), &alice), Position::default());
    }

    #[test]
    fn test_staged_reads_fall_through() {
        let mut state = BankState::new();
        let bob = Address::from_seed("bob");
        state.set_total_deposits(&asset(), 42);

        state
            .transact(|staged| {
                assert_eq!(staged.total_deposits(&asset()), 42);
                assert_eq!(staged.pending_writes(), 0);
                assert_eq!(staged.position(&asset(), &bob), Position::default());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_zeroed_positions_are_pruned() {
        let mut state = BankState::new();
        let alice = Address::from_seed("alice");
        state.set_position(
            &asset(),
            &alice,
            Position {
                principal: 1,
                settled_interest: 0,
                last_settlement: 1,
            },
        );
        assert_eq!(state.positions(&asset()).len(), 1);

        state.set_position(&asset(), &alice, Position::default());
        assert!(state.positions(&asset()).is_empty());
    }

    #[test]
    fn test_broken_books_report_invariant_violation() {
        let mut state = BankState::new();
        let alice = Address::from_seed("alice");
        state.set_position(
            &asset(),
            &alice,
            Position {
                principal: 10,
                settled_interest: 0,
                last_settlement: 5,
            },
        );
        state.set_total_deposits(&asset(), 7);
        assert!(matches!(
            state.check_invariants(),
            Err(BankError::InvariantViolated(_))
        ));

        state.set_total_deposits(&asset(), 10);
        state.set_position(
            &asset(),
            &alice,
            Position {
                principal: 10,
                settled_interest: 0,
                last_settlement: 0,
            },
        );
        assert!(matches!(
            state.check_invariants(),
            Err(BankError::InvariantViolated(_))
        ));
    }
}
