//! Balance ledger: principal per (asset, owner) and the per-asset aggregate.
//!
//! Pure state mutations. Callers settle accrual first (see `operations`).

use crate::error::{BankError, Result};
use crate::state::PositionStore;
use crate::types::{Address, Amount, AssetId};

/// Add `amount` to the owner's principal and the asset total. Returns the new principal.
pub fn credit<S: PositionStore>(
    store: &mut S,
    asset: &AssetId,
    owner: &Address,
    amount: Amount,
) -> Result<Amount> {
    let mut position = store.position(asset, owner);
    position.principal = position
        .principal
        .checked_add(amount)
        .ok_or(BankError::ArithmeticOverflow("principal"))?;

    let total = store
        .total_deposits(asset)
        .checked_add(amount)
        .ok_or(BankError::ArithmeticOverflow("total deposits"))?;

    store.set_position(asset, owner, position);
    store.set_total_deposits(asset, total);
    Ok(position.principal)
}

/// Remove `amount` from the owner's principal and the asset total. Returns the new principal.
pub fn debit<S: PositionStore>(
    store: &mut S,
    asset: &AssetId,
    owner: &Address,
    amount: Amount,
) -> Result<Amount> {
    let mut position = store.position(asset, owner);
    if amount > position.principal {
        return Err(BankError::InsufficientBalance {
            requested: amount,
            available: position.principal,
        });
    }
    position.principal -= amount;

    let total = store
        .total_deposits(asset)
        .checked_sub(amount)
        .ok_or(BankError::ArithmeticOverflow("total deposits underflow"))?;

    store.set_position(asset, owner, position);
    store.set_total_deposits(asset, total);
    Ok(position.principal)
}
