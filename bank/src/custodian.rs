//! Custodial bank facade
//!
//! Every state-changing entry point follows the same shape: check the gates,
//! stage the core mutation, run the external call inside the same
//! transaction, and only then commit the state and append events. A failure
//! at any step leaves the committed state and the event log untouched.

use crate::access::AccessControl;
use crate::config::BankConfig;
use crate::events::{BankEvent, EventLog, EventRecord};
use custody_core::accrual;
use custody_core::constants::TRANSFER_RECEIVED_ACK;
use custody_core::operations::{self, DepositOutcome, WithdrawalOutcome};
use custody_core::{
    Address, Amount, AssetId, BankError, BankState, CallContext, InterestRate, Leaderboard,
    Permit, PermitVerifier, Position, PositionStore, Result, Timestamp, TokenHoldings,
    TokenReceiver, TokenTransfer,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, info, warn};

/// Interest-bearing custodian for token and native deposits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Custodian {
    address: Address,
    access: AccessControl,
    rate: InterestRate,
    state: BankState,
    /// Owner-funded pool interest is paid from, per asset
    reserves: BTreeMap<AssetId, Amount>,
    events: EventLog,
}

/// Everything needed to rebuild a [`Custodian`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianSnapshot {
    pub address: Address,
    pub access: AccessControl,
    pub rate: InterestRate,
    pub state: BankState,
    pub reserves: BTreeMap<AssetId, Amount>,
    pub events: EventLog,
}

fn external<E: Display>(e: E) -> BankError {
    BankError::ExternalTransferFailed(e.to_string())
}

fn ensure_token_asset(asset: &AssetId) -> Result<()> {
    if asset.is_native() {
        return Err(BankError::InvalidArgument(
            "native asset is handled by the native entry points".to_string(),
        ));
    }
    Ok(())
}

/// Pull `amount` from `owner` and check that all of it arrived.
///
/// Tokens that take a cut in transit would leave the books ahead of the
/// holdings, so any shortfall is sent back and the deposit refused.
fn pull_exact<T>(token: &mut T, custodian: &Address, owner: &Address, amount: Amount) -> Result<()>
where
    T: TokenTransfer + ?Sized,
{
    let before = token.balance_of(custodian);
    token
        .transfer_from(custodian, owner, custodian, amount)
        .map_err(external)?;
    let received = token.balance_of(custodian).saturating_sub(before);

    if received < amount {
        warn!(?owner, claimed = amount, received, "short receipt, refunding");
        if received > 0 {
            token.transfer(custodian, owner, received).map_err(|e| {
                warn!(?owner, received, error = %e, "refund of short receipt failed");
                external(e)
            })?;
        }
        return Err(BankError::ReceiptMismatch {
            claimed: amount,
            observed: received,
        });
    }
    Ok(())
}

impl Custodian {
    pub fn new(address: Address, owner: Address, rate: InterestRate) -> Result<Self> {
        if address.is_zero() {
            return Err(BankError::InvalidArgument("zero custodian address".to_string()));
        }
        rate.validate()?;

        Ok(Self {
            address,
            access: AccessControl::new(owner, false)?,
            rate,
            state: BankState::new(),
            reserves: BTreeMap::new(),
            events: EventLog::new(),
        })
    }

    pub fn from_config(config: &BankConfig) -> Result<Self> {
        let mut custodian = Self::new(config.custodian, config.owner, config.rate())?;
        if config.start_paused {
            custodian.access = AccessControl::new(config.owner, true)?;
        }
        info!(
            custodian = %custodian.address,
            owner = %config.owner,
            paused = config.start_paused,
            "custodian created"
        );
        Ok(custodian)
    }

    pub fn snapshot(&self) -> CustodianSnapshot {
        CustodianSnapshot {
            address: self.address,
            access: self.access,
            rate: self.rate,
            state: self.state.clone(),
            reserves: self.reserves.clone(),
            events: self.events.clone(),
        }
    }

    /// Rebuild from a snapshot, refusing one whose books do not add up
    pub fn restore(snapshot: CustodianSnapshot) -> Result<Self> {
        snapshot.rate.validate()?;
        snapshot.state.check_invariants()?;

        Ok(Self {
            address: snapshot.address,
            access: snapshot.access,
            rate: snapshot.rate,
            state: snapshot.state,
            reserves: snapshot.reserves,
            events: snapshot.events,
        })
    }

    // ---- Deposits ----

    /// Pull path: move `amount` of the caller's tokens in via their allowance
    pub fn deposit<T>(
        &mut self,
        ctx: &CallContext,
        token: &mut T,
        asset: AssetId,
        amount: Amount,
    ) -> Result<DepositOutcome>
    where
        T: TokenTransfer + ?Sized,
    {
        self.access.ensure_active()?;
        ensure_token_asset(&asset)?;

        let custodian = self.address;
        let rate = self.rate;
        let outcome = self.state.transact(|staged| {
            let outcome =
                operations::deposit(staged, &rate, &asset, &ctx.caller, amount, ctx.timestamp)?;
            pull_exact(token, &custodian, &ctx.caller, amount)?;
            Ok(outcome)
        })?;

        self.record_deposit(ctx.timestamp, asset, ctx.caller, amount, &outcome);
        info!(%asset, account = %ctx.caller, amount, principal = outcome.principal, "deposit");
        Ok(outcome)
    }

    /// Pull path preceded by a signed allowance grant.
    ///
    /// If the pull fails the token's nonce and allowance are put back, so the
    /// permit can still be used.
    pub fn deposit_with_permit<T>(
        &mut self,
        ctx: &CallContext,
        token: &mut T,
        asset: AssetId,
        permit: &Permit,
    ) -> Result<DepositOutcome>
    where
        T: TokenTransfer + PermitVerifier + ?Sized,
    {
        self.access.ensure_active()?;
        ensure_token_asset(&asset)?;
        operations::validate_request(&asset, &ctx.caller, permit.amount, ctx.timestamp)?;

        if permit.owner != ctx.caller {
            return Err(BankError::AuthorizationFailed(
                "permit owner is not the caller".to_string(),
            ));
        }
        if permit.spender != self.address {
            return Err(BankError::AuthorizationFailed(
                "permit spender is not this custodian".to_string(),
            ));
        }
        let checkpoint = token.permit_checkpoint(&permit.owner, &permit.spender);
        token
            .permit(permit, ctx.timestamp)
            .map_err(|e| BankError::AuthorizationFailed(e.to_string()))?;
        debug!(%asset, owner = %permit.owner, amount = permit.amount, "permit accepted");

        match self.deposit(ctx, token, asset, permit.amount) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                token.restore_permit(&checkpoint);
                Err(e)
            }
        }
    }

    /// Push path: the asset contract (`ctx.caller`) reports that `amount`
    /// already arrived from `from`.
    ///
    /// Accepted only if the custodian's holdings cover everything already on
    /// the books plus `amount`.
    pub fn receive_transfer(
        &mut self,
        ctx: &CallContext,
        holdings: &dyn TokenHoldings,
        operator: &Address,
        from: &Address,
        amount: Amount,
        data: &[u8],
    ) -> Result<[u8; 4]> {
        self.access.ensure_active()?;
        let asset = AssetId::token(ctx.caller);
        ensure_token_asset(&asset)?;
        debug!(%asset, ?operator, data_len = data.len(), "transfer notification");

        self.credit_received(ctx.timestamp, holdings, asset, *from, amount)?;
        Ok(TRANSFER_RECEIVED_ACK)
    }

    /// Native deposit: the host has already moved `ctx.value` to the custodian
    pub fn deposit_native(
        &mut self,
        ctx: &CallContext,
        native: &dyn TokenHoldings,
    ) -> Result<DepositOutcome> {
        self.access.ensure_active()?;
        self.credit_received(ctx.timestamp, native, AssetId::NATIVE, ctx.caller, ctx.value)
    }

    fn credit_received(
        &mut self,
        now: Timestamp,
        holdings: &dyn TokenHoldings,
        asset: AssetId,
        account: Address,
        amount: Amount,
    ) -> Result<DepositOutcome> {
        operations::validate_request(&asset, &account, amount, now)?;

        let booked = self
            .state
            .total_deposits(&asset)
            .checked_add(self.reserves(&asset))
            .ok_or(BankError::ArithmeticOverflow("booked holdings"))?;
        let required = booked
            .checked_add(amount)
            .ok_or(BankError::ArithmeticOverflow("booked holdings"))?;
        let observed = holdings.balance_of(&self.address);
        if observed < required {
            warn!(%asset, claimed = amount, observed, booked, "receipt not backed by holdings");
            return Err(BankError::ReceiptMismatch {
                claimed: amount,
                observed: observed.saturating_sub(booked),
            });
        }

        let rate = self.rate;
        let outcome = self
            .state
            .transact(|staged| operations::deposit(staged, &rate, &asset, &account, amount, now))?;

        self.record_deposit(now, asset, account, amount, &outcome);
        info!(%asset, %account, amount, principal = outcome.principal, "deposit received");
        Ok(outcome)
    }

    // ---- Withdrawals ----

    /// Pay out `amount` of principal plus interest, interest first
    pub fn withdraw<T>(
        &mut self,
        ctx: &CallContext,
        token: &mut T,
        asset: AssetId,
        amount: Amount,
    ) -> Result<WithdrawalOutcome>
    where
        T: TokenTransfer + ?Sized,
    {
        ensure_token_asset(&asset)?;
        self.pay_out(ctx, token, asset, amount)
    }

    pub fn withdraw_native<T>(
        &mut self,
        ctx: &CallContext,
        native: &mut T,
        amount: Amount,
    ) -> Result<WithdrawalOutcome>
    where
        T: TokenTransfer + ?Sized,
    {
        self.pay_out(ctx, native, AssetId::NATIVE, amount)
    }

    fn pay_out<T>(
        &mut self,
        ctx: &CallContext,
        token: &mut T,
        asset: AssetId,
        amount: Amount,
    ) -> Result<WithdrawalOutcome>
    where
        T: TokenTransfer + ?Sized,
    {
        self.access.ensure_active()?;

        let custodian = self.address;
        let rate = self.rate;
        let reserve = self.reserves(&asset);
        let (outcome, remaining) = self.state.transact(|staged| {
            let outcome =
                operations::withdraw(staged, &rate, &asset, &ctx.caller, amount, ctx.timestamp)?;

            // Interest is only ever paid out of the owner-funded reserve
            let interest_used = outcome.allocation.interest_used;
            let remaining = reserve.checked_sub(interest_used).ok_or_else(|| {
                warn!(%asset, interest_used, reserve, "interest not covered by reserves");
                BankError::InsufficientReserves {
                    requested: interest_used,
                    available: reserve,
                }
            })?;

            token
                .transfer(&custodian, &ctx.caller, amount)
                .map_err(external)?;
            Ok((outcome, remaining))
        })?;

        let interest_used = outcome.allocation.interest_used;
        if interest_used > 0 {
            self.reserves.insert(asset, remaining);
        }

        if outcome.accrued > 0 {
            self.events.append(
                ctx.timestamp,
                BankEvent::InterestSettled {
                    asset,
                    account: ctx.caller,
                    amount: outcome.accrued,
                },
            );
        }
        self.events.append(
            ctx.timestamp,
            BankEvent::Withdrawn {
                asset,
                account: ctx.caller,
                amount,
                interest_used,
                principal_used: outcome.allocation.principal_used,
            },
        );
        info!(
            %asset,
            account = %ctx.caller,
            amount,
            interest_used,
            principal_used = outcome.allocation.principal_used,
            "withdrawal"
        );
        Ok(outcome)
    }

    // ---- Reserves ----

    /// Owner tops up the pool interest is paid from
    pub fn fund_reserves<T>(
        &mut self,
        ctx: &CallContext,
        token: &mut T,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Amount>
    where
        T: TokenTransfer + ?Sized,
    {
        self.access.ensure_owner(&ctx.caller)?;
        ensure_token_asset(&asset)?;
        operations::validate_request(&asset, &ctx.caller, amount, ctx.timestamp)?;

        let funded = self
            .reserves(&asset)
            .checked_add(amount)
            .ok_or(BankError::ArithmeticOverflow("reserves"))?;
        pull_exact(token, &self.address, &ctx.caller, amount)?;

        self.commit_reserves(ctx, asset, amount, funded);
        Ok(funded)
    }

    /// Owner tops up the native reserve with `ctx.value`, already moved by the host
    pub fn fund_native_reserves(
        &mut self,
        ctx: &CallContext,
        native: &dyn TokenHoldings,
    ) -> Result<Amount> {
        self.access.ensure_owner(&ctx.caller)?;
        let asset = AssetId::NATIVE;
        let amount = ctx.value;
        operations::validate_request(&asset, &ctx.caller, amount, ctx.timestamp)?;

        let booked = self
            .state
            .total_deposits(&asset)
            .checked_add(self.reserves(&asset))
            .ok_or(BankError::ArithmeticOverflow("booked holdings"))?;
        let funded = self
            .reserves(&asset)
            .checked_add(amount)
            .ok_or(BankError::ArithmeticOverflow("reserves"))?;
        let observed = native.balance_of(&self.address);
        if observed < booked.saturating_add(amount) {
            return Err(BankError::ReceiptMismatch {
                claimed: amount,
                observed: observed.saturating_sub(booked),
            });
        }

        self.commit_reserves(ctx, asset, amount, funded);
        Ok(funded)
    }

    fn commit_reserves(&mut self, ctx: &CallContext, asset: AssetId, amount: Amount, funded: Amount) {
        self.reserves.insert(asset, funded);
        self.events.append(
            ctx.timestamp,
            BankEvent::ReservesFunded {
                asset,
                from: ctx.caller,
                amount,
            },
        );
        info!(%asset, amount, reserves = funded, "reserves funded");
    }

    // ---- Admin ----

    pub fn pause(&mut self, ctx: &CallContext) -> Result<()> {
        self.access.pause(&ctx.caller)?;
        self.events
            .append(ctx.timestamp, BankEvent::Paused { by: ctx.caller });
        info!(by = %ctx.caller, "custodian paused");
        Ok(())
    }

    pub fn unpause(&mut self, ctx: &CallContext) -> Result<()> {
        self.access.unpause(&ctx.caller)?;
        self.events
            .append(ctx.timestamp, BankEvent::Unpaused { by: ctx.caller });
        info!(by = %ctx.caller, "custodian unpaused");
        Ok(())
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<()> {
        let previous = self.access.transfer_ownership(&ctx.caller, new_owner)?;
        self.events.append(
            ctx.timestamp,
            BankEvent::OwnershipTransferred {
                previous,
                new_owner,
            },
        );
        info!(%previous, %new_owner, "ownership transferred");
        Ok(())
    }

    // ---- Views ----

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn is_paused(&self) -> bool {
        self.access.is_paused()
    }

    pub fn rate(&self) -> InterestRate {
        self.rate
    }

    pub fn state(&self) -> &BankState {
        &self.state
    }

    pub fn position(&self, asset: &AssetId, owner: &Address) -> Position {
        self.state.position(asset, owner)
    }

    pub fn principal(&self, asset: &AssetId, owner: &Address) -> Amount {
        self.position(asset, owner).principal
    }

    pub fn settled_interest(&self, asset: &AssetId, owner: &Address) -> Amount {
        self.position(asset, owner).settled_interest
    }

    pub fn pending_interest(&self, asset: &AssetId, owner: &Address, now: Timestamp) -> Result<Amount> {
        accrual::pending_interest(&self.position(asset, owner), &self.rate, now)
    }

    pub fn total_interest(&self, asset: &AssetId, owner: &Address, now: Timestamp) -> Result<Amount> {
        accrual::total_interest(&self.position(asset, owner), &self.rate, now)
    }

    /// Principal plus settled and pending interest: what a full withdrawal at `now` pays
    pub fn balance_with_interest(
        &self,
        asset: &AssetId,
        owner: &Address,
        now: Timestamp,
    ) -> Result<Amount> {
        self.principal(asset, owner)
            .checked_add(self.total_interest(asset, owner, now)?)
            .ok_or(BankError::ArithmeticOverflow("balance with interest"))
    }

    pub fn total_deposits(&self, asset: &AssetId) -> Amount {
        self.state.total_deposits(asset)
    }

    pub fn leaderboard(&self, asset: &AssetId) -> Leaderboard {
        self.state.leaderboard(asset)
    }

    pub fn reserves(&self, asset: &AssetId) -> Amount {
        self.reserves.get(asset).copied().unwrap_or(0)
    }

    /// Re-verify aggregates, settlement timers and leaderboards
    pub fn check_books(&self) -> Result<()> {
        self.state.check_invariants()
    }

    pub fn events(&self) -> &[EventRecord] {
        self.events.records()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    fn record_deposit(
        &mut self,
        now: Timestamp,
        asset: AssetId,
        account: Address,
        amount: Amount,
        outcome: &DepositOutcome,
    ) {
        if outcome.accrued > 0 {
            self.events.append(
                now,
                BankEvent::InterestSettled {
                    asset,
                    account,
                    amount: outcome.accrued,
                },
            );
        }
        self.events.append(
            now,
            BankEvent::Deposited {
                asset,
                account,
                amount,
                principal: outcome.principal,
            },
        );
        if outcome.rank.is_changed() {
            self.events.append(
                now,
                BankEvent::LeaderboardChanged {
                    asset,
                    change: outcome.rank,
                    board: self.state.leaderboard(&asset).accounts(),
                },
            );
        }
    }
}

impl TokenReceiver for Custodian {
    fn on_transfer_received(
        &mut self,
        ctx: &CallContext,
        holdings: &dyn TokenHoldings,
        operator: &Address,
        from: &Address,
        amount: Amount,
        data: &[u8],
    ) -> Result<[u8; 4]> {
        self.receive_transfer(ctx, holdings, operator, from, amount, data)
    }
}
