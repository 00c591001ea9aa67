//! In-memory fungible token
//!
//! Implements the collaborator interfaces the banks depend on: transfers,
//! allowances, signed permits and receiver notifications. Also carries knobs
//! to misbehave (transfer fees, refused transfers) so the banks' defenses can
//! be exercised.

use crate::error::{PermitError, Result, TokenError};
use crate::keys;
use crate::permit::permit_digest;
use custody_core::{
    verify_acknowledgement, Address, Amount, CallContext, Clock, Permit, PermitCheckpoint,
    PermitVerifier, Timestamp, TokenHoldings, TokenReceiver, TokenTransfer,
};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Basis-point denominator for transfer fees
pub const FEE_DENOMINATOR: u128 = 10_000;

pub struct InMemoryToken {
    address: Address,
    symbol: String,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    nonces: HashMap<Address, u64>,
    total_supply: Amount,
    fee_bps: u32,
    refuse_next: u32,
    receivers: HashMap<Address, Box<dyn TokenReceiver>>,
    clock: Rc<dyn Clock>,
}

/// Balances touched by one transfer, for undoing it
struct Checkpoint {
    from: (Address, Option<Amount>),
    to: (Address, Option<Amount>),
    total_supply: Amount,
}

impl InMemoryToken {
    pub fn new(address: Address, symbol: &str, clock: Rc<dyn Clock>) -> Self {
        Self {
            address,
            symbol: symbol.to_string(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
            nonces: HashMap::new(),
            total_supply: 0,
            fee_bps: 0,
            refuse_next: 0,
            receivers: HashMap::new(),
            clock,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Next permit nonce for `owner`
    pub fn nonce(&self, owner: &Address) -> u64 {
        self.nonces.get(owner).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<()> {
        if to.is_zero() {
            return Err(TokenError::InvalidRecipient);
        }
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        let balance = self.balances.entry(*to).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        Ok(())
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances.insert((*owner, *spender), amount);
    }

    /// Burn `bps` basis points of every transfer, like a fee-on-transfer token
    pub fn set_fee_bps(&mut self, bps: u32) {
        self.fee_bps = bps.min(FEE_DENOMINATOR as u32);
    }

    /// Make the next `count` transfers fail before moving anything
    pub fn refuse_next_transfers(&mut self, count: u32) {
        self.refuse_next = count;
    }

    /// Treat `account` as a contract that must acknowledge incoming transfers
    pub fn register_receiver(&mut self, account: Address, receiver: Box<dyn TokenReceiver>) {
        self.receivers.insert(account, receiver);
    }

    pub fn is_contract(&self, account: &Address) -> bool {
        self.receivers.contains_key(account)
    }

    /// Transfer to `to` and notify `receiver` on its behalf (push deposit).
    ///
    /// The transfer is undone unless the receiver acknowledges it.
    pub fn transfer_and_call(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
        data: &[u8],
        receiver: &mut dyn TokenReceiver,
    ) -> Result<()> {
        let checkpoint = self.move_balance(from, to, amount)?;

        let ctx = CallContext::new(self.address, self.clock.now());
        let response = receiver.on_transfer_received(&ctx, &*self, from, from, amount, data);
        if let Err(e) = verify_acknowledgement(response) {
            warn!(token = %self.symbol, ?to, error = %e, "push transfer rejected, reverting");
            self.restore(checkpoint);
            return Err(TokenError::ReceiverRejected(e.to_string()));
        }
        Ok(())
    }

    fn take_refusal(&mut self) -> Result<()> {
        if self.refuse_next > 0 {
            self.refuse_next -= 1;
            return Err(TokenError::Refused(format!("{} transfer refused", self.symbol)));
        }
        Ok(())
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<Checkpoint> {
        if to.is_zero() {
            return Err(TokenError::InvalidRecipient);
        }
        let available = self.balance_of(from);
        if amount > available {
            return Err(TokenError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let checkpoint = Checkpoint {
            from: (*from, self.balances.get(from).copied()),
            to: (*to, self.balances.get(to).copied()),
            total_supply: self.total_supply,
        };

        let fee = amount * self.fee_bps as Amount / FEE_DENOMINATOR;
        self.balances.insert(*from, available - amount);
        let received = match self.balance_of(to).checked_add(amount - fee) {
            Some(received) => received,
            None => {
                self.restore(checkpoint);
                return Err(TokenError::Overflow);
            }
        };
        self.balances.insert(*to, received);
        self.total_supply -= fee;

        debug!(token = %self.symbol, ?from, ?to, amount, fee, "transfer");
        Ok(checkpoint)
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        for (account, balance) in [checkpoint.to, checkpoint.from] {
            match balance {
                Some(balance) => self.balances.insert(account, balance),
                None => self.balances.remove(&account),
            };
        }
        self.total_supply = checkpoint.total_supply;
    }

    /// Notify a registered contract receiver, undoing the transfer on rejection
    fn notify_registered(
        &mut self,
        checkpoint: Checkpoint,
        operator: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<()> {
        let mut receiver = match self.receivers.remove(to) {
            Some(receiver) => receiver,
            None => return Ok(()),
        };

        let ctx = CallContext::new(self.address, self.clock.now());
        let response = receiver.on_transfer_received(&ctx, &*self, operator, from, amount, &[]);
        self.receivers.insert(*to, receiver);

        if let Err(e) = verify_acknowledgement(response) {
            warn!(token = %self.symbol, ?to, error = %e, "receiver rejected transfer, reverting");
            self.restore(checkpoint);
            return Err(TokenError::ReceiverRejected(e.to_string()));
        }
        Ok(())
    }
}

impl TokenHoldings for InMemoryToken {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }
}

impl TokenTransfer for InMemoryToken {
    type Error = TokenError;

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        self.take_refusal()?;
        let checkpoint = self.move_balance(from, to, amount)?;
        self.notify_registered(checkpoint, from, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<()> {
        self.take_refusal()?;
        let allowance = self.allowance(owner, spender);
        if amount > allowance {
            return Err(TokenError::InsufficientAllowance {
                requested: amount,
                available: allowance,
            });
        }

        let checkpoint = self.move_balance(owner, to, amount)?;
        self.notify_registered(checkpoint, spender, owner, to, amount)?;
        self.allowances.insert((*owner, *spender), allowance - amount);
        Ok(())
    }
}

impl PermitVerifier for InMemoryToken {
    type Error = PermitError;

    fn permit(&mut self, permit: &Permit, now: Timestamp) -> std::result::Result<(), PermitError> {
        if now > permit.deadline {
            return Err(PermitError::Expired {
                deadline: permit.deadline,
                now,
            });
        }

        let nonce = self.nonce(&permit.owner);
        let digest = permit_digest(
            &self.address,
            &permit.owner,
            &permit.spender,
            permit.amount,
            nonce,
            permit.deadline,
        );
        keys::verify(&permit.owner, &digest, &permit.signature)?;

        self.nonces.insert(permit.owner, nonce + 1);
        self.allowances
            .insert((permit.owner, permit.spender), permit.amount);
        debug!(token = %self.symbol, owner = ?permit.owner, amount = permit.amount, "permit accepted");
        Ok(())
    }

    fn permit_checkpoint(&self, owner: &Address, spender: &Address) -> PermitCheckpoint {
        PermitCheckpoint {
            owner: *owner,
            spender: *spender,
            nonce: self.nonce(owner),
            allowance: self.allowance(owner, spender),
        }
    }

    fn restore_permit(&mut self, checkpoint: &PermitCheckpoint) {
        self.nonces.insert(checkpoint.owner, checkpoint.nonce);
        self.allowances
            .insert((checkpoint.owner, checkpoint.spender), checkpoint.allowance);
        debug!(token = %self.symbol, owner = ?checkpoint.owner, nonce = checkpoint.nonce, "permit rolled back");
    }
}

impl std::fmt::Debug for InMemoryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryToken")
            .field("address", &self.address)
            .field("symbol", &self.symbol)
            .field("total_supply", &self.total_supply)
            .field("holders", &self.balances.len())
            .field("fee_bps", &self.fee_bps)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;
    use crate::permit::sign_permit;
    use custody_core::constants::TRANSFER_RECEIVED_ACK;
    use custody_core::{BankError, ManualClock};

    const T0: Timestamp = 1_700_000_000;

    fn token() -> InMemoryToken {
        InMemoryToken::new(
            Address::from_seed("usdc"),
            "USDC",
            Rc::new(ManualClock::new(T0)),
        )
    }

    struct FixedReply([u8; 4]);

    impl TokenReceiver for FixedReply {
        fn on_transfer_received(
            &mut self,
            _ctx: &CallContext,
            _holdings: &dyn TokenHoldings,
            _operator: &Address,
            _from: &Address,
            _amount: Amount,
            _data: &[u8],
        ) -> custody_core::Result<[u8; 4]> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl TokenReceiver for Failing {
        fn on_transfer_received(
            &mut self,
            _ctx: &CallContext,
            _holdings: &dyn TokenHoldings,
            _operator: &Address,
            _from: &Address,
            _amount: Amount,
            _data: &[u8],
        ) -> custody_core::Result<[u8; 4]> {
            Err(BankError::Paused)
        }
    }

    #[test]
    fn test_transfer_and_allowance() {
        let mut token = token();
        let alice = Address::from_seed("alice");
        let bob = Address::from_seed("bob");
        let bank = Address::from_seed("bank");
        token.mint(&alice, 100).unwrap();

        token.transfer(&alice, &bob, 30).unwrap();
        assert_eq!(token.balance_of(&alice), 70);
        assert_eq!(token.balance_of(&bob), 30);

        assert!(matches!(
            token.transfer_from(&bank, &alice, &bank, 10),
            Err(TokenError::InsufficientAllowance { .. })
        ));
        token.approve(&alice, &bank, 20);
        token.transfer_from(&bank, &alice, &bank, 15).unwrap();
        assert_eq!(token.allowance(&alice, &bank), 5);
        assert_eq!(token.balance_of(&bank), 15);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_fee_on_transfer_burns() {
        let mut token = token();
        let alice = Address::from_seed("alice");
        let bob = Address::from_seed("bob");
        token.mint(&alice, 10_000).unwrap();
        token.set_fee_bps(100);

        token.transfer(&alice, &bob, 1_000).unwrap();

        assert_eq!(token.balance_of(&bob), 990);
        assert_eq!(token.total_supply(), 9_990);
    }

    #[test]
    fn test_refused_transfer_moves_nothing() {
        let mut token = token();
        let alice = Address::from_seed("alice");
        token.mint(&alice, 100).unwrap();
        token.refuse_next_transfers(1);

        assert!(matches!(
            token.transfer(&alice, &Address::from_seed("bob"), 10),
            Err(TokenError::Refused(_))
        ));
        assert_eq!(token.balance_of(&alice), 100);
        token.transfer(&alice, &Address::from_seed("bob"), 10).unwrap();
    }

    #[test]
    fn test_contract_receiver_must_acknowledge() {
        let mut token = token();
        let alice = Address::from_seed("alice");
        let good = Address::from_seed("good-contract");
        let bad = Address::from_seed("bad-contract");
        let broken = Address::from_seed("broken-contract");
        token.mint(&alice, 100).unwrap();
        token.register_receiver(good, Box::new(FixedReply(TRANSFER_RECEIVED_ACK)));
        token.register_receiver(bad, Box::new(FixedReply([0xde, 0xad, 0xbe, 0xef])));
        token.register_receiver(broken, Box::new(Failing));

        token.transfer(&alice, &good, 10).unwrap();
        assert!(matches!(
            token.transfer(&alice, &bad, 10),
            Err(TokenError::ReceiverRejected(_))
        ));
        assert!(matches!(
            token.transfer(&alice, &broken, 10),
            Err(TokenError::ReceiverRejected(_))
        ));

        assert_eq!(token.balance_of(&alice), 90);
        assert_eq!(token.balance_of(&bad), 0);
        assert_eq!(token.balance_of(&broken), 0);
        assert!(token.is_contract(&bad));
    }

    #[test]
    fn test_permit_grants_allowance_once() {
        let mut token = token();
        let owner = Keypair::from_seed("alice");
        let spender = Address::from_seed("bank");
        let permit = sign_permit(&owner, &token.address(), &spender, 50, 0, T0 + 60);

        token.permit(&permit, T0).unwrap();
        assert_eq!(token.allowance(&owner.address(), &spender), 50);
        assert_eq!(token.nonce(&owner.address()), 1);

        // Replaying the same signature fails: the nonce moved on
        assert_eq!(token.permit(&permit, T0), Err(PermitError::InvalidSignature));
    }

    #[test]
    fn test_restore_permit_reopens_nonce() {
        let mut token = token();
        let owner = Keypair::from_seed("alice");
        let spender = Address::from_seed("bank");
        token.approve(&owner.address(), &spender, 7);
        let permit = sign_permit(&owner, &token.address(), &spender, 50, 0, T0 + 60);

        let checkpoint = token.permit_checkpoint(&owner.address(), &spender);
        token.permit(&permit, T0).unwrap();
        token.restore_permit(&checkpoint);

        assert_eq!(token.nonce(&owner.address()), 0);
        assert_eq!(token.allowance(&owner.address(), &spender), 7);
        token.permit(&permit, T0).unwrap();
        assert_eq!(token.allowance(&owner.address(), &spender), 50);
    }

    #[test]
    fn test_permit_expired() {
        let mut token = token();
        let owner = Keypair::from_seed("alice");
        let spender = Address::from_seed("bank");
        let permit = sign_permit(&owner, &token.address(), &spender, 50, 0, T0);

        assert_eq!(
            token.permit(&permit, T0 + 1),
            Err(PermitError::Expired {
                deadline: T0,
                now: T0 + 1
            })
        );
        assert_eq!(token.nonce(&owner.address()), 0);
    }

    #[test]
    fn test_permit_wrong_signer() {
        let mut token = token();
        let owner = Keypair::from_seed("alice");
        let mallory = Keypair::from_seed("mallory");
        let spender = Address::from_seed("bank");

        let mut permit = sign_permit(&mallory, &token.address(), &spender, 50, 0, T0 + 60);
        permit.owner = owner.address();

        assert_eq!(token.permit(&permit, T0), Err(PermitError::InvalidSignature));
        assert_eq!(token.allowance(&owner.address(), &spender), 0);
    }
}
