//! Interfaces of the external collaborators the banks call into.
//!
//! None of them is trusted for bookkeeping: every call may fail, and the bank
//! only commits its staged writes once the call has succeeded.

use crate::constants::TRANSFER_RECEIVED_ACK;
use crate::error::{BankError, Result};
use crate::types::{Address, Amount, CallContext, Timestamp};
use serde::{Deserialize, Serialize};

/// Read-only view of an asset's holdings
pub trait TokenHoldings {
    fn balance_of(&self, account: &Address) -> Amount;
}

/// Fungible token transfer service
pub trait TokenTransfer: TokenHoldings {
    type Error: std::error::Error;

    /// Move `amount` out of `from`'s own balance (`from` is the calling account)
    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount)
        -> std::result::Result<(), Self::Error>;

    /// Move `amount` from `owner` to `to`, spending `spender`'s allowance
    fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> std::result::Result<(), Self::Error>;
}

/// Signed one-time allowance grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
    pub owner: Address,
    pub spender: Address,
    pub amount: Amount,
    pub deadline: Timestamp,
    pub signature: Vec<u8>,
}

/// Nonce and allowance a permit is about to overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitCheckpoint {
    pub owner: Address,
    pub spender: Address,
    pub nonce: u64,
    pub allowance: Amount,
}

/// Turns a [`Permit`] into an allowance of `amount` for `spender`
pub trait PermitVerifier {
    type Error: std::error::Error;

    fn permit(&mut self, permit: &Permit, now: Timestamp) -> std::result::Result<(), Self::Error>;

    fn permit_checkpoint(&self, owner: &Address, spender: &Address) -> PermitCheckpoint;

    /// Undo a [`permit`](Self::permit) whose deposit did not go through
    fn restore_permit(&mut self, checkpoint: &PermitCheckpoint);
}

/// Notification hook for contract-type destinations.
///
/// Must return [`TRANSFER_RECEIVED_ACK`] to accept; any other value or an
/// error rejects the whole transfer.
pub trait TokenReceiver {
    fn on_transfer_received(
        &mut self,
        ctx: &CallContext,
        holdings: &dyn TokenHoldings,
        operator: &Address,
        from: &Address,
        amount: Amount,
        data: &[u8],
    ) -> Result<[u8; 4]>;
}

/// Accept a receiver's response only if it is exactly the acknowledgment marker
pub fn verify_acknowledgement(response: Result<[u8; 4]>) -> Result<()> {
    match response {
        Ok(ack) if ack == TRANSFER_RECEIVED_ACK => Ok(()),
        Ok(ack) => Err(BankError::ExternalTransferFailed(format!(
            "receiver returned 0x{} instead of the acknowledgment",
            hex::encode(ack)
        ))),
        Err(e) => Err(BankError::ExternalTransferFailed(format!(
            "receiver rejected transfer: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgement() {
        assert!(verify_acknowledgement(Ok(TRANSFER_RECEIVED_ACK)).is_ok());
        assert!(matches!(
            verify_acknowledgement(Ok([0, 0, 0, 0])),
            Err(BankError::ExternalTransferFailed(_))
        ));
        assert!(matches!(
            verify_acknowledgement(Err(BankError::Paused)),
            Err(BankError::ExternalTransferFailed(_))
        ));
    }
}
