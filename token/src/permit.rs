//! Permit digests and signing

use crate::keys::Keypair;
use custody_core::{Address, Amount, Permit, Timestamp};
use sha2::{Digest, Sha256};

const PERMIT_DOMAIN: &[u8] = b"custody-permit-v1";

/// Message an owner signs to grant `spender` an allowance of `amount`.
///
/// Binds the token, the owner's current nonce and the deadline, so a
/// signature is valid for one use on one token only.
pub fn permit_digest(
    token: &Address,
    owner: &Address,
    spender: &Address,
    amount: Amount,
    nonce: u64,
    deadline: Timestamp,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(PERMIT_DOMAIN);
    hasher.update(token.as_bytes());
    hasher.update(owner.as_bytes());
    hasher.update(spender.as_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(deadline.to_be_bytes());
    hasher.finalize().into()
}

/// Build a signed permit for `owner`'s next nonce
pub fn sign_permit(
    owner: &Keypair,
    token: &Address,
    spender: &Address,
    amount: Amount,
    nonce: u64,
    deadline: Timestamp,
) -> Permit {
    let owner_address = owner.address();
    let digest = permit_digest(token, &owner_address, spender, amount, nonce, deadline);

    Permit {
        owner: owner_address,
        spender: *spender,
        amount,
        deadline,
        signature: owner.sign(&digest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_binds_nonce_and_token() {
        let token = Address::from_seed("usdc");
        let other = Address::from_seed("dai");
        let owner = Address::from_seed("alice");
        let spender = Address::from_seed("bank");

        let base = permit_digest(&token, &owner, &spender, 10, 0, 100);
        assert_ne!(base, permit_digest(&token, &owner, &spender, 10, 1, 100));
        assert_ne!(base, permit_digest(&other, &owner, &spender, 10, 0, 100));
        assert_eq!(base, permit_digest(&token, &owner, &spender, 10, 0, 100));
    }
}
