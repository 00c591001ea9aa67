//! Identifiers and call context shared by every bank component

use crate::constants::NATIVE_ASSET_BYTES;
use crate::error::BankError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Token amount in the asset's smallest unit
pub type Amount = u128;

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Opaque 32-byte account identifier.
///
/// Accounts backed by a signing key use the ed25519 verifying key bytes, so
/// permit signatures can be checked against the owner id directly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    /// Deterministic address derived from a label (test fixtures, scenario names)
    pub fn from_seed(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"custody-address:");
        hasher.update(seed.as_bytes());
        Address(hasher.finalize().into())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, BankError> {
        let trimmed = hex_str.trim_start_matches("0x");
        let bytes = hex::decode(trimmed)
            .map_err(|e| BankError::InvalidArgument(format!("Invalid address hex: {}", e)))?;
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            BankError::InvalidArgument("Address must be exactly 32 bytes".to_string())
        })?;
        Ok(Address(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 4 bytes are enough to tell accounts apart in logs
        write!(f, "Address(0x{}..)", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Address {
    type Err = BankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Asset dimension of the ledger: a token contract address or the native currency
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Address);

impl AssetId {
    pub const NATIVE: AssetId = AssetId(Address::new(NATIVE_ASSET_BYTES));

    pub fn token(contract: Address) -> Self {
        AssetId(contract)
    }

    pub fn address(&self) -> &Address {
        &self.0
    }

    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Address> for AssetId {
    fn from(address: Address) -> Self {
        AssetId(address)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "native")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "AssetId(native)")
        } else {
            write!(f, "AssetId({:?})", self.0)
        }
    }
}

/// Who is calling, when, and with how much attached native value.
///
/// The execution environment fills this in; the core only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    pub timestamp: Timestamp,
    pub value: Amount,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: Timestamp) -> Self {
        Self {
            caller,
            timestamp,
            value: 0,
        }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let address = Address::from_seed("alice");
        let parsed: Address = address.to_string().parse().unwrap();
        assert_eq!(parsed, address);
        assert!(!address.is_zero());
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!(Address::from_hex("abcd").is_err());
        assert!(Address::from_hex("zz").is_err());
    }

    #[test]
    fn test_native_asset() {
        assert!(AssetId::NATIVE.is_native());
        assert!(!AssetId::token(Address::from_seed("usdc")).is_native());
        assert_eq!(AssetId::NATIVE.to_string(), "native");
    }

    #[test]
    fn test_address_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(Address::from_seed("bob"), 7u64);
        let json = serde_json::to_string(&map).unwrap();
        let back: std::collections::BTreeMap<Address, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
