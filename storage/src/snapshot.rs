//! File-based custodian snapshots
//!
//! Each snapshot is written twice: pretty JSON for inspection and bincode for
//! fast loading. Loading prefers bincode and falls back to JSON.

use crate::error::{Result, StorageError};
use custody_bank::{Custodian, CustodianSnapshot};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    /// Open storage directory, creating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }
        Ok(Self { data_dir })
    }

    fn json_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", name))
    }

    fn bin_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.bin", name))
    }

    pub fn save_snapshot<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(self.json_path(name), json)?;

        let bin = bincode::serialize(data)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(self.bin_path(name), bin)?;

        debug!(name, dir = %self.data_dir.display(), "snapshot written");
        Ok(())
    }

    pub fn load_snapshot<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let bin_path = self.bin_path(name);
        if bin_path.exists() {
            let data = fs::read(&bin_path)?;
            return bincode::deserialize(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()));
        }

        let json_path = self.json_path(name);
        if json_path.exists() {
            let data = fs::read_to_string(&json_path)?;
            return serde_json::from_str(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()));
        }

        Err(StorageError::SnapshotNotFound(name.to_string()))
    }

    /// Load JSON only, ignoring the bincode copy (hand-edited snapshots)
    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let json_path = self.json_path(name);
        if !json_path.exists() {
            return Err(StorageError::SnapshotNotFound(name.to_string()));
        }
        let data = fs::read_to_string(&json_path)?;
        serde_json::from_str(&data).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    pub fn save_custodian(&self, name: &str, custodian: &Custodian) -> Result<()> {
        self.save_snapshot(name, &custodian.snapshot())?;
        info!(
            name,
            custodian = %custodian.address(),
            events = custodian.events().len(),
            "custodian saved"
        );
        Ok(())
    }

    /// Load a custodian, rejecting snapshots whose books do not add up
    pub fn load_custodian(&self, name: &str) -> Result<Custodian> {
        let snapshot: CustodianSnapshot = self.load_snapshot(name)?;
        Custodian::restore(snapshot).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    pub fn has_snapshot(&self, name: &str) -> bool {
        self.bin_path(name).exists() || self.json_path(name).exists()
    }

    /// Snapshot names, sorted
    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        let mut snapshots = Vec::new();

        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            let is_snapshot = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("bin")
            );
            if !is_snapshot {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                if !snapshots.iter().any(|s| s == name) {
                    snapshots.push(name.to_string());
                }
            }
        }

        snapshots.sort();
        Ok(snapshots)
    }

    pub fn delete_snapshot(&self, name: &str) -> Result<()> {
        for path in [self.bin_path(name), self.json_path(name)] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{Address, AssetId, CallContext, InterestRate, TokenHoldings, TokenTransfer};
    use std::collections::HashMap;
    use tempfile::tempdir;

    const T0: u64 = 1_700_000_000;

    #[derive(Default)]
    struct Ledger(HashMap<Address, u128>);

    impl TokenHoldings for Ledger {
        fn balance_of(&self, account: &Address) -> u128 {
            self.0.get(account).copied().unwrap_or(0)
        }
    }

    impl TokenTransfer for Ledger {
        type Error = std::io::Error;

        fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> std::io::Result<()> {
            *self.0.entry(*from).or_insert(0) -= amount;
            *self.0.entry(*to).or_insert(0) += amount;
            Ok(())
        }

        fn transfer_from(
            &mut self,
            _spender: &Address,
            owner: &Address,
            to: &Address,
            amount: u128,
        ) -> std::io::Result<()> {
            self.transfer(owner, to, amount)
        }
    }

    fn custodian_with_deposits() -> Custodian {
        let mut bank = Custodian::new(
            Address::from_seed("bank"),
            Address::from_seed("owner"),
            InterestRate::default(),
        )
        .unwrap();
        let mut token = Ledger::default();
        let asset = AssetId::token(Address::from_seed("usdc"));
        for (seed, amount) in [("alice", 500), ("bob", 900)] {
            let account = Address::from_seed(seed);
            token.0.insert(account, amount);
            bank.deposit(&CallContext::new(account, T0), &mut token, asset, amount)
                .unwrap();
        }
        bank
    }

    #[test]
    fn test_custodian_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let bank = custodian_with_deposits();

        store.save_custodian("bank", &bank).unwrap();
        assert_eq!(store.load_custodian("bank").unwrap(), bank);

        // JSON copy alone is enough
        fs::remove_file(store.bin_path("bank")).unwrap();
        assert_eq!(store.load_custodian("bank").unwrap(), bank);
    }

    #[test]
    fn test_tampered_snapshot_rejected() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let mut snapshot = custodian_with_deposits().snapshot();

        // Drop a position without touching the aggregate
        let mut json = serde_json::to_value(&snapshot.state).unwrap();
        json["positions"]
            .as_object_mut()
            .unwrap()
            .values_mut()
            .for_each(|owners| {
                let owners = owners.as_object_mut().unwrap();
                let first = owners.keys().next().cloned().unwrap();
                owners.remove(&first);
            });
        snapshot.state = serde_json::from_value(json).unwrap();
        store.save_snapshot("bank", &snapshot).unwrap();

        assert!(matches!(
            store.load_custodian("bank"),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        assert!(!store.has_snapshot("nope"));
        assert!(matches!(
            store.load_custodian("nope"),
            Err(StorageError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_list_and_delete() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("nested")).unwrap();
        let bank = custodian_with_deposits();

        store.save_custodian("b", &bank).unwrap();
        store.save_custodian("a", &bank).unwrap();
        fs::write(store.data_dir().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list_snapshots().unwrap(), vec!["a", "b"]);
        store.delete_snapshot("a").unwrap();
        assert_eq!(store.list_snapshots().unwrap(), vec!["b"]);
    }
}
