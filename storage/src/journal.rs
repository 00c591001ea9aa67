//! Sled-based journal of committed bank events
//!
//! Records are keyed by `event:` plus the big-endian sequence number, so a
//! prefix scan returns them in commit order.

use crate::error::{Result, StorageError};
use custody_bank::{EventLog, EventRecord};
use std::path::Path;
use tracing::debug;

const EVENT_PREFIX: &[u8] = b"event:";

#[derive(Debug, Clone)]
pub struct EventJournal {
    db: sled::Db,
    path: String,
}

fn event_key(sequence: u64) -> Vec<u8> {
    let mut key = EVENT_PREFIX.to_vec();
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

impl EventJournal {
    /// Open or create the journal
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = sled::open(&path)?;
        Ok(Self { db, path: path_str })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn append(&self, record: &EventRecord) -> Result<()> {
        let value = bincode::serialize(record)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.db.insert(event_key(record.sequence), value)?;
        self.db.flush()?;
        Ok(())
    }

    /// Append every record of `log` newer than the journal's last entry.
    /// Returns how many were written.
    pub fn sync_from(&self, log: &EventLog) -> Result<usize> {
        let start = match self.last_sequence()? {
            Some(last) => last + 1,
            None => 0,
        };

        let pending = log.since(start);
        let mut batch = sled::Batch::default();
        for record in pending {
            let value = bincode::serialize(record)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            batch.insert(event_key(record.sequence), value);
        }
        self.db.apply_batch(batch)?;
        self.db.flush()?;

        debug!(path = %self.path, written = pending.len(), "journal synced");
        Ok(pending.len())
    }

    pub fn load(&self, sequence: u64) -> Result<Option<EventRecord>> {
        match self.db.get(event_key(sequence))? {
            Some(data) => {
                let record = bincode::deserialize(&data)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Records with a sequence number of at least `sequence`, in order
    pub fn load_since(&self, sequence: u64) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        for item in self.db.range(event_key(sequence)..) {
            let (key, data) = item?;
            if !key.starts_with(EVENT_PREFIX) {
                break;
            }
            let record = bincode::deserialize(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn load_all(&self) -> Result<Vec<EventRecord>> {
        self.load_since(0)
    }

    pub fn last_sequence(&self) -> Result<Option<u64>> {
        let last = match self.db.scan_prefix(EVENT_PREFIX).next_back() {
            Some(item) => item?.0,
            None => return Ok(None),
        };
        let bytes: [u8; 8] = last[EVENT_PREFIX.len()..]
            .try_into()
            .map_err(|_| StorageError::Corrupt("malformed event key".to_string()))?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    pub fn len(&self) -> usize {
        self.db.scan_prefix(EVENT_PREFIX).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_bank::BankEvent;
    use custody_core::Address;
    use tempfile::tempdir;

    fn log_with(count: u64) -> EventLog {
        let mut log = EventLog::new();
        let by = Address::from_seed("owner");
        for i in 0..count {
            let event = if i % 2 == 0 {
                BankEvent::Paused { by }
            } else {
                BankEvent::Unpaused { by }
            };
            log.append(1_000 + i, event);
        }
        log
    }

    #[test]
    fn test_sync_is_incremental() {
        let dir = tempdir().unwrap();
        let journal = EventJournal::open(dir.path().join("journal")).unwrap();
        assert!(journal.is_empty());
        assert_eq!(journal.last_sequence().unwrap(), None);

        assert_eq!(journal.sync_from(&log_with(3)).unwrap(), 3);
        assert_eq!(journal.sync_from(&log_with(3)).unwrap(), 0);
        assert_eq!(journal.sync_from(&log_with(5)).unwrap(), 2);

        assert_eq!(journal.len(), 5);
        assert_eq!(journal.last_sequence().unwrap(), Some(4));
        assert_eq!(journal.load_all().unwrap(), log_with(5).records());
    }

    #[test]
    fn test_load_since_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");
        {
            let journal = EventJournal::open(&path).unwrap();
            journal.sync_from(&log_with(4)).unwrap();
        }

        let journal = EventJournal::open(&path).unwrap();
        let tail = journal.load_since(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 2);
        assert_eq!(journal.load(3).unwrap().map(|r| r.timestamp), Some(1_003));
        assert_eq!(journal.load(9).unwrap(), None);
    }

    #[test]
    fn test_single_append() {
        let dir = tempdir().unwrap();
        let journal = EventJournal::open(dir.path().join("journal")).unwrap();
        let log = log_with(1);

        journal.append(&log.records()[0]).unwrap();
        assert_eq!(journal.last_sequence().unwrap(), Some(0));
    }
}
