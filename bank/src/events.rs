//! Events emitted by committed bank operations

use custody_core::{Address, Amount, AssetId, RankChange, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankEvent {
    Deposited {
        asset: AssetId,
        account: Address,
        amount: Amount,
        principal: Amount,
    },
    Withdrawn {
        asset: AssetId,
        account: Address,
        amount: Amount,
        interest_used: Amount,
        principal_used: Amount,
    },
    InterestSettled {
        asset: AssetId,
        account: Address,
        amount: Amount,
    },
    LeaderboardChanged {
        asset: AssetId,
        change: RankChange,
        board: Vec<Address>,
    },
    ReservesFunded {
        asset: AssetId,
        from: Address,
        amount: Amount,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
    OwnershipTransferred {
        previous: Address,
        new_owner: Address,
    },
}

impl BankEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BankEvent::Deposited { .. } => "deposited",
            BankEvent::Withdrawn { .. } => "withdrawn",
            BankEvent::InterestSettled { .. } => "interest_settled",
            BankEvent::LeaderboardChanged { .. } => "leaderboard_changed",
            BankEvent::ReservesFunded { .. } => "reserves_funded",
            BankEvent::Paused { .. } => "paused",
            BankEvent::Unpaused { .. } => "unpaused",
            BankEvent::OwnershipTransferred { .. } => "ownership_transferred",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub event: BankEvent,
}

/// Append-only, sequence-numbered event log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
    next_sequence: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, timestamp: Timestamp, event: BankEvent) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.push(EventRecord {
            sequence,
            timestamp,
            event,
        });
        sequence
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with a sequence number of at least `sequence`
    pub fn since(&self, sequence: u64) -> &[EventRecord] {
        let start = self.records.partition_point(|r| r.sequence < sequence);
        &self.records[start..]
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers() {
        let mut log = EventLog::new();
        let by = Address::from_seed("owner");

        assert_eq!(log.append(10, BankEvent::Paused { by }), 0);
        assert_eq!(log.append(11, BankEvent::Unpaused { by }), 1);
        assert_eq!(log.next_sequence(), 2);

        let tail = log.since(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event.name(), "unpaused");
        assert!(log.since(5).is_empty());
    }

    #[test]
    fn test_event_json_is_keyed_by_name() {
        let event = BankEvent::ReservesFunded {
            asset: AssetId::NATIVE,
            from: Address::from_seed("owner"),
            amount: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json[event.name()]["amount"], 5);
    }
}
