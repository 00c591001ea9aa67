//! Human and JSON views of a custodian's books

use custody_bank::Custodian;
use custody_core::{Address, Amount, AssetId, Result, Timestamp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionView {
    pub account: String,
    pub principal: Amount,
    pub settled_interest: Amount,
    pub pending_interest: Amount,
    pub last_settlement: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetView {
    pub asset: String,
    pub total_deposits: Amount,
    pub reserves: Amount,
    pub leaderboard: Vec<String>,
    pub positions: Vec<PositionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub custodian: String,
    pub owner: String,
    pub paused: bool,
    pub at: Timestamp,
    pub assets: Vec<AssetView>,
    pub events: usize,
}

fn label(names: &BTreeMap<Address, String>, address: &Address) -> String {
    names
        .get(address)
        .cloned()
        .unwrap_or_else(|| address.to_string())
}

fn asset_label(names: &BTreeMap<Address, String>, asset: &AssetId) -> String {
    if asset.is_native() {
        asset.to_string()
    } else {
        label(names, asset.address())
    }
}

impl Summary {
    /// Snapshot of every asset's books, with pending interest as of `at`
    pub fn of(custodian: &Custodian, names: &BTreeMap<Address, String>, at: Timestamp) -> Result<Self> {
        let mut assets = Vec::new();
        for asset in custodian.state().assets() {
            let mut positions = Vec::new();
            for (owner, position) in custodian.state().positions(&asset) {
                positions.push(PositionView {
                    account: label(names, &owner),
                    principal: position.principal,
                    settled_interest: position.settled_interest,
                    pending_interest: custodian.pending_interest(&asset, &owner, at)?,
                    last_settlement: position.last_settlement,
                });
            }

            assets.push(AssetView {
                asset: asset_label(names, &asset),
                total_deposits: custodian.total_deposits(&asset),
                reserves: custodian.reserves(&asset),
                leaderboard: custodian
                    .leaderboard(&asset)
                    .accounts()
                    .iter()
                    .map(|a| label(names, a))
                    .collect(),
                positions,
            });
        }

        Ok(Self {
            custodian: label(names, &custodian.address()),
            owner: label(names, &custodian.owner()),
            paused: custodian.is_paused(),
            at,
            assets,
            events: custodian.events().len(),
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Custodian: {}", self.custodian);
        let _ = writeln!(out, "Owner:     {}", self.owner);
        let _ = writeln!(out, "Paused:    {}", self.paused);
        let _ = writeln!(out, "As of:     {}", self.at);
        let _ = writeln!(out, "Events:    {}", self.events);

        for asset in &self.assets {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "[{}] deposits {}  reserves {}",
                asset.asset, asset.total_deposits, asset.reserves
            );
            let _ = writeln!(out, "  top: {}", asset.leaderboard.join(", "));
            for p in &asset.positions {
                let _ = writeln!(
                    out,
                    "  {:<20} principal {:>12}  settled {:>10}  pending {:>10}",
                    p.account, p.principal, p.settled_interest, p.pending_interest
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{CallContext, InterestRate};

    #[test]
    fn test_summary_labels_and_pending() {
        let owner = Address::from_seed("owner");
        let alice = Address::from_seed("alice");
        let mut bank = Custodian::new(Address::from_seed("bank"), owner, InterestRate::default()).unwrap();

        let mut native = custody_token::InMemoryToken::new(
            Address::from_seed("native"),
            "native",
            std::rc::Rc::new(custody_core::ManualClock::new(1)),
        );
        native.mint(&bank.address(), 2_000).unwrap();
        let ctx = CallContext::new(alice, 1_000).with_value(2_000);
        bank.deposit_native(&ctx, &native).unwrap();

        let mut names = BTreeMap::new();
        names.insert(alice, "alice".to_string());
        let summary = Summary::of(&bank, &names, 1_000 + 3 * 86_400).unwrap();

        assert_eq!(summary.owner, owner.to_string());
        assert_eq!(summary.assets.len(), 1);
        assert_eq!(summary.assets[0].asset, "native");
        assert_eq!(summary.assets[0].leaderboard, vec!["alice"]);
        assert_eq!(summary.assets[0].positions[0].pending_interest, 6);
        assert!(summary.render().contains("[native] deposits 2000"));
    }
}
