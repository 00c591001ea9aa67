//! Scripted scenarios: a custodian, some tokens and a list of steps, all
//! driven by a hand-advanced clock.
//!
//! ```toml
//! start = 1700000000
//!
//! [[tokens]]
//! symbol = "USDC"
//!
//! [[steps]]
//! action = "mint"
//! account = "alice"
//! token = "USDC"
//! amount = 1000
//!
//! [[steps]]
//! action = "deposit"
//! account = "alice"
//! token = "USDC"
//! amount = 1000
//!
//! [[steps]]
//! action = "advance"
//! days = 10
//! ```

use custody_bank::{BankConfig, ConfigError, Custodian, InterestConfig};
use custody_core::{
    Address, Amount, AssetId, BankError, CallContext, Clock, ManualClock, Timestamp,
    TokenTransfer,
};
use custody_token::{sign_permit, InMemoryToken, Keypair, TokenError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::{info, warn};

/// Token name that selects the native currency in steps
pub const NATIVE: &str = "native";

/// Account name that resolves to the custodian's current owner
pub const OWNER: &str = "owner";

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("Bank error: {0}")]
    Bank(#[from] BankError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),
}

pub type Result<T> = std::result::Result<T, ScenarioError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSetup {
    pub symbol: String,
    #[serde(default)]
    pub fee_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Mint {
        account: String,
        token: String,
        amount: u64,
    },
    Deposit {
        account: String,
        token: String,
        amount: u64,
    },
    DepositPermit {
        account: String,
        token: String,
        amount: u64,
        /// Seconds until the permit expires
        #[serde(default = "default_permit_ttl")]
        ttl: u64,
    },
    DepositPush {
        account: String,
        token: String,
        amount: u64,
    },
    DepositNative {
        account: String,
        amount: u64,
    },
    Withdraw {
        account: String,
        token: String,
        amount: u64,
    },
    WithdrawNative {
        account: String,
        amount: u64,
    },
    FundReserves {
        token: String,
        amount: u64,
    },
    Advance {
        #[serde(default)]
        days: u64,
        #[serde(default)]
        seconds: u64,
    },
    SetFee {
        token: String,
        bps: u32,
    },
    RefuseTransfers {
        token: String,
        count: u32,
    },
    Pause,
    Unpause,
}

fn default_permit_ttl() -> u64 {
    3600
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Mint { .. } => "mint",
            Step::Deposit { .. } => "deposit",
            Step::DepositPermit { .. } => "deposit_permit",
            Step::DepositPush { .. } => "deposit_push",
            Step::DepositNative { .. } => "deposit_native",
            Step::Withdraw { .. } => "withdraw",
            Step::WithdrawNative { .. } => "withdraw_native",
            Step::FundReserves { .. } => "fund_reserves",
            Step::Advance { .. } => "advance",
            Step::SetFee { .. } => "set_fee",
            Step::RefuseTransfers { .. } => "refuse_transfers",
            Step::Pause => "pause",
            Step::Unpause => "unpause",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_start")]
    pub start: Timestamp,
    /// Seed of the custodian account
    #[serde(default = "default_custodian")]
    pub custodian: String,
    /// Seed of the owner account
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub start_paused: bool,
    #[serde(default)]
    pub interest: InterestConfig,
    #[serde(default)]
    pub tokens: Vec<TokenSetup>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_start() -> Timestamp {
    1_700_000_000
}

fn default_custodian() -> String {
    "custodian".to_string()
}

fn default_owner() -> String {
    OWNER.to_string()
}

impl Scenario {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Bank configuration implied by the scenario's seeds
    pub fn bank_config(&self) -> BankConfig {
        BankConfig {
            custodian: Keypair::from_seed(&self.custodian).address(),
            owner: Keypair::from_seed(&self.owner).address(),
            start_paused: self.start_paused,
            interest: self.interest,
        }
    }
}

pub fn token_address(symbol: &str) -> Address {
    Address::from_seed(&format!("token:{}", symbol))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub timestamp: Timestamp,
    pub action: String,
    pub ok: bool,
    pub detail: String,
}

/// A custodian plus the world around it
pub struct Simulation {
    clock: Rc<ManualClock>,
    bank: Custodian,
    tokens: BTreeMap<String, InMemoryToken>,
    native: InMemoryToken,
    keys: BTreeMap<String, Keypair>,
}

fn lookup<'a>(
    tokens: &'a mut BTreeMap<String, InMemoryToken>,
    symbol: &str,
) -> Result<&'a mut InMemoryToken> {
    tokens
        .get_mut(symbol)
        .ok_or_else(|| ScenarioError::UnknownToken(symbol.to_string()))
}

impl Simulation {
    pub fn new(scenario: &Scenario, config: &BankConfig) -> Result<Self> {
        config.validate()?;
        let clock = Rc::new(ManualClock::new(scenario.start));
        let bank = Custodian::from_config(config)?;

        let mut tokens = BTreeMap::new();
        for setup in &scenario.tokens {
            let mut token = InMemoryToken::new(token_address(&setup.symbol), &setup.symbol, clock.clone());
            token.set_fee_bps(setup.fee_bps);
            tokens.insert(setup.symbol.clone(), token);
        }
        let native = InMemoryToken::new(token_address(NATIVE), NATIVE, clock.clone());

        let mut keys = BTreeMap::new();
        keys.insert(scenario.owner.clone(), Keypair::from_seed(&scenario.owner));

        Ok(Self {
            clock,
            bank,
            tokens,
            native,
            keys,
        })
    }

    pub fn bank(&self) -> &Custodian {
        &self.bank
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn token(&self, symbol: &str) -> Option<&InMemoryToken> {
        if symbol == NATIVE {
            return Some(&self.native);
        }
        self.tokens.get(symbol)
    }

    /// Display names for every account and token address the simulation knows
    pub fn names(&self) -> BTreeMap<Address, String> {
        let mut names: BTreeMap<Address, String> = self
            .keys
            .iter()
            .map(|(name, key)| (key.address(), name.clone()))
            .collect();
        names.insert(self.bank.owner(), OWNER.to_string());
        for (symbol, token) in &self.tokens {
            names.insert(token.address(), symbol.clone());
        }
        names
    }

    pub fn address_of(&mut self, account: &str) -> Address {
        if account == OWNER {
            return self.bank.owner();
        }
        self.keys
            .entry(account.to_string())
            .or_insert_with(|| Keypair::from_seed(account))
            .address()
    }

    fn ctx(&self, caller: Address) -> CallContext {
        CallContext::new(caller, self.clock.now())
    }

    /// Run every step, recording failures and carrying on
    pub fn run(&mut self, steps: &[Step]) -> Vec<StepReport> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let timestamp = self.now();
                let (ok, detail) = match self.apply(step) {
                    Ok(detail) => {
                        info!(index, action = step.name(), %detail, "step ok");
                        (true, detail)
                    }
                    Err(e) => {
                        warn!(index, action = step.name(), error = %e, "step failed");
                        (false, e.to_string())
                    }
                };
                StepReport {
                    index,
                    timestamp,
                    action: step.name().to_string(),
                    ok,
                    detail,
                }
            })
            .collect()
    }

    pub fn apply(&mut self, step: &Step) -> Result<String> {
        match step {
            Step::Mint {
                account,
                token,
                amount,
            } => {
                let to = self.address_of(account);
                let amount = *amount as Amount;
                if token == NATIVE {
                    self.native.mint(&to, amount)?;
                } else {
                    lookup(&mut self.tokens, token)?.mint(&to, amount)?;
                }
                Ok(format!("{} {} to {}", amount, token, account))
            }

            Step::Deposit {
                account,
                token,
                amount,
            } => {
                let from = self.address_of(account);
                let ctx = self.ctx(from);
                let amount = *amount as Amount;
                let custodian = self.bank.address();

                let token = lookup(&mut self.tokens, token)?;
                token.approve(&from, &custodian, amount);
                let asset = AssetId::token(token.address());
                let outcome = self.bank.deposit(&ctx, token, asset, amount)?;
                Ok(format!(
                    "principal {} (settled {})",
                    outcome.principal, outcome.accrued
                ))
            }

            Step::DepositPermit {
                account,
                token,
                amount,
                ttl,
            } => {
                let from = self.address_of(account);
                let key = match self.keys.get(account) {
                    Some(key) => key.clone(),
                    None => Keypair::from_seed(account),
                };
                let ctx = self.ctx(from);
                let custodian = self.bank.address();

                let token = lookup(&mut self.tokens, token)?;
                let permit = sign_permit(
                    &key,
                    &token.address(),
                    &custodian,
                    *amount as Amount,
                    token.nonce(&from),
                    ctx.timestamp.saturating_add(*ttl),
                );
                let asset = AssetId::token(token.address());
                let outcome = self.bank.deposit_with_permit(&ctx, token, asset, &permit)?;
                Ok(format!("principal {} via permit", outcome.principal))
            }

            Step::DepositPush {
                account,
                token,
                amount,
            } => {
                let from = self.address_of(account);
                let custodian = self.bank.address();

                let token = lookup(&mut self.tokens, token)?;
                let asset = AssetId::token(token.address());
                token.transfer_and_call(&from, &custodian, *amount as Amount, &[], &mut self.bank)?;
                Ok(format!(
                    "principal {} via notification",
                    self.bank.principal(&asset, &from)
                ))
            }

            Step::DepositNative { account, amount } => {
                let from = self.address_of(account);
                let amount = *amount as Amount;
                let ctx = self.ctx(from).with_value(amount);
                let custodian = self.bank.address();

                // The host moves the value before the call and takes it back if the call fails
                self.native.transfer(&from, &custodian, amount)?;
                match self.bank.deposit_native(&ctx, &self.native) {
                    Ok(outcome) => Ok(format!("principal {}", outcome.principal)),
                    Err(e) => {
                        self.native.transfer(&custodian, &from, amount)?;
                        Err(e.into())
                    }
                }
            }

            Step::Withdraw {
                account,
                token,
                amount,
            } => {
                let to = self.address_of(account);
                let ctx = self.ctx(to);

                let token = lookup(&mut self.tokens, token)?;
                let asset = AssetId::token(token.address());
                let outcome = self.bank.withdraw(&ctx, token, asset, *amount as Amount)?;
                Ok(format!(
                    "interest {} + principal {}, principal left {}",
                    outcome.allocation.interest_used,
                    outcome.allocation.principal_used,
                    outcome.principal
                ))
            }

            Step::WithdrawNative { account, amount } => {
                let to = self.address_of(account);
                let ctx = self.ctx(to);
                let outcome = self
                    .bank
                    .withdraw_native(&ctx, &mut self.native, *amount as Amount)?;
                Ok(format!(
                    "interest {} + principal {}, principal left {}",
                    outcome.allocation.interest_used,
                    outcome.allocation.principal_used,
                    outcome.principal
                ))
            }

            Step::FundReserves { token, amount } => {
                let owner = self.bank.owner();
                let amount = *amount as Amount;
                let custodian = self.bank.address();

                let funded = if token == NATIVE {
                    let ctx = self.ctx(owner).with_value(amount);
                    self.native.transfer(&owner, &custodian, amount)?;
                    match self.bank.fund_native_reserves(&ctx, &self.native) {
                        Ok(funded) => funded,
                        Err(e) => {
                            self.native.transfer(&custodian, &owner, amount)?;
                            return Err(e.into());
                        }
                    }
                } else {
                    let ctx = self.ctx(owner);
                    let token = lookup(&mut self.tokens, token)?;
                    token.approve(&owner, &custodian, amount);
                    let asset = AssetId::token(token.address());
                    self.bank.fund_reserves(&ctx, token, asset, amount)?
                };
                Ok(format!("reserves {}", funded))
            }

            Step::Advance { days, seconds } => {
                let period = self.bank.rate().period_secs;
                self.clock
                    .advance(days.saturating_mul(period).saturating_add(*seconds));
                Ok(format!("now {}", self.clock.now()))
            }

            Step::SetFee { token, bps } => {
                lookup(&mut self.tokens, token)?.set_fee_bps(*bps);
                Ok(format!("{} fee {} bps", token, bps))
            }

            Step::RefuseTransfers { token, count } => {
                lookup(&mut self.tokens, token)?.refuse_next_transfers(*count);
                Ok(format!("{} refuses next {} transfers", token, count))
            }

            Step::Pause => {
                let ctx = self.ctx(self.bank.owner());
                self.bank.pause(&ctx)?;
                Ok("paused".to_string())
            }

            Step::Unpause => {
                let ctx = self.ctx(self.bank.owner());
                self.bank.unpause(&ctx)?;
                Ok("unpaused".to_string())
            }
        }
    }
}
