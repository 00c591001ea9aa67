//! Owner and pause gating, consulted before any core operation runs

use custody_core::{Address, BankError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    paused: bool,
}

impl AccessControl {
    pub fn new(owner: Address, paused: bool) -> Result<Self> {
        if owner.is_zero() {
            return Err(BankError::InvalidArgument("zero owner".to_string()));
        }
        Ok(Self { owner, paused })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ensure_owner(&self, caller: &Address) -> Result<()> {
        if *caller != self.owner {
            return Err(BankError::Unauthorized(format!(
                "{} is not the owner",
                caller
            )));
        }
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.paused {
            return Err(BankError::Paused);
        }
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<()> {
        self.ensure_owner(caller)?;
        self.ensure_active()?;
        self.paused = true;
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<()> {
        self.ensure_owner(caller)?;
        if !self.paused {
            return Err(BankError::InvalidArgument("not paused".to_string()));
        }
        self.paused = false;
        Ok(())
    }

    /// Hand the owner role to `new_owner`, returning the previous owner
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<Address> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(BankError::InvalidArgument("zero owner".to_string()));
        }
        let previous = self.owner;
        self.owner = new_owner;
        Ok(previous)
    }
}
