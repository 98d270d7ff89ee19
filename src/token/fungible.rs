use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{credit, debit, TokenError, TokenEvent, TokenResult};

/// Fungible token ledger with an optional supply cap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FungibleToken {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,

    pub contract_address: H160,

    balances: HashMap<H160, U256>,

    /// Maximum supply (0 means no limit)
    pub max_supply: U256,
}

impl FungibleToken {
    pub fn new(name: String, symbol: String, decimals: u8, contract_address: H160) -> Self {
        Self {
            name,
            symbol,
            decimals,
            total_supply: U256::zero(),
            contract_address,
            balances: HashMap::new(),
            max_supply: U256::zero(),
        }
    }

    pub fn with_max_supply(mut self, max_supply: U256) -> Self {
        self.max_supply = max_supply;
        self
    }

    pub fn balance_of(&self, account: H160) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    pub fn transfer(&mut self, from: H160, to: H160, amount: U256) -> TokenResult<TokenEvent> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver { address: to });
        }

        let from_balance = debit(self.balance_of(from), amount)?;
        if from != to {
            let to_balance = credit(self.balance_of(to), amount)?;
            self.balances.insert(from, from_balance);
            self.balances.insert(to, to_balance);
        }

        Ok(TokenEvent::Transfer {
            contract: self.contract_address,
            from,
            to,
            amount,
        })
    }

    pub fn mint(&mut self, to: H160, amount: U256) -> TokenResult<TokenEvent> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver { address: to });
        }

        let total_supply = credit(self.total_supply, amount)?;
        if !self.max_supply.is_zero() && total_supply > self.max_supply {
            return Err(TokenError::ExceedsMaxSupply {
                amount,
                max_supply: self.max_supply,
            });
        }

        let to_balance = credit(self.balance_of(to), amount)?;
        self.balances.insert(to, to_balance);
        self.total_supply = total_supply;

        Ok(TokenEvent::Transfer {
            contract: self.contract_address,
            from: H160::zero(),
            to,
            amount,
        })
    }

    pub fn burn(&mut self, from: H160, amount: U256) -> TokenResult<TokenEvent> {
        let from_balance = debit(self.balance_of(from), amount)?;
        self.balances.insert(from, from_balance);
        self.total_supply -= amount;

        Ok(TokenEvent::Transfer {
            contract: self.contract_address,
            from,
            to: H160::zero(),
            amount,
        })
    }
}
