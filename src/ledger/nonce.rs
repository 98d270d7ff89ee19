use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{ClaimGateError, Result};

/// How authorization sequences are partitioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceScope {
    /// One sequence per account, shared by every resource
    #[default]
    PerClaimant,
    /// One sequence per (account, resource)
    PerResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonceKey {
    pub account: H160,
    pub resource: Option<H160>,
}

impl NonceKey {
    pub fn new(scope: NonceScope, account: H160, resource: Option<H160>) -> Self {
        match scope {
            NonceScope::PerClaimant => Self {
                account,
                resource: None,
            },
            NonceScope::PerResource => Self { account, resource },
        }
    }
}

/// Per-account authorization sequences.
///
/// The sequence starts at zero; an authorization is valid only when it
/// carries `current + 1`, and the sequence moves only after the operation
/// that consumed it succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NonceRegistry {
    nonces: HashMap<NonceKey, U256>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last consumed nonce
    pub fn current(&self, key: &NonceKey) -> U256 {
        self.nonces.get(key).copied().unwrap_or_default()
    }

    /// Nonce the next authorization must carry
    pub fn next(&self, key: &NonceKey) -> Result<U256> {
        self.current(key)
            .checked_add(U256::one())
            .ok_or(ClaimGateError::ArithmeticOverflow)
    }

    /// Consume the next nonce and return it
    pub fn advance(&mut self, key: &NonceKey) -> Result<U256> {
        let next = self.next(key)?;
        self.nonces.insert(*key, next);
        Ok(next)
    }

    pub(crate) fn restore(&mut self, key: &NonceKey, value: U256) {
        if value.is_zero() {
            self.nonces.remove(key);
        } else {
            self.nonces.insert(*key, value);
        }
    }
}
