//! Cumulative claim accounting.
//!
//! Each [`ClaimKey`] owns one ledger line holding the total already claimed.
//! Lines start at zero on first reference, only ever grow, and are never
//! removed.

pub mod nonce;

pub use nonce::{NonceKey, NonceRegistry, NonceScope};

use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::encoding::PackedEncoder;
use crate::{ClaimGateError, Result};

/// Identity of an independent consumption line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimKey {
    pub claimant: H160,
    pub resource: Option<H160>,
    pub source: U256,
}

impl ClaimKey {
    pub fn new(claimant: H160, resource: Option<H160>, source: U256) -> Self {
        Self {
            claimant,
            resource,
            source,
        }
    }

    /// Storage slot: `keccak256(claimant, [resource], source)` packed
    pub fn slot(&self) -> H256 {
        let mut enc = PackedEncoder::new().address(self.claimant);
        if let Some(resource) = self.resource {
            enc = enc.address(resource);
        }
        enc.uint(self.source).hash()
    }
}

/// Ledger of cumulative claimed amounts, keyed by claim slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimLedger {
    claimed: HashMap<H256, U256>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total claimed so far for `key`
    pub fn current_amount(&self, key: &ClaimKey) -> U256 {
        self.claimed(key.slot())
    }

    /// Total claimed so far for a raw slot
    pub fn claimed(&self, slot: H256) -> U256 {
        self.claimed.get(&slot).copied().unwrap_or_default()
    }

    /// Validate an increment against `ceiling` without mutating anything.
    /// Returns the total the line would reach.
    pub fn check_claim(&self, key: &ClaimKey, increment: U256, ceiling: U256) -> Result<U256> {
        if increment.is_zero() {
            return Err(ClaimGateError::InvalidAmount);
        }

        let new_total = self
            .current_amount(key)
            .checked_add(increment)
            .ok_or(ClaimGateError::ArithmeticOverflow)?;

        if new_total > ceiling {
            return Err(ClaimGateError::InvalidAmount);
        }

        Ok(new_total)
    }

    /// Add `increment` to the line for `key`, capped by `ceiling`
    pub fn record_claim(&mut self, key: &ClaimKey, increment: U256, ceiling: U256) -> Result<U256> {
        let new_total = self.check_claim(key, increment, ceiling)?;
        self.claimed.insert(key.slot(), new_total);
        Ok(new_total)
    }

    /// Put a line back to a previously observed total. Only used to undo a
    /// claim whose payout failed.
    pub(crate) fn restore(&mut self, key: &ClaimKey, total: U256) {
        let slot = key.slot();
        if total.is_zero() {
            self.claimed.remove(&slot);
        } else {
            self.claimed.insert(slot, total);
        }
    }

    /// Number of lines that have ever received a claim
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
