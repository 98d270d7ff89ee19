//! In-process asset book.
//!
//! Holds fungible, collectible and multi-id token ledgers so that claims,
//! portal moves and sale mints have something concrete to pay out into.

pub mod collectible;
pub mod fungible;
pub mod multi;
pub mod registry;

pub use collectible::Collectible;
pub use fungible::FungibleToken;
pub use multi::MultiToken;
pub use registry::{Asset, AssetRegistry};

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};

/// Asset book error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token not found: {token:?}")]
    TokenNotFound { token: H160 },

    #[error("Token {token:?} does not support this operation")]
    UnsupportedOperation { token: H160 },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: U256, available: U256 },

    #[error("Token id {id} does not exist")]
    NonexistentToken { id: U256 },

    #[error("{account:?} does not own token id {id}")]
    NotTokenOwner { id: U256, account: H160 },

    #[error("Mint of {amount} would exceed max supply {max_supply}")]
    ExceedsMaxSupply { amount: U256, max_supply: U256 },

    #[error("Invalid receiver: {address:?}")]
    InvalidReceiver { address: H160 },

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Mint of {amount} ids exceeds the per-call limit of {max}")]
    MintBatchTooLarge { amount: U256, max: u64 },

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
}

/// Most collectible ids a single mint may create
pub const MAX_MINT_BATCH: u64 = 10_000;

/// Result type for asset book operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Asset movements, as a token contract would log them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEvent {
    Transfer {
        contract: H160,
        from: H160,
        to: H160,
        amount: U256,
    },

    /// Collectible moves carry the id instead of an amount
    TransferId {
        contract: H160,
        from: H160,
        to: H160,
        id: U256,
    },

    TransferSingle {
        contract: H160,
        from: H160,
        to: H160,
        id: U256,
        amount: U256,
    },
}

/// Credit `amount` to `balance`, refusing to wrap
fn credit(balance: U256, amount: U256) -> TokenResult<U256> {
    balance
        .checked_add(amount)
        .ok_or(TokenError::ArithmeticOverflow)
}

/// Debit `amount` from `balance`
fn debit(balance: U256, amount: U256) -> TokenResult<U256> {
    if balance < amount {
        return Err(TokenError::InsufficientBalance {
            required: amount,
            available: balance,
        });
    }
    Ok(balance - amount)
}
