pub mod authority;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod engine;
pub mod ledger;
pub mod portal;
pub mod sale;
pub mod service;
pub mod storage;
pub mod token;

pub use authority::{AuthorityConfig, AuthorityEvent};
pub use config::ClaimGateConfig;
pub use crypto::{AuthorityKey, Secp256k1Verifier, Signature, SignatureVerifier};
pub use encoding::{keccak256, ClaimMessage, PackedEncoder};
pub use engine::{
    CheckOrder, ClaimEngine, ClaimEvent, ClaimReceipt, ClaimRequest, Payout, PayoutSink,
};
pub use ledger::{ClaimKey, ClaimLedger, NonceKey, NonceRegistry, NonceScope};
pub use service::ClaimService;
pub use storage::{EngineSnapshot, SnapshotStore};

use primitive_types::H160;

/// claimgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local development chain id, used when no domain is configured
pub const DEFAULT_DOMAIN_ID: u64 = 31337;

/// Failure kinds shared by every signature-gated operation.
///
/// Each variant is terminal: the operation that produced it left no ledger,
/// nonce or payout side effects behind.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimGateError {
    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid address: {address:?}")]
    InvalidAddress { address: H160 },

    #[error("No change to the state")]
    NoChangeToTheState,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Caller {caller:?} is not the owner")]
    OnlyOwner { caller: H160 },

    #[error("Payout failed: {0}")]
    PayoutFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// claimgate result type
pub type Result<T> = std::result::Result<T, ClaimGateError>;
