//! Ethereum-style ECDSA signatures: recovery of the signing address and
//! comparison against a trusted authority.

pub mod signer;

pub use signer::AuthorityKey;

use primitive_types::{H160, H256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, VerifyOnly};
use serde::{Deserialize, Serialize};

use crate::encoding::{eth_signed_message_hash, keccak256};
use crate::{ClaimGateError, Result};

/// Length of an `r || s || v` signature
pub const SIGNATURE_LEN: usize = 65;

/// Upper bound for `s` accepted by Ethereum (secp256k1 order / 2).
const HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Raw 65-byte signature as produced by `personal_sign`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Parse a hex string, with or without `0x`
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(clean).map_err(|_| ClaimGateError::InvalidSignature)?;
        Ok(Signature(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Split into a compact signature and recovery id, rejecting anything
    /// Ethereum would not accept.
    fn to_recoverable(&self) -> Result<RecoverableSignature> {
        if self.0.len() != SIGNATURE_LEN {
            return Err(ClaimGateError::InvalidSignature);
        }

        let v = match self.0[64] {
            0 | 1 => self.0[64],
            27 | 28 => self.0[64] - 27,
            _ => return Err(ClaimGateError::InvalidSignature),
        };

        // malleable high-s form
        if self.0[32..64] > HALF_ORDER[..] {
            return Err(ClaimGateError::InvalidSignature);
        }

        let rec_id = RecoveryId::from_i32(v as i32).map_err(|_| ClaimGateError::InvalidSignature)?;
        RecoverableSignature::from_compact(&self.0[..64], rec_id)
            .map_err(|_| ClaimGateError::InvalidSignature)
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Recovers signers from message hashes. Implementations must be pure.
pub trait SignatureVerifier {
    /// Address that signed `message_hash`, or `InvalidSignature`
    fn recover_signer(&self, message_hash: H256, signature: &Signature) -> Result<H160>;

    fn is_authorized(&self, message_hash: H256, signature: &Signature, authority: H160) -> bool {
        matches!(self.recover_signer(message_hash, signature), Ok(signer) if signer == authority)
    }
}

/// secp256k1 verifier over Ethereum personal-message digests
pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Secp256k1Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secp256k1Verifier")
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn recover_signer(&self, message_hash: H256, signature: &Signature) -> Result<H160> {
        let recoverable = signature.to_recoverable()?;
        let digest = eth_signed_message_hash(message_hash.as_bytes());
        let message = Message::from_digest_slice(digest.as_bytes())
            .map_err(|_| ClaimGateError::InvalidSignature)?;

        let public_key = self
            .secp
            .recover_ecdsa(&message, &recoverable)
            .map_err(|_| ClaimGateError::InvalidSignature)?;

        let signer = address_from_uncompressed(&public_key.serialize_uncompressed());
        if signer.is_zero() {
            return Err(ClaimGateError::InvalidSignature);
        }

        Ok(signer)
    }
}

/// Ethereum address of an uncompressed (65-byte, 0x04-prefixed) public key
pub fn address_from_uncompressed(public_key: &[u8; 65]) -> H160 {
    H160::from_slice(&keccak256(&public_key[1..]).as_bytes()[12..])
}
