use primitive_types::{H160, H256};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use super::{address_from_uncompressed, Signature};
use crate::encoding::eth_signed_message_hash;
use crate::{ClaimGateError, Result};

/// Off-chain authority key that issues claim authorizations
pub struct AuthorityKey {
    secret: SecretKey,
    secp: Secp256k1<All>,
}

impl AuthorityKey {
    /// Generate a fresh key from the OS RNG
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        loop {
            let mut bytes = [0u8; 32];
            csprng.fill_bytes(&mut bytes);
            // out-of-range scalars are astronomically rare; just draw again
            if let Ok(key) = Self::from_bytes(&bytes) {
                return key;
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| ClaimGateError::Config(format!("Invalid secret key: {}", e)))?;
        Ok(Self {
            secret,
            secp: Secp256k1::new(),
        })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(clean)
            .map_err(|_| ClaimGateError::Config("Secret key is not valid hex".to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn secret_hex(&self) -> String {
        format!("0x{}", hex::encode(self.secret.secret_bytes()))
    }

    /// Ethereum address of this key
    pub fn address(&self) -> H160 {
        let public = PublicKey::from_secret_key(&self.secp, &self.secret);
        address_from_uncompressed(&public.serialize_uncompressed())
    }

    /// Sign `message_hash` the way `personal_sign` does (prefixed digest,
    /// `v` in {27, 28}).
    pub fn sign_hash(&self, message_hash: H256) -> Result<Signature> {
        let digest = eth_signed_message_hash(message_hash.as_bytes());
        let message = Message::from_digest_slice(digest.as_bytes())
            .map_err(|_| ClaimGateError::InvalidSignature)?;

        let (rec_id, compact) = self
            .secp
            .sign_ecdsa_recoverable(&message, &self.secret)
            .serialize_compact();

        let mut out = Vec::with_capacity(super::SIGNATURE_LEN);
        out.extend_from_slice(&compact);
        out.push(27 + rec_id.to_i32() as u8);
        Ok(Signature(out))
    }
}

impl std::fmt::Debug for AuthorityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthorityKey({:?})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = AuthorityKey::generate();
        let b = AuthorityKey::generate();
        assert_ne!(a.address(), b.address());
        assert!(!a.address().is_zero());
    }

    #[test]
    fn test_hex_roundtrip_keeps_address() {
        let key = AuthorityKey::from_bytes(&[0x11; 32]).unwrap();
        let restored = AuthorityKey::from_hex(&key.secret_hex()).unwrap();
        assert_eq!(key.address(), restored.address());
    }

    #[test]
    fn test_known_address() {
        // secret key 0x...01 maps to the well-known generator-point address
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let key = AuthorityKey::from_bytes(&bytes).unwrap();
        assert_eq!(
            format!("{:x}", key.address()),
            "7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(AuthorityKey::from_bytes(&[0u8; 32]).is_err());
        assert!(AuthorityKey::from_hex("not-hex").is_err());
    }

    #[test]
    fn test_signature_shape() {
        let key = AuthorityKey::from_bytes(&[0x22; 32]).unwrap();
        let sig = key.sign_hash(H256::repeat_byte(1)).unwrap();
        assert_eq!(sig.as_bytes().len(), 65);
        assert!(sig.as_bytes()[64] == 27 || sig.as_bytes()[64] == 28);
    }
}
