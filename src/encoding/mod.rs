//! Canonical message encoding for signed authorizations.
//!
//! Messages are laid out with the same rules as Solidity's `abi.encodePacked`
//! so that an off-chain signer and the verifier always agree on the pre-image:
//! every `uint256` occupies exactly 32 big-endian bytes, addresses occupy 20
//! bytes, and strings are copied verbatim.

pub mod claim;

pub use claim::ClaimMessage;

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

/// Prefix applied by `personal_sign` / `eth_sign` before hashing.
pub const ETH_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> H256 {
    H256::from_slice(&Keccak256::digest(data))
}

/// Digest an Ethereum wallet actually signs for `message`.
///
/// The decimal length of the message is appended to the prefix, so a 32-byte
/// message hash becomes `"\x19Ethereum Signed Message:\n32" || hash`.
pub fn eth_signed_message_hash(message: &[u8]) -> H256 {
    let mut data = Vec::with_capacity(ETH_MESSAGE_PREFIX.len() + 4 + message.len());
    data.extend_from_slice(ETH_MESSAGE_PREFIX);
    data.extend_from_slice(message.len().to_string().as_bytes());
    data.extend_from_slice(message);
    keccak256(&data)
}

/// Builder for packed (non-padded) message encodings.
#[derive(Debug, Clone, Default)]
pub struct PackedEncoder {
    buf: Vec<u8>,
}

impl PackedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `uint256` as 32 big-endian bytes
    pub fn uint(mut self, value: U256) -> Self {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.buf.extend_from_slice(&word);
        self
    }

    /// Append a `uint256` built from a `u64`
    pub fn uint_u64(self, value: u64) -> Self {
        self.uint(U256::from(value))
    }

    /// Append a 20-byte address
    pub fn address(mut self, value: H160) -> Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// Append a string's raw UTF-8 bytes (no length prefix)
    pub fn string(mut self, value: &str) -> Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// Append a `uint256[]`; packed arrays still pad every element to 32 bytes
    pub fn uint_array(self, values: &[U256]) -> Self {
        values.iter().fold(self, |enc, v| enc.uint(*v))
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Keccak-256 of the encoded bytes
    pub fn hash(&self) -> H256 {
        keccak256(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"").as_bytes()),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_uint_is_left_padded() {
        let bytes = PackedEncoder::new().uint_u64(0x0102).into_bytes();
        assert_eq!(bytes.len(), 32);
        assert!(bytes[..30].iter().all(|b| *b == 0));
        assert_eq!(&bytes[30..], &[0x01, 0x02]);
    }

    #[test]
    fn test_mixed_layout() {
        let addr = H160::from_low_u64_be(0xabcd);
        let enc = PackedEncoder::new()
            .string("depositERC20")
            .uint_u64(31337)
            .address(addr)
            .uint_array(&[U256::from(1), U256::from(2)]);

        assert_eq!(enc.len(), 12 + 32 + 20 + 64);
        assert_eq!(&enc.as_bytes()[..12], b"depositERC20");
        assert_eq!(&enc.as_bytes()[44..64], addr.as_bytes());
    }

    #[test]
    fn test_field_boundaries_change_hash() {
        // shifting a value between adjacent fixed-width fields must not collide
        let a = PackedEncoder::new().uint_u64(1).uint_u64(0).hash();
        let b = PackedEncoder::new().uint_u64(0).uint_u64(1).hash();
        assert_ne!(a, b);
    }

    #[test]
    fn test_eth_signed_message_prefix_length() {
        let hash = keccak256(b"payload");
        let mut expected = b"\x19Ethereum Signed Message:\n32".to_vec();
        expected.extend_from_slice(hash.as_bytes());
        assert_eq!(eth_signed_message_hash(hash.as_bytes()), keccak256(&expected));
    }
}
