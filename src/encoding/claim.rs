use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};

use super::PackedEncoder;

/// Parameters an authority signs to let `claimant` draw up to `ceiling`
/// from `source` (optionally scoped to one `resource` contract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimMessage {
    pub domain_id: U256,
    pub resource: Option<H160>,
    pub ceiling: U256,
    pub source: U256,
    pub claimant: H160,
    pub nonce: U256,
}

impl ClaimMessage {
    /// Packed encoding: `domain_id, [resource], ceiling, source, claimant, nonce`.
    ///
    /// The resource field is left out entirely when absent, which matches
    /// claim contracts that mint only themselves.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = PackedEncoder::new().uint(self.domain_id);
        if let Some(resource) = self.resource {
            enc = enc.address(resource);
        }
        enc.uint(self.ceiling)
            .uint(self.source)
            .address(self.claimant)
            .uint(self.nonce)
            .into_bytes()
    }

    /// Message hash the authority signs (before the personal-message prefix)
    pub fn hash(&self) -> H256 {
        super::keccak256(&self.encode())
    }
}
