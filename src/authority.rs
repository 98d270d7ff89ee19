use primitive_types::H160;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{ClaimGateError, Result};

/// Owner-controlled configuration: who may administer the deployment and
/// whose signatures authorize operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Only identity allowed to change this configuration
    pub owner: H160,

    /// Address of the deployment itself
    pub contract: H160,

    /// Trusted signer
    authority: H160,

    /// Contract addresses that can never become the signer
    reserved: HashSet<H160>,
}

/// Configuration changes, mirrored into the caller's event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityEvent {
    SignerSet { authority: H160 },
    OwnershipTransferred { old_owner: H160, new_owner: H160 },
}

impl AuthorityConfig {
    pub fn new(owner: H160, contract: H160, authority: H160) -> Result<Self> {
        if owner.is_zero() {
            return Err(ClaimGateError::InvalidAddress { address: owner });
        }

        let config = Self {
            owner,
            contract,
            authority: H160::zero(),
            reserved: HashSet::new(),
        };

        if !config.is_valid_signer(authority) {
            return Err(ClaimGateError::InvalidAddress { address: authority });
        }

        Ok(Self { authority, ..config })
    }

    pub fn authority(&self) -> H160 {
        self.authority
    }

    /// Replace the trusted signer. Signatures from the previous signer stop
    /// verifying on the very next call.
    pub fn set_authority(&mut self, caller: H160, new_authority: H160) -> Result<AuthorityEvent> {
        self.ensure_owner(caller)?;

        if !self.is_valid_signer(new_authority) {
            return Err(ClaimGateError::InvalidAddress {
                address: new_authority,
            });
        }

        if new_authority == self.authority {
            return Err(ClaimGateError::NoChangeToTheState);
        }

        self.authority = new_authority;
        tracing::info!("Authority set to {:?}", new_authority);

        Ok(AuthorityEvent::SignerSet {
            authority: new_authority,
        })
    }

    /// Hand administration to `new_owner`
    pub fn transfer_ownership(&mut self, caller: H160, new_owner: H160) -> Result<AuthorityEvent> {
        self.ensure_owner(caller)?;

        if new_owner.is_zero() {
            return Err(ClaimGateError::InvalidAddress { address: new_owner });
        }

        let old_owner = self.owner;
        self.owner = new_owner;

        tracing::info!("Ownership transferred from {:?} to {:?}", old_owner, new_owner);

        Ok(AuthorityEvent::OwnershipTransferred {
            old_owner,
            new_owner,
        })
    }

    /// Mark a known contract address as unusable for signing
    pub fn reserve(&mut self, address: H160) {
        self.reserved.insert(address);
    }

    pub fn ensure_owner(&self, caller: H160) -> Result<()> {
        if caller != self.owner {
            return Err(ClaimGateError::OnlyOwner { caller });
        }
        Ok(())
    }

    fn is_valid_signer(&self, address: H160) -> bool {
        !address.is_zero() && address != self.contract && !self.reserved.contains(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> AuthorityConfig {
        AuthorityConfig::new(
            H160::from_low_u64_be(1),
            H160::from_low_u64_be(1000),
            H160::from_low_u64_be(50),
        )
        .unwrap()
    }

    #[test]
    fn test_set_authority() {
        let mut config = setup();
        let event = config.set_authority(H160::from_low_u64_be(1), H160::from_low_u64_be(51)).unwrap();

        assert_eq!(config.authority(), H160::from_low_u64_be(51));
        assert_eq!(
            event,
            AuthorityEvent::SignerSet {
                authority: H160::from_low_u64_be(51)
            }
        );
    }

    #[test]
    fn test_non_owner_cannot_set_authority() {
        let mut config = setup();
        let alice = H160::from_low_u64_be(2);
        let result = config.set_authority(alice, H160::from_low_u64_be(51));

        assert_eq!(result, Err(ClaimGateError::OnlyOwner { caller: alice }));
        assert_eq!(config.authority(), H160::from_low_u64_be(50));
    }

    #[test]
    fn test_same_authority_is_rejected() {
        let mut config = setup();
        let result = config.set_authority(H160::from_low_u64_be(1), H160::from_low_u64_be(50));
        assert_eq!(result, Err(ClaimGateError::NoChangeToTheState));
    }

    #[test]
    fn test_zero_contract_and_reserved_addresses_rejected() {
        let mut config = setup();
        let owner = H160::from_low_u64_be(1);
        let token = H160::from_low_u64_be(2000);
        config.reserve(token);

        for address in [H160::zero(), H160::from_low_u64_be(1000), token] {
            assert_eq!(
                config.set_authority(owner, address),
                Err(ClaimGateError::InvalidAddress { address })
            );
        }
    }

    #[test]
    fn test_constructor_validates() {
        let owner = H160::from_low_u64_be(1);
        let contract = H160::from_low_u64_be(1000);
        assert!(AuthorityConfig::new(owner, contract, H160::zero()).is_err());
        assert!(AuthorityConfig::new(owner, contract, contract).is_err());
        assert!(AuthorityConfig::new(H160::zero(), contract, H160::from_low_u64_be(5)).is_err());
    }

    #[test]
    fn test_transfer_ownership() {
        let mut config = setup();
        let old_owner = H160::from_low_u64_be(1);
        let bob = H160::from_low_u64_be(3);

        config.transfer_ownership(old_owner, bob).unwrap();
        assert_eq!(config.owner, bob);

        // old owner lost the setter
        assert!(config.set_authority(old_owner, H160::from_low_u64_be(51)).is_err());
        assert!(config.set_authority(bob, H160::from_low_u64_be(51)).is_ok());
        assert!(config.transfer_ownership(bob, H160::zero()).is_err());
    }
}
