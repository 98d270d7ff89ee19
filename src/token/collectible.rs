use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{credit, TokenError, TokenEvent, TokenResult, MAX_MINT_BATCH};

/// Non-fungible collection. Ids are assigned sequentially from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collectible {
    pub name: String,
    pub symbol: String,
    pub contract_address: H160,

    owners: HashMap<U256, H160>,
    balances: HashMap<H160, U256>,

    /// Id the next mint receives
    next_id: U256,
}

impl Collectible {
    pub fn new(name: String, symbol: String, contract_address: H160) -> Self {
        Self {
            name,
            symbol,
            contract_address,
            owners: HashMap::new(),
            balances: HashMap::new(),
            next_id: U256::one(),
        }
    }

    /// Number of ids minted and not burned
    pub fn total_supply(&self) -> U256 {
        U256::from(self.owners.len())
    }

    pub fn owner_of(&self, id: U256) -> TokenResult<H160> {
        self.owners
            .get(&id)
            .copied()
            .ok_or(TokenError::NonexistentToken { id })
    }

    pub fn balance_of(&self, account: H160) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    /// Mint `amount` fresh ids to `to`, returning them in order
    pub fn mint_batch(&mut self, to: H160, amount: U256) -> TokenResult<Vec<U256>> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver { address: to });
        }

        if amount > U256::from(MAX_MINT_BATCH) {
            return Err(TokenError::MintBatchTooLarge {
                amount,
                max: MAX_MINT_BATCH,
            });
        }

        let end = credit(self.next_id, amount)?;
        let balance = credit(self.balance_of(to), amount)?;

        let mut ids = Vec::with_capacity(amount.as_usize());
        let mut id = self.next_id;
        while id < end {
            self.owners.insert(id, to);
            ids.push(id);
            id += U256::one();
        }

        self.next_id = end;
        self.balances.insert(to, balance);
        Ok(ids)
    }

    pub fn transfer(&mut self, from: H160, to: H160, id: U256) -> TokenResult<TokenEvent> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver { address: to });
        }
        if self.owner_of(id)? != from {
            return Err(TokenError::NotTokenOwner { id, account: from });
        }

        self.owners.insert(id, to);
        self.balances.insert(from, self.balance_of(from) - U256::one());
        let to_balance = credit(self.balance_of(to), U256::one())?;
        self.balances.insert(to, to_balance);

        Ok(TokenEvent::TransferId {
            contract: self.contract_address,
            from,
            to,
            id,
        })
    }

    pub fn burn(&mut self, from: H160, id: U256) -> TokenResult<TokenEvent> {
        if self.owner_of(id)? != from {
            return Err(TokenError::NotTokenOwner { id, account: from });
        }

        self.owners.remove(&id);
        self.balances.insert(from, self.balance_of(from) - U256::one());

        Ok(TokenEvent::TransferId {
            contract: self.contract_address,
            from,
            to: H160::zero(),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> Collectible {
        Collectible::new("Heroes".to_string(), "HERO".to_string(), H160::from_low_u64_be(3000))
    }

    #[test]
    fn test_ids_start_at_one() {
        let alice = H160::from_low_u64_be(1);
        let bob = H160::from_low_u64_be(2);
        let mut nft = collection();

        let ids = nft.mint_batch(alice, U256::from(3)).unwrap();
        assert_eq!(ids, vec![U256::from(1), U256::from(2), U256::from(3)]);

        let ids = nft.mint_batch(bob, U256::one()).unwrap();
        assert_eq!(ids, vec![U256::from(4)]);

        assert_eq!(nft.balance_of(alice), U256::from(3));
        assert_eq!(nft.owner_of(U256::from(4)).unwrap(), bob);
        assert_eq!(nft.total_supply(), U256::from(4));
    }

    #[test]
    fn test_transfer_requires_ownership() {
        let alice = H160::from_low_u64_be(1);
        let bob = H160::from_low_u64_be(2);
        let mut nft = collection();
        nft.mint_batch(alice, U256::one()).unwrap();

        assert_eq!(
            nft.transfer(bob, alice, U256::one()),
            Err(TokenError::NotTokenOwner {
                id: U256::one(),
                account: bob
            })
        );

        nft.transfer(alice, bob, U256::one()).unwrap();
        assert_eq!(nft.owner_of(U256::one()).unwrap(), bob);
        assert_eq!(nft.balance_of(alice), U256::zero());
        assert_eq!(nft.balance_of(bob), U256::one());
    }

    #[test]
    fn test_burn() {
        let alice = H160::from_low_u64_be(1);
        let mut nft = collection();
        nft.mint_batch(alice, U256::from(2)).unwrap();
        nft.burn(alice, U256::one()).unwrap();

        assert!(nft.owner_of(U256::one()).is_err());
        assert_eq!(nft.balance_of(alice), U256::one());
        assert_eq!(nft.total_supply(), U256::one());
    }

    #[test]
    fn test_unknown_id() {
        let nft = collection();
        assert_eq!(
            nft.owner_of(U256::from(9)),
            Err(TokenError::NonexistentToken { id: U256::from(9) })
        );
    }

    #[test]
    fn test_mint_batch_is_bounded() {
        let alice = H160::from_low_u64_be(1);
        let mut nft = collection();

        assert_eq!(
            nft.mint_batch(alice, U256::from(MAX_MINT_BATCH + 1)),
            Err(TokenError::MintBatchTooLarge {
                amount: U256::from(MAX_MINT_BATCH + 1),
                max: MAX_MINT_BATCH,
            })
        );
        assert!(nft.mint_batch(alice, U256::MAX).is_err());
        assert_eq!(nft.total_supply(), U256::zero());

        let ids = nft.mint_batch(alice, U256::from(MAX_MINT_BATCH)).unwrap();
        assert_eq!(ids.len() as u64, MAX_MINT_BATCH);
    }
}
