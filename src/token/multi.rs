use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{credit, debit, TokenError, TokenEvent, TokenResult};

/// Multi-id token ledger: independent fungible balances per id.
///
/// Ids have to be created before anything can be minted under them; created
/// ids run from 1 to `token_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiToken {
    pub name: String,
    pub contract_address: H160,

    /// Last created id
    token_id: U256,

    /// id => account => balance
    balances: HashMap<U256, HashMap<H160, U256>>,
}

impl MultiToken {
    pub fn new(name: String, contract_address: H160) -> Self {
        Self {
            name,
            contract_address,
            token_id: U256::zero(),
            balances: HashMap::new(),
        }
    }

    pub fn token_id(&self) -> U256 {
        self.token_id
    }

    pub fn balance_of(&self, account: H160, id: U256) -> U256 {
        self.balances
            .get(&id)
            .and_then(|holders| holders.get(&account))
            .copied()
            .unwrap_or_default()
    }

    /// Open `amount` new ids. Returns the first and last of them.
    pub fn create(&mut self, amount: U256) -> TokenResult<(U256, U256)> {
        if amount.is_zero() {
            return Err(TokenError::InvalidAmount);
        }

        let last = credit(self.token_id, amount)?;
        let first = self.token_id + U256::one();
        self.token_id = last;

        tracing::debug!("{} created ids {}..={}", self.name, first, last);
        Ok((first, last))
    }

    fn ensure_created(&self, id: U256) -> TokenResult<()> {
        if id.is_zero() || id > self.token_id {
            return Err(TokenError::NonexistentToken { id });
        }
        Ok(())
    }

    pub fn mint(&mut self, to: H160, id: U256, amount: U256) -> TokenResult<TokenEvent> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver { address: to });
        }
        self.ensure_created(id)?;

        let balance = credit(self.balance_of(to, id), amount)?;
        self.balances.entry(id).or_default().insert(to, balance);

        Ok(TokenEvent::TransferSingle {
            contract: self.contract_address,
            from: H160::zero(),
            to,
            id,
            amount,
        })
    }

    /// Mint every `(id, amount)` pair or none of them
    pub fn mint_batch(&mut self, to: H160, ids: &[U256], amounts: &[U256]) -> TokenResult<Vec<TokenEvent>> {
        let mut staged = self.clone();
        let events = ids
            .iter()
            .zip(amounts)
            .map(|(id, amount)| staged.mint(to, *id, *amount))
            .collect::<TokenResult<Vec<_>>>()?;

        *self = staged;
        Ok(events)
    }

    pub fn burn(&mut self, from: H160, id: U256, amount: U256) -> TokenResult<TokenEvent> {
        let balance = debit(self.balance_of(from, id), amount)?;
        self.balances.entry(id).or_default().insert(from, balance);

        Ok(TokenEvent::TransferSingle {
            contract: self.contract_address,
            from,
            to: H160::zero(),
            id,
            amount,
        })
    }

    /// Burn every `(id, amount)` pair or none of them
    pub fn burn_batch(&mut self, from: H160, ids: &[U256], amounts: &[U256]) -> TokenResult<Vec<TokenEvent>> {
        let mut staged = self.clone();
        let events = ids
            .iter()
            .zip(amounts)
            .map(|(id, amount)| staged.burn(from, *id, *amount))
            .collect::<TokenResult<Vec<_>>>()?;

        *self = staged;
        Ok(events)
    }

    pub fn transfer(
        &mut self,
        from: H160,
        to: H160,
        id: U256,
        amount: U256,
    ) -> TokenResult<TokenEvent> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver { address: to });
        }

        let from_balance = debit(self.balance_of(from, id), amount)?;
        if from != to {
            let to_balance = credit(self.balance_of(to, id), amount)?;
            let holders = self.balances.entry(id).or_default();
            holders.insert(from, from_balance);
            holders.insert(to, to_balance);
        }

        Ok(TokenEvent::TransferSingle {
            contract: self.contract_address,
            from,
            to,
            id,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> MultiToken {
        let mut items = MultiToken::new("Items".to_string(), H160::from_low_u64_be(4000));
        items.create(U256::from(2)).unwrap();
        items
    }

    #[test]
    fn test_balances_are_per_id() {
        let alice = H160::from_low_u64_be(1);
        let bob = H160::from_low_u64_be(2);
        let mut items = items();

        items.mint(alice, U256::one(), U256::from(10)).unwrap();
        items.mint(alice, U256::from(2), U256::from(5)).unwrap();
        items.transfer(alice, bob, U256::one(), U256::from(4)).unwrap();

        assert_eq!(items.balance_of(alice, U256::one()), U256::from(6));
        assert_eq!(items.balance_of(bob, U256::one()), U256::from(4));
        assert_eq!(items.balance_of(bob, U256::from(2)), U256::zero());
    }

    #[test]
    fn test_create_assigns_consecutive_ids() {
        let mut items = MultiToken::new("Items".to_string(), H160::from_low_u64_be(4000));
        assert_eq!(items.create(U256::from(2)).unwrap(), (U256::one(), U256::from(2)));
        assert_eq!(items.create(U256::from(2)).unwrap(), (U256::from(3), U256::from(4)));
        assert_eq!(items.token_id(), U256::from(4));
        assert_eq!(items.create(U256::zero()), Err(TokenError::InvalidAmount));
    }

    #[test]
    fn test_mint_requires_created_id() {
        let alice = H160::from_low_u64_be(1);
        let mut items = items();

        for id in [U256::zero(), U256::from(3)] {
            assert_eq!(
                items.mint(alice, id, U256::one()),
                Err(TokenError::NonexistentToken { id })
            );
        }

        // one bad id leaves the whole batch unminted
        let result = items.mint_batch(alice, &[U256::one(), U256::from(10)], &[U256::from(10), U256::from(20)]);
        assert_eq!(result, Err(TokenError::NonexistentToken { id: U256::from(10) }));
        assert_eq!(items.balance_of(alice, U256::one()), U256::zero());

        items
            .mint_batch(alice, &[U256::one(), U256::from(2)], &[U256::from(10), U256::from(20)])
            .unwrap();
        assert_eq!(items.balance_of(alice, U256::from(2)), U256::from(20));
    }

    #[test]
    fn test_burn_batch_is_all_or_nothing() {
        let alice = H160::from_low_u64_be(1);
        let mut items = items();
        items.mint(alice, U256::one(), U256::from(10)).unwrap();
        items.mint(alice, U256::from(2), U256::from(5)).unwrap();

        let result = items.burn_batch(alice, &[U256::one(), U256::from(2)], &[U256::from(4), U256::from(6)]);
        assert!(matches!(result, Err(TokenError::InsufficientBalance { .. })));
        assert_eq!(items.balance_of(alice, U256::one()), U256::from(10));

        items
            .burn_batch(alice, &[U256::one(), U256::from(2)], &[U256::from(4), U256::from(5)])
            .unwrap();
        assert_eq!(items.balance_of(alice, U256::one()), U256::from(6));
        assert_eq!(items.balance_of(alice, U256::from(2)), U256::zero());
    }

    #[test]
    fn test_transfer_more_than_held() {
        let alice = H160::from_low_u64_be(1);
        let mut items = items();
        items.mint(alice, U256::one(), U256::from(1)).unwrap();

        assert!(matches!(
            items.transfer(alice, H160::from_low_u64_be(2), U256::one(), U256::from(2)),
            Err(TokenError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let alice = H160::from_low_u64_be(1);
        let mut items = items();
        items.mint(alice, U256::one(), U256::from(3)).unwrap();

        items.transfer(alice, alice, U256::one(), U256::from(2)).unwrap();
        assert_eq!(items.balance_of(alice, U256::one()), U256::from(3));
    }
}
