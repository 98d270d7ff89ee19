use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Collectible, FungibleToken, MultiToken, TokenError, TokenEvent, TokenResult};
use crate::engine::{Payout, PayoutSink};
use crate::portal::{AssetTransfer, CraftRecipe};
use crate::ClaimGateError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Asset {
    Fungible(FungibleToken),
    Collectible(Collectible),
    Multi(MultiToken),
}

/// Registry of every asset contract known to this process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRegistry {
    /// contract_address => asset
    assets: HashMap<H160, Asset>,

    /// Next contract address counter
    next_contract_id: u64,

    events: Vec<TokenEvent>,
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self {
            assets: HashMap::new(),
            next_contract_id: 2000,
            events: Vec::new(),
        }
    }

    fn next_address(&mut self) -> H160 {
        let address = H160::from_low_u64_be(self.next_contract_id);
        self.next_contract_id += 1;
        address
    }

    pub fn deploy_fungible(
        &mut self,
        name: String,
        symbol: String,
        decimals: u8,
        max_supply: Option<U256>,
    ) -> H160 {
        let address = self.next_address();
        let token = FungibleToken::new(name.clone(), symbol.clone(), decimals, address)
            .with_max_supply(max_supply.unwrap_or_default());
        self.assets.insert(address, Asset::Fungible(token));

        tracing::info!("Deployed fungible token {} ({}) at {:?}", name, symbol, address);
        address
    }

    pub fn deploy_collectible(&mut self, name: String, symbol: String) -> H160 {
        let address = self.next_address();
        self.assets.insert(
            address,
            Asset::Collectible(Collectible::new(name.clone(), symbol.clone(), address)),
        );

        tracing::info!("Deployed collectible {} ({}) at {:?}", name, symbol, address);
        address
    }

    pub fn deploy_multi(&mut self, name: String) -> H160 {
        let address = self.next_address();
        self.assets
            .insert(address, Asset::Multi(MultiToken::new(name.clone(), address)));

        tracing::info!("Deployed multi token {} at {:?}", name, address);
        address
    }

    /// Register an asset under an explicit address (e.g. a claim engine's own
    /// contract address)
    pub fn register(&mut self, address: H160, asset: Asset) {
        self.assets.insert(address, asset);
    }

    pub fn get(&self, token: H160) -> Option<&Asset> {
        self.assets.get(&token)
    }

    pub fn fungible(&self, token: H160) -> TokenResult<&FungibleToken> {
        match self.assets.get(&token) {
            Some(Asset::Fungible(t)) => Ok(t),
            Some(_) => Err(TokenError::UnsupportedOperation { token }),
            None => Err(TokenError::TokenNotFound { token }),
        }
    }

    fn fungible_mut(&mut self, token: H160) -> TokenResult<&mut FungibleToken> {
        match self.assets.get_mut(&token) {
            Some(Asset::Fungible(t)) => Ok(t),
            Some(_) => Err(TokenError::UnsupportedOperation { token }),
            None => Err(TokenError::TokenNotFound { token }),
        }
    }

    pub fn collectible(&self, token: H160) -> TokenResult<&Collectible> {
        match self.assets.get(&token) {
            Some(Asset::Collectible(t)) => Ok(t),
            Some(_) => Err(TokenError::UnsupportedOperation { token }),
            None => Err(TokenError::TokenNotFound { token }),
        }
    }

    fn collectible_mut(&mut self, token: H160) -> TokenResult<&mut Collectible> {
        match self.assets.get_mut(&token) {
            Some(Asset::Collectible(t)) => Ok(t),
            Some(_) => Err(TokenError::UnsupportedOperation { token }),
            None => Err(TokenError::TokenNotFound { token }),
        }
    }

    pub fn multi(&self, token: H160) -> TokenResult<&MultiToken> {
        match self.assets.get(&token) {
            Some(Asset::Multi(t)) => Ok(t),
            Some(_) => Err(TokenError::UnsupportedOperation { token }),
            None => Err(TokenError::TokenNotFound { token }),
        }
    }

    fn multi_mut(&mut self, token: H160) -> TokenResult<&mut MultiToken> {
        match self.assets.get_mut(&token) {
            Some(Asset::Multi(t)) => Ok(t),
            Some(_) => Err(TokenError::UnsupportedOperation { token }),
            None => Err(TokenError::TokenNotFound { token }),
        }
    }

    /// Fungible balance or collectible count held by `account`
    pub fn balance_of(&self, token: H160, account: H160) -> TokenResult<U256> {
        match self.assets.get(&token) {
            Some(Asset::Fungible(t)) => Ok(t.balance_of(account)),
            Some(Asset::Collectible(t)) => Ok(t.balance_of(account)),
            Some(Asset::Multi(_)) => Err(TokenError::UnsupportedOperation { token }),
            None => Err(TokenError::TokenNotFound { token }),
        }
    }

    pub fn mint_fungible(&mut self, token: H160, to: H160, amount: U256) -> TokenResult<()> {
        let event = self.fungible_mut(token)?.mint(to, amount)?;
        self.events.push(event);
        Ok(())
    }

    /// Mint `amount` new collectible ids to `to`
    pub fn mint_collectible(&mut self, token: H160, to: H160, amount: U256) -> TokenResult<Vec<U256>> {
        let ids = self.collectible_mut(token)?.mint_batch(to, amount)?;
        for id in &ids {
            self.events.push(TokenEvent::TransferId {
                contract: token,
                from: H160::zero(),
                to,
                id: *id,
            });
        }
        Ok(ids)
    }

    pub fn mint_multi(&mut self, token: H160, to: H160, id: U256, amount: U256) -> TokenResult<()> {
        let event = self.multi_mut(token)?.mint(to, id, amount)?;
        self.events.push(event);
        Ok(())
    }

    pub fn burn_fungible(&mut self, token: H160, from: H160, amount: U256) -> TokenResult<()> {
        let event = self.fungible_mut(token)?.burn(from, amount)?;
        self.events.push(event);
        Ok(())
    }

    /// Run `f` against a copy of the registry and keep the copy only if
    /// every step succeeded
    fn staged<R>(&mut self, f: impl FnOnce(&mut Self) -> TokenResult<R>) -> TokenResult<R> {
        let mut staged = self.clone();
        let out = f(&mut staged)?;
        *self = staged;
        Ok(out)
    }

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<TokenEvent> {
        std::mem::take(&mut self.events)
    }
}

impl PayoutSink for AssetRegistry {
    /// Fungible payouts mint `amount` units; collectible payouts mint
    /// `amount` fresh ids.
    fn payout(&mut self, payout: &Payout) -> crate::Result<()> {
        let result = match self.assets.get(&payout.token) {
            Some(Asset::Fungible(_)) => self.mint_fungible(payout.token, payout.to, payout.amount),
            Some(Asset::Collectible(_)) => self
                .mint_collectible(payout.token, payout.to, payout.amount)
                .map(|_| ()),
            Some(Asset::Multi(_)) => Err(TokenError::UnsupportedOperation {
                token: payout.token,
            }),
            None => Err(TokenError::TokenNotFound {
                token: payout.token,
            }),
        };

        result.map_err(|e| ClaimGateError::PayoutFailed(e.to_string()))
    }
}

impl AssetTransfer for AssetRegistry {
    fn transfer_fungible(&mut self, token: H160, from: H160, to: H160, amount: U256) -> TokenResult<()> {
        let event = self.fungible_mut(token)?.transfer(from, to, amount)?;
        self.events.push(event);
        Ok(())
    }

    fn transfer_collectibles(&mut self, token: H160, from: H160, to: H160, ids: &[U256]) -> TokenResult<()> {
        // apply to a copy so a bad id leaves every other id where it was
        let mut staged = self.collectible(token)?.clone();
        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            events.push(staged.transfer(from, to, *id)?);
        }

        *self.collectible_mut(token)? = staged;
        self.events.extend(events);
        Ok(())
    }

    fn transfer_multi(
        &mut self,
        token: H160,
        from: H160,
        to: H160,
        ids: &[U256],
        amounts: &[U256],
    ) -> TokenResult<()> {
        let mut staged = self.multi(token)?.clone();
        let mut events = Vec::with_capacity(ids.len());
        for (id, amount) in ids.iter().zip(amounts) {
            events.push(staged.transfer(from, to, *id, *amount)?);
        }

        *self.multi_mut(token)? = staged;
        self.events.extend(events);
        Ok(())
    }

    fn owner_of(&self, token: H160, id: U256) -> TokenResult<H160> {
        self.collectible(token)?.owner_of(id)
    }

    fn mint_collectibles(&mut self, token: H160, to: H160, amount: U256) -> TokenResult<Vec<U256>> {
        self.mint_collectible(token, to, amount)
    }

    fn burn_collectibles(&mut self, token: H160, from: H160, ids: &[U256]) -> TokenResult<()> {
        self.staged(|registry| {
            for id in ids {
                let event = registry.collectible_mut(token)?.burn(from, *id)?;
                registry.events.push(event);
            }
            Ok(())
        })
    }

    fn merge_collectibles(&mut self, token: H160, holder: H160, first: U256, second: U256) -> TokenResult<U256> {
        self.staged(|registry| {
            registry.burn_collectibles(token, holder, &[first, second])?;
            let ids = registry.mint_collectible(token, holder, U256::one())?;
            ids.first().copied().ok_or(TokenError::ArithmeticOverflow)
        })
    }

    fn craft(&mut self, recipe: &CraftRecipe, holder: H160) -> TokenResult<U256> {
        self.staged(|registry| {
            let events = registry
                .multi_mut(recipe.resource)?
                .burn_batch(holder, &recipe.ids, &recipe.amounts)?;
            registry.events.extend(events);
            registry.burn_fungible(recipe.currency, holder, recipe.currency_amount)?;

            let ids = registry.mint_collectible(recipe.asset, holder, U256::one())?;
            ids.first().copied().ok_or(TokenError::ArithmeticOverflow)
        })
    }

    fn create_multi(&mut self, token: H160, amount: U256) -> TokenResult<(U256, U256)> {
        self.multi_mut(token)?.create(amount)
    }

    fn mint_multi_batch(&mut self, token: H160, to: H160, ids: &[U256], amounts: &[U256]) -> TokenResult<()> {
        let events = self.multi_mut(token)?.mint_batch(to, ids, amounts)?;
        self.events.extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> H160 {
        H160::from_low_u64_be(1)
    }

    #[test]
    fn test_deploy_assigns_sequential_addresses() {
        let mut registry = AssetRegistry::new();
        let gold = registry.deploy_fungible("Gold".to_string(), "GLD".to_string(), 18, None);
        let heroes = registry.deploy_collectible("Heroes".to_string(), "HERO".to_string());

        assert_eq!(gold, H160::from_low_u64_be(2000));
        assert_eq!(heroes, H160::from_low_u64_be(2001));
        assert!(registry.fungible(gold).is_ok());
        assert_eq!(
            registry.fungible(heroes).err(),
            Some(TokenError::UnsupportedOperation { token: heroes })
        );
    }

    #[test]
    fn test_payout_mints_by_kind() {
        let mut registry = AssetRegistry::new();
        let gold = registry.deploy_fungible("Gold".to_string(), "GLD".to_string(), 18, None);
        let heroes = registry.deploy_collectible("Heroes".to_string(), "HERO".to_string());

        registry
            .payout(&Payout {
                token: gold,
                to: alice(),
                amount: U256::from(50),
            })
            .unwrap();
        registry
            .payout(&Payout {
                token: heroes,
                to: alice(),
                amount: U256::from(3),
            })
            .unwrap();

        assert_eq!(registry.balance_of(gold, alice()).unwrap(), U256::from(50));
        assert_eq!(registry.balance_of(heroes, alice()).unwrap(), U256::from(3));
        assert_eq!(registry.collectible(heroes).unwrap().owner_of(U256::from(3)).unwrap(), alice());
        assert_eq!(registry.events().len(), 4);
    }

    #[test]
    fn test_payout_to_unknown_token_fails() {
        let mut registry = AssetRegistry::new();
        let result = registry.payout(&Payout {
            token: H160::from_low_u64_be(9),
            to: alice(),
            amount: U256::one(),
        });
        assert!(matches!(result, Err(ClaimGateError::PayoutFailed(_))));
    }

    #[test]
    fn test_collectible_batch_is_all_or_nothing() {
        let bob = H160::from_low_u64_be(2);
        let mut registry = AssetRegistry::new();
        let heroes = registry.deploy_collectible("Heroes".to_string(), "HERO".to_string());
        registry.mint_collectible(heroes, alice(), U256::from(2)).unwrap();
        registry.mint_collectible(heroes, bob, U256::one()).unwrap();

        // id 3 belongs to bob
        let ids = [U256::from(1), U256::from(3)];
        assert!(registry.transfer_collectibles(heroes, alice(), bob, &ids).is_err());
        assert_eq!(registry.collectible(heroes).unwrap().owner_of(U256::one()).unwrap(), alice());

        let ids = [U256::from(1), U256::from(2)];
        registry.transfer_collectibles(heroes, alice(), bob, &ids).unwrap();
        assert_eq!(registry.balance_of(heroes, bob).unwrap(), U256::from(3));
    }

    #[test]
    fn test_multi_batch_transfer() {
        let bob = H160::from_low_u64_be(2);
        let mut registry = AssetRegistry::new();
        let items = registry.deploy_multi("Items".to_string());
        registry.create_multi(items, U256::from(2)).unwrap();
        registry.mint_multi(items, alice(), U256::one(), U256::from(5)).unwrap();
        registry.mint_multi(items, alice(), U256::from(2), U256::from(5)).unwrap();

        registry
            .transfer_multi(
                items,
                alice(),
                bob,
                &[U256::one(), U256::from(2)],
                &[U256::from(2), U256::from(5)],
            )
            .unwrap();

        let multi = registry.multi(items).unwrap();
        assert_eq!(multi.balance_of(bob, U256::one()), U256::from(2));
        assert_eq!(multi.balance_of(alice(), U256::from(2)), U256::zero());
    }

    #[test]
    fn test_oversized_collectible_payout_fails_fast() {
        let mut registry = AssetRegistry::new();
        let heroes = registry.deploy_collectible("Heroes".to_string(), "HERO".to_string());

        let result = registry.payout(&Payout {
            token: heroes,
            to: alice(),
            amount: U256::exp10(18),
        });
        assert!(matches!(result, Err(ClaimGateError::PayoutFailed(_))));
        assert_eq!(registry.balance_of(heroes, alice()).unwrap(), U256::zero());
    }

    #[test]
    fn test_merge_burns_two_and_mints_one() {
        let mut registry = AssetRegistry::new();
        let heroes = registry.deploy_collectible("Heroes".to_string(), "HERO".to_string());
        registry.mint_collectible(heroes, alice(), U256::from(3)).unwrap();

        let merged = registry
            .merge_collectibles(heroes, alice(), U256::one(), U256::from(2))
            .unwrap();
        assert_eq!(merged, U256::from(4));
        assert_eq!(registry.balance_of(heroes, alice()).unwrap(), U256::from(2));
        assert!(registry.owner_of(heroes, U256::one()).is_err());

        // second id already burned: the first stays
        assert!(registry
            .merge_collectibles(heroes, alice(), U256::from(3), U256::one())
            .is_err());
        assert_eq!(registry.owner_of(heroes, U256::from(3)).unwrap(), alice());
    }

    #[test]
    fn test_craft_is_all_or_nothing() {
        let mut registry = AssetRegistry::new();
        let heroes = registry.deploy_collectible("Heroes".to_string(), "HERO".to_string());
        let items = registry.deploy_multi("Items".to_string());
        let gold = registry.deploy_fungible("Gold".to_string(), "GLD".to_string(), 18, None);

        registry.create_multi(items, U256::from(2)).unwrap();
        registry
            .mint_multi_batch(items, alice(), &[U256::one(), U256::from(2)], &[U256::from(10), U256::from(20)])
            .unwrap();
        registry.mint_fungible(gold, alice(), U256::from(5)).unwrap();

        let mut recipe = CraftRecipe {
            asset: heroes,
            resource: items,
            ids: vec![U256::one(), U256::from(2)],
            amounts: vec![U256::from(10), U256::from(20)],
            currency: gold,
            currency_amount: U256::from(6),
        };

        // not enough gold: resources are not burned either
        assert!(matches!(
            registry.craft(&recipe, alice()),
            Err(TokenError::InsufficientBalance { .. })
        ));
        assert_eq!(registry.multi(items).unwrap().balance_of(alice(), U256::one()), U256::from(10));

        recipe.currency_amount = U256::from(5);
        assert_eq!(registry.craft(&recipe, alice()).unwrap(), U256::one());
        assert_eq!(registry.balance_of(gold, alice()).unwrap(), U256::zero());
        assert_eq!(registry.collectible(heroes).unwrap().owner_of(U256::one()).unwrap(), alice());
    }
}
