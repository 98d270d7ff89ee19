//! Game portal vault.
//!
//! Players move accepted assets into and out of the portal's custody. Every
//! move must be countersigned by the authority over
//! `packed(operation, domain_id, token, fields.., caller, nonce)`, where the
//! nonce is one sequence per player shared by all eight operations.
//!
//! The owner also runs the game economy directly: minting, merging,
//! crafting and burning assets, and creating and minting resources. Those
//! calls need no signature and are not stopped by a pause.

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::authority::{AuthorityConfig, AuthorityEvent};
use crate::crypto::{Secp256k1Verifier, Signature, SignatureVerifier};
use crate::encoding::PackedEncoder;
use crate::ledger::{NonceKey, NonceRegistry, NonceScope};
use crate::token::{TokenError, TokenResult};
use crate::ClaimGateError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortalError {
    #[error(transparent)]
    Core(#[from] ClaimGateError),

    #[error("Portal is paused")]
    Paused,

    #[error("Token {token:?} is not accepted as {kind}")]
    NotAccepted { token: H160, kind: AssetKind },

    #[error("Empty array")]
    EmptyArray,

    #[error("Array length mismatch: {ids} ids, {amounts} amounts")]
    ArrayLengthMismatch { ids: usize, amounts: usize },

    #[error("Token id {id} is not locked in the portal")]
    NftNotLocked { id: U256 },

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TokenError),
}

pub type PortalResult<T> = Result<T, PortalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Erc20,
    Erc721,
    Erc1155,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Erc20 => write!(f, "ERC20"),
            AssetKind::Erc721 => write!(f, "ERC721"),
            AssetKind::Erc1155 => write!(f, "ERC1155"),
        }
    }
}

/// Which standards a token is accepted as. Setting acceptance replaces every
/// flag at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Acceptance {
    pub erc20: bool,
    pub erc721: bool,
    pub erc1155: bool,
}

impl Acceptance {
    pub fn allows(&self, kind: AssetKind) -> bool {
        match kind {
            AssetKind::Erc20 => self.erc20,
            AssetKind::Erc721 => self.erc721,
            AssetKind::Erc1155 => self.erc1155,
        }
    }
}

/// Ingredients of a crafted asset: resources and currency burned from the
/// portal's holdings in exchange for one new asset id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftRecipe {
    pub asset: H160,
    pub resource: H160,
    pub ids: Vec<U256>,
    pub amounts: Vec<U256>,
    pub currency: H160,
    pub currency_amount: U256,
}

/// Moves, mints and burns assets on the portal's behalf. Every call is
/// all-or-nothing.
pub trait AssetTransfer {
    fn transfer_fungible(&mut self, token: H160, from: H160, to: H160, amount: U256) -> TokenResult<()>;

    fn transfer_collectibles(&mut self, token: H160, from: H160, to: H160, ids: &[U256]) -> TokenResult<()>;

    fn transfer_multi(
        &mut self,
        token: H160,
        from: H160,
        to: H160,
        ids: &[U256],
        amounts: &[U256],
    ) -> TokenResult<()>;

    fn owner_of(&self, token: H160, id: U256) -> TokenResult<H160>;

    /// Mint `amount` new collectible ids to `to`
    fn mint_collectibles(&mut self, token: H160, to: H160, amount: U256) -> TokenResult<Vec<U256>>;

    fn burn_collectibles(&mut self, token: H160, from: H160, ids: &[U256]) -> TokenResult<()>;

    /// Burn two ids held by `holder` and mint one new id to it
    fn merge_collectibles(&mut self, token: H160, holder: H160, first: U256, second: U256) -> TokenResult<U256>;

    /// Burn the recipe's inputs from `holder` and mint the crafted id to it
    fn craft(&mut self, recipe: &CraftRecipe, holder: H160) -> TokenResult<U256>;

    /// Open `amount` new multi-token ids, returning the first and last
    fn create_multi(&mut self, token: H160, amount: U256) -> TokenResult<(U256, U256)>;

    fn mint_multi_batch(&mut self, token: H160, to: H160, ids: &[U256], amounts: &[U256]) -> TokenResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortalEvent {
    Erc20Deposited {
        token: H160,
        from: H160,
        amount: U256,
    },
    Erc721Deposited {
        token: H160,
        from: H160,
        id: U256,
    },
    Erc1155Deposited {
        token: H160,
        from: H160,
        id: U256,
        amount: U256,
    },
    Erc20Withdrawn {
        token: H160,
        to: H160,
        amount: U256,
    },
    Erc721Withdrawn {
        token: H160,
        to: H160,
        ids: Vec<U256>,
    },
    Erc1155Withdrawn {
        token: H160,
        to: H160,
        ids: Vec<U256>,
        amounts: Vec<U256>,
    },
    TokenAcceptanceSet {
        token: H160,
        acceptance: Acceptance,
    },
    PauseStatusChanged {
        paused: bool,
    },
    SignerSet {
        authority: H160,
    },
    AssetMinted {
        token: H160,
        to: H160,
        ids: Vec<U256>,
    },
    AssetMerged {
        token: H160,
        burned: [U256; 2],
        minted: U256,
    },
    AssetCrafted {
        recipe: CraftRecipe,
        minted: U256,
    },
    AssetBurned {
        token: H160,
        ids: Vec<U256>,
    },
    ResourceCreated {
        token: H160,
        first: U256,
        last: U256,
    },
    ResourceMinted {
        token: H160,
        to: H160,
        ids: Vec<U256>,
        amounts: Vec<U256>,
    },
}

pub struct GamePortal<V: SignatureVerifier = Secp256k1Verifier> {
    domain_id: U256,
    authority: AuthorityConfig,
    accepted: HashMap<H160, Acceptance>,
    nonces: NonceRegistry,
    paused: bool,
    verifier: V,
    events: Vec<PortalEvent>,
}

impl GamePortal<Secp256k1Verifier> {
    pub fn new(domain_id: U256, authority: AuthorityConfig) -> Self {
        Self::with_verifier(domain_id, authority, Secp256k1Verifier::new())
    }
}

impl<V: SignatureVerifier> GamePortal<V> {
    pub fn with_verifier(domain_id: U256, authority: AuthorityConfig, verifier: V) -> Self {
        Self {
            domain_id,
            authority,
            accepted: HashMap::new(),
            nonces: NonceRegistry::new(),
            paused: false,
            verifier,
            events: Vec::new(),
        }
    }

    /// Custody address of the vault
    pub fn address(&self) -> H160 {
        self.authority.contract
    }

    pub fn authority(&self) -> H160 {
        self.authority.authority()
    }

    pub fn accepted(&self, token: H160) -> Acceptance {
        self.accepted.get(&token).copied().unwrap_or_default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Nonce `account`'s next portal authorization must carry
    pub fn next_nonce(&self, account: H160) -> PortalResult<U256> {
        Ok(self.nonces.next(&Self::nonce_key(account))?)
    }

    fn nonce_key(account: H160) -> NonceKey {
        NonceKey::new(NonceScope::PerClaimant, account, None)
    }

    pub fn events(&self) -> &[PortalEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PortalEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_token_acceptance(
        &mut self,
        caller: H160,
        token: H160,
        acceptance: Acceptance,
    ) -> PortalResult<()> {
        self.authority.ensure_owner(caller)?;

        if token.is_zero() || token == self.authority.contract {
            return Err(ClaimGateError::InvalidAddress { address: token }.into());
        }

        self.accepted.insert(token, acceptance);
        // a token contract can never sign
        self.authority.reserve(token);

        tracing::info!("Token {:?} acceptance set to {:?}", token, acceptance);
        self.events
            .push(PortalEvent::TokenAcceptanceSet { token, acceptance });
        Ok(())
    }

    pub fn pause(&mut self, caller: H160) -> PortalResult<()> {
        self.set_paused(caller, true)
    }

    pub fn unpause(&mut self, caller: H160) -> PortalResult<()> {
        self.set_paused(caller, false)
    }

    fn set_paused(&mut self, caller: H160, paused: bool) -> PortalResult<()> {
        self.authority.ensure_owner(caller)?;
        if self.paused == paused {
            return Err(ClaimGateError::NoChangeToTheState.into());
        }

        self.paused = paused;
        tracing::info!("Portal paused: {}", paused);
        self.events.push(PortalEvent::PauseStatusChanged { paused });
        Ok(())
    }

    pub fn set_signer(&mut self, caller: H160, new_authority: H160) -> PortalResult<()> {
        if let AuthorityEvent::SignerSet { authority } =
            self.authority.set_authority(caller, new_authority)?
        {
            self.events.push(PortalEvent::SignerSet { authority });
        }
        Ok(())
    }

    pub fn deposit_erc20<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        amount: U256,
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc20)?;
        ensure_amount(amount)?;

        let vault = self.address();
        self.execute(
            caller,
            "depositERC20",
            token,
            |enc| enc.uint(amount),
            signature,
            |assets: &mut T| assets.transfer_fungible(token, caller, vault, amount),
            assets,
        )?;

        self.emit(PortalEvent::Erc20Deposited {
            token,
            from: caller,
            amount,
        });
        Ok(())
    }

    pub fn deposit_erc721<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        id: U256,
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc721)?;

        let vault = self.address();
        self.execute(
            caller,
            "depositERC721",
            token,
            |enc| enc.uint(id),
            signature,
            |assets: &mut T| assets.transfer_collectibles(token, caller, vault, &[id]),
            assets,
        )?;

        self.emit(PortalEvent::Erc721Deposited {
            token,
            from: caller,
            id,
        });
        Ok(())
    }

    pub fn deposit_erc1155<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        id: U256,
        amount: U256,
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc1155)?;
        ensure_amount(amount)?;

        let vault = self.address();
        self.execute(
            caller,
            "depositERC1155",
            token,
            |enc| enc.uint(id).uint(amount),
            signature,
            |assets: &mut T| assets.transfer_multi(token, caller, vault, &[id], &[amount]),
            assets,
        )?;

        self.emit(PortalEvent::Erc1155Deposited {
            token,
            from: caller,
            id,
            amount,
        });
        Ok(())
    }

    pub fn withdraw_erc20<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        amount: U256,
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc20)?;
        ensure_amount(amount)?;

        let vault = self.address();
        self.execute(
            caller,
            "withdrawERC20",
            token,
            |enc| enc.uint(amount),
            signature,
            |assets: &mut T| assets.transfer_fungible(token, vault, caller, amount),
            assets,
        )?;

        self.emit(PortalEvent::Erc20Withdrawn {
            token,
            to: caller,
            amount,
        });
        Ok(())
    }

    pub fn withdraw_erc721<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        id: U256,
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc721)?;

        let vault = self.address();
        self.execute(
            caller,
            "withdrawERC721",
            token,
            |enc| enc.uint(id),
            signature,
            |assets: &mut T| assets.transfer_collectibles(token, vault, caller, &[id]),
            assets,
        )?;

        self.emit(PortalEvent::Erc721Withdrawn {
            token,
            to: caller,
            ids: vec![id],
        });
        Ok(())
    }

    pub fn withdraw_erc721_batch<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        ids: &[U256],
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc721)?;
        if ids.is_empty() {
            return Err(PortalError::EmptyArray);
        }

        let vault = self.address();
        self.execute(
            caller,
            "withdrawERC721Batch",
            token,
            |enc| enc.uint_array(ids),
            signature,
            |assets: &mut T| assets.transfer_collectibles(token, vault, caller, ids),
            assets,
        )?;

        self.emit(PortalEvent::Erc721Withdrawn {
            token,
            to: caller,
            ids: ids.to_vec(),
        });
        Ok(())
    }

    pub fn withdraw_erc1155<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        id: U256,
        amount: U256,
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc1155)?;
        ensure_amount(amount)?;

        let vault = self.address();
        self.execute(
            caller,
            "withdrawERC1155",
            token,
            |enc| enc.uint(id).uint(amount),
            signature,
            |assets: &mut T| assets.transfer_multi(token, vault, caller, &[id], &[amount]),
            assets,
        )?;

        self.emit(PortalEvent::Erc1155Withdrawn {
            token,
            to: caller,
            ids: vec![id],
            amounts: vec![amount],
        });
        Ok(())
    }

    pub fn withdraw_erc1155_batch<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        ids: &[U256],
        amounts: &[U256],
        signature: &Signature,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.ensure_accepted(token, AssetKind::Erc1155)?;
        ensure_batch(ids, amounts)?;
        for amount in amounts {
            ensure_amount(*amount)?;
        }

        let vault = self.address();
        self.execute(
            caller,
            "withdrawERC1155Batch",
            token,
            |enc| enc.uint_array(ids).uint_array(amounts),
            signature,
            |assets: &mut T| assets.transfer_multi(token, vault, caller, ids, amounts),
            assets,
        )?;

        self.emit(PortalEvent::Erc1155Withdrawn {
            token,
            to: caller,
            ids: ids.to_vec(),
            amounts: amounts.to_vec(),
        });
        Ok(())
    }

    /// Mint one new asset id to `to`; owner only
    pub fn mint_asset<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        to: H160,
        assets: &mut T,
    ) -> PortalResult<U256> {
        self.authority.ensure_owner(caller)?;
        self.ensure_kind(token, AssetKind::Erc721)?;

        let ids = assets.mint_collectibles(token, to, U256::one())?;
        let id = ids.first().copied().ok_or(ClaimGateError::ArithmeticOverflow)?;

        tracing::info!("Minted asset {} of {:?} to {:?}", id, token, to);
        self.emit(PortalEvent::AssetMinted { token, to, ids });
        Ok(id)
    }

    pub fn mint_batch_asset<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        to: H160,
        amount: U256,
        assets: &mut T,
    ) -> PortalResult<Vec<U256>> {
        self.authority.ensure_owner(caller)?;
        self.ensure_kind(token, AssetKind::Erc721)?;

        let ids = assets.mint_collectibles(token, to, amount)?;

        tracing::info!("Minted {} assets of {:?} to {:?}", ids.len(), token, to);
        self.emit(PortalEvent::AssetMinted {
            token,
            to,
            ids: ids.clone(),
        });
        Ok(ids)
    }

    /// Burn two assets locked in the portal and lock a new one in their place
    pub fn merge_asset<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        first: U256,
        second: U256,
        assets: &mut T,
    ) -> PortalResult<U256> {
        self.authority.ensure_owner(caller)?;
        self.ensure_kind(token, AssetKind::Erc721)?;

        let vault = self.address();
        for id in [first, second] {
            if assets.owner_of(token, id)? != vault {
                return Err(PortalError::NftNotLocked { id });
            }
        }

        let minted = assets.merge_collectibles(token, vault, first, second)?;

        tracing::info!("Merged assets {} and {} of {:?} into {}", first, second, token, minted);
        self.emit(PortalEvent::AssetMerged {
            token,
            burned: [first, second],
            minted,
        });
        Ok(minted)
    }

    /// Spend locked resources and currency on a new asset locked in the portal
    pub fn craft_asset<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        recipe: &CraftRecipe,
        assets: &mut T,
    ) -> PortalResult<U256> {
        self.authority.ensure_owner(caller)?;
        self.ensure_kind(recipe.asset, AssetKind::Erc721)?;
        self.ensure_kind(recipe.resource, AssetKind::Erc1155)?;
        self.ensure_kind(recipe.currency, AssetKind::Erc20)?;
        ensure_batch(&recipe.ids, &recipe.amounts)?;

        let minted = assets.craft(recipe, self.address())?;

        tracing::info!("Crafted asset {} of {:?}", minted, recipe.asset);
        self.emit(PortalEvent::AssetCrafted {
            recipe: recipe.clone(),
            minted,
        });
        Ok(minted)
    }

    /// Burn an asset locked in the portal
    pub fn burn_asset<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        id: U256,
        assets: &mut T,
    ) -> PortalResult<()> {
        self.burn_batch_asset(caller, token, &[id], assets)
    }

    pub fn burn_batch_asset<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        ids: &[U256],
        assets: &mut T,
    ) -> PortalResult<()> {
        self.authority.ensure_owner(caller)?;
        self.ensure_kind(token, AssetKind::Erc721)?;
        if ids.is_empty() {
            return Err(PortalError::EmptyArray);
        }

        assets.burn_collectibles(token, self.address(), ids)?;

        tracing::info!("Burned {} assets of {:?}", ids.len(), token);
        self.emit(PortalEvent::AssetBurned {
            token,
            ids: ids.to_vec(),
        });
        Ok(())
    }

    /// Open `amount` new resource ids on `token`
    pub fn create_resource<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        amount: U256,
        assets: &mut T,
    ) -> PortalResult<(U256, U256)> {
        self.authority.ensure_owner(caller)?;
        self.ensure_kind(token, AssetKind::Erc1155)?;
        ensure_amount(amount)?;

        let (first, last) = assets.create_multi(token, amount)?;

        tracing::info!("Created resource ids {}..={} on {:?}", first, last, token);
        self.emit(PortalEvent::ResourceCreated { token, first, last });
        Ok((first, last))
    }

    pub fn mint_batch_resource<T: AssetTransfer + ?Sized>(
        &mut self,
        caller: H160,
        token: H160,
        to: H160,
        ids: &[U256],
        amounts: &[U256],
        assets: &mut T,
    ) -> PortalResult<()> {
        self.authority.ensure_owner(caller)?;
        self.ensure_kind(token, AssetKind::Erc1155)?;
        ensure_batch(ids, amounts)?;

        assets.mint_multi_batch(token, to, ids, amounts)?;

        tracing::info!("Minted {} resource ids of {:?} to {:?}", ids.len(), token, to);
        self.emit(PortalEvent::ResourceMinted {
            token,
            to,
            ids: ids.to_vec(),
            amounts: amounts.to_vec(),
        });
        Ok(())
    }

    fn ensure_accepted(&self, token: H160, kind: AssetKind) -> PortalResult<()> {
        if self.paused {
            return Err(PortalError::Paused);
        }
        self.ensure_kind(token, kind)
    }

    fn ensure_kind(&self, token: H160, kind: AssetKind) -> PortalResult<()> {
        if !self.accepted(token).allows(kind) {
            return Err(PortalError::NotAccepted { token, kind });
        }
        Ok(())
    }

    /// Verify the authority's signature over the operation, consume the
    /// caller's nonce, then move the assets. A failed move gives the nonce
    /// back.
    #[allow(clippy::too_many_arguments)]
    fn execute<T, F, M>(
        &mut self,
        caller: H160,
        operation: &str,
        token: H160,
        fields: F,
        signature: &Signature,
        transfer: M,
        assets: &mut T,
    ) -> PortalResult<()>
    where
        T: AssetTransfer + ?Sized,
        F: FnOnce(PackedEncoder) -> PackedEncoder,
        M: FnOnce(&mut T) -> TokenResult<()>,
    {
        let key = Self::nonce_key(caller);
        let nonce = self.nonces.next(&key)?;

        let head = PackedEncoder::new()
            .string(operation)
            .uint(self.domain_id)
            .address(token);
        let message_hash = fields(head).address(caller).uint(nonce).hash();

        if !self
            .verifier
            .is_authorized(message_hash, signature, self.authority.authority())
        {
            tracing::debug!("{} by {:?} rejected: invalid signature", operation, caller);
            return Err(ClaimGateError::InvalidSignature.into());
        }

        let previous = self.nonces.current(&key);
        self.nonces.advance(&key)?;

        if let Err(e) = transfer(assets) {
            self.nonces.restore(&key, previous);
            tracing::warn!("{} by {:?} failed: {}", operation, caller, e);
            return Err(e.into());
        }

        tracing::info!("{} by {:?} on {:?} (nonce {})", operation, caller, token, nonce);
        Ok(())
    }

    fn emit(&mut self, event: PortalEvent) {
        self.events.push(event);
    }
}

fn ensure_batch(ids: &[U256], amounts: &[U256]) -> PortalResult<()> {
    if ids.is_empty() {
        return Err(PortalError::EmptyArray);
    }
    if ids.len() != amounts.len() {
        return Err(PortalError::ArrayLengthMismatch {
            ids: ids.len(),
            amounts: amounts.len(),
        });
    }
    Ok(())
}

fn ensure_amount(amount: U256) -> PortalResult<()> {
    if amount.is_zero() {
        return Err(ClaimGateError::InvalidAmount.into());
    }
    Ok(())
}
