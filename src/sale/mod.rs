//! Phased primary sale of a collectible.
//!
//! Operators move the sale through its phases and tune its limits. During
//! the presale every purchase must carry an authority signature over
//! `packed(domain_id, asset, amount, buyer, nonce)`; the public sale needs
//! none. Purchased units are minted through a [`PayoutSink`].

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::authority::{AuthorityConfig, AuthorityEvent};
use crate::crypto::{Secp256k1Verifier, Signature, SignatureVerifier};
use crate::encoding::PackedEncoder;
use crate::engine::{Payout, PayoutSink};
use crate::ledger::{NonceKey, NonceRegistry, NonceScope};
use crate::ClaimGateError;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SaleError {
    #[error(transparent)]
    Core(#[from] ClaimGateError),

    #[error("Caller {caller:?} has no operator role")]
    NoOperatorRole { caller: H160 },

    #[error("Invalid max mint per tx")]
    InvalidMaxMintPerTx,

    #[error("Invalid max mint per address")]
    InvalidMaxMintPerAddress,

    #[error("Max mintable would exceed the minting cap")]
    ExceedCap,

    #[error("Sale is not going")]
    SaleNotGoing,

    #[error("Sale is not ended")]
    SaleNotEnded,

    #[error("Exceed max mint per tx")]
    ExceedMaxMintPerTx,

    #[error("Exceed max mint per address")]
    ExceedMaxMintPerAddress,

    #[error("Exceed max mintable")]
    ExceedMaxMintable,

    #[error("Insufficient eth: required {required}, provided {provided}")]
    InsufficientEth { required: U256, provided: U256 },

    #[error("NFT sold out")]
    NftSoldOut,
}

pub type SaleResult<T> = Result<T, SaleError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SalePhase {
    #[default]
    NotStarted,
    Presale,
    Sale,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    OperatorAdded { operator: H160 },
    OperatorRemoved { operator: H160 },
    OwnershipTransferred { old_owner: H160, new_owner: H160 },
    SignerSet { authority: H160 },
    PriceSet { price: U256 },
    MaxMintPerTxSet { value: U256 },
    MaxMintPerAddressSet { value: U256 },
    MaxMintableSet { value: U256 },
    PresaleStarted { operator: H160 },
    SaleStarted { operator: H160 },
    SaleEnded { operator: H160 },
    Purchased { buyer: H160, amount: U256, presale: bool },
    UnsoldTokensMinted { to: H160, amount: U256 },
    EthSent { to: H160, amount: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub buyer: H160,
    pub amount: U256,
    /// Value kept by the sale
    pub paid: U256,
    /// Excess value handed back to the buyer
    pub refund: U256,
    /// Presale nonce consumed, if any
    pub nonce: Option<U256>,
}

pub struct Sale<V: SignatureVerifier = Secp256k1Verifier> {
    domain_id: U256,
    authority: AuthorityConfig,
    asset: H160,

    /// Hard ceiling on everything this sale will ever mint
    cap: U256,

    operators: Vec<H160>,
    phase: SalePhase,
    price: U256,
    max_mint_per_tx: U256,
    max_mint_per_address: U256,
    max_mintable: U256,
    total_minted: U256,
    minted: HashMap<H160, U256>,
    minted_presale: HashMap<H160, U256>,
    nonces: NonceRegistry,

    /// Payment held by the sale
    proceeds: U256,

    verifier: V,
    events: Vec<SaleEvent>,
}

impl Sale<Secp256k1Verifier> {
    pub fn new(domain_id: U256, authority: AuthorityConfig, asset: H160, cap: U256) -> SaleResult<Self> {
        Self::with_verifier(domain_id, authority, asset, cap, Secp256k1Verifier::new())
    }
}

impl<V: SignatureVerifier> Sale<V> {
    pub fn with_verifier(
        domain_id: U256,
        mut authority: AuthorityConfig,
        asset: H160,
        cap: U256,
        verifier: V,
    ) -> SaleResult<Self> {
        if asset.is_zero() {
            return Err(ClaimGateError::InvalidAddress { address: asset }.into());
        }
        if asset == authority.authority() {
            return Err(ClaimGateError::InvalidAddress { address: asset }.into());
        }
        authority.reserve(asset);
        let owner = authority.owner;

        Ok(Self {
            domain_id,
            authority,
            asset,
            cap,
            operators: vec![owner],
            phase: SalePhase::NotStarted,
            price: U256::zero(),
            max_mint_per_tx: U256::one(),
            max_mint_per_address: U256::one(),
            max_mintable: U256::zero(),
            total_minted: U256::zero(),
            minted: HashMap::new(),
            minted_presale: HashMap::new(),
            nonces: NonceRegistry::new(),
            proceeds: U256::zero(),
            verifier,
            events: Vec::new(),
        })
    }

    pub fn phase(&self) -> SalePhase {
        self.phase
    }

    pub fn price(&self) -> U256 {
        self.price
    }

    pub fn total_minted(&self) -> U256 {
        self.total_minted
    }

    pub fn max_mintable(&self) -> U256 {
        self.max_mintable
    }

    /// Units bought by `account` in the public sale
    pub fn minted(&self, account: H160) -> U256 {
        self.minted.get(&account).copied().unwrap_or_default()
    }

    /// Units bought by `account` in the presale
    pub fn minted_presale(&self, account: H160) -> U256 {
        self.minted_presale.get(&account).copied().unwrap_or_default()
    }

    pub fn proceeds(&self) -> U256 {
        self.proceeds
    }

    pub fn next_nonce(&self, account: H160) -> SaleResult<U256> {
        Ok(self.nonces.next(&Self::nonce_key(account))?)
    }

    fn nonce_key(account: H160) -> NonceKey {
        NonceKey::new(NonceScope::PerClaimant, account, None)
    }

    pub fn owner(&self) -> H160 {
        self.authority.owner
    }

    pub fn authority(&self) -> H160 {
        self.authority.authority()
    }

    pub fn is_operator(&self, account: H160) -> bool {
        self.operators.contains(&account)
    }

    pub fn events(&self) -> &[SaleEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SaleEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn add_operator(&mut self, caller: H160, operator: H160) -> SaleResult<()> {
        self.authority.ensure_owner(caller)?;
        if operator.is_zero() {
            return Err(ClaimGateError::InvalidAddress { address: operator }.into());
        }
        if self.is_operator(operator) {
            return Err(ClaimGateError::NoChangeToTheState.into());
        }

        self.operators.push(operator);
        tracing::info!("Added sale operator {:?}", operator);
        self.events.push(SaleEvent::OperatorAdded { operator });
        Ok(())
    }

    /// Revoke `operator`. Revoking an address without the role is a no-op.
    pub fn remove_operator(&mut self, caller: H160, operator: H160) -> SaleResult<()> {
        self.authority.ensure_owner(caller)?;
        if !self.is_operator(operator) {
            return Ok(());
        }

        self.operators.retain(|op| *op != operator);
        tracing::info!("Removed sale operator {:?}", operator);
        self.events.push(SaleEvent::OperatorRemoved { operator });
        Ok(())
    }

    /// Hand the sale to `new_owner`. The operator role moves with ownership.
    pub fn transfer_ownership(&mut self, caller: H160, new_owner: H160) -> SaleResult<()> {
        if let AuthorityEvent::OwnershipTransferred {
            old_owner,
            new_owner,
        } = self.authority.transfer_ownership(caller, new_owner)?
        {
            self.operators.retain(|op| *op != old_owner);
            if !self.is_operator(new_owner) {
                self.operators.push(new_owner);
            }
            self.events.push(SaleEvent::OwnershipTransferred {
                old_owner,
                new_owner,
            });
        }
        Ok(())
    }

    /// Replace the presale signer; owner only
    pub fn set_signer(&mut self, caller: H160, new_authority: H160) -> SaleResult<()> {
        if let AuthorityEvent::SignerSet { authority } =
            self.authority.set_authority(caller, new_authority)?
        {
            self.events.push(SaleEvent::SignerSet { authority });
        }
        Ok(())
    }

    fn ensure_operator(&self, caller: H160) -> SaleResult<()> {
        if !self.is_operator(caller) {
            return Err(SaleError::NoOperatorRole { caller });
        }
        Ok(())
    }

    pub fn set_price(&mut self, caller: H160, price: U256) -> SaleResult<()> {
        self.ensure_operator(caller)?;
        self.price = price;
        self.events.push(SaleEvent::PriceSet { price });
        Ok(())
    }

    pub fn set_max_mint_per_tx(&mut self, caller: H160, value: U256) -> SaleResult<()> {
        self.ensure_operator(caller)?;
        if value.is_zero() {
            return Err(SaleError::InvalidMaxMintPerTx);
        }
        if value == self.max_mint_per_tx {
            return Err(ClaimGateError::NoChangeToTheState.into());
        }

        self.max_mint_per_tx = value;
        self.events.push(SaleEvent::MaxMintPerTxSet { value });
        Ok(())
    }

    pub fn set_max_mint_per_address(&mut self, caller: H160, value: U256) -> SaleResult<()> {
        self.ensure_operator(caller)?;
        if value.is_zero() {
            return Err(SaleError::InvalidMaxMintPerAddress);
        }
        if value == self.max_mint_per_address {
            return Err(ClaimGateError::NoChangeToTheState.into());
        }

        self.max_mint_per_address = value;
        self.events.push(SaleEvent::MaxMintPerAddressSet { value });
        Ok(())
    }

    /// Raise the number of units the sale may mint by `amount`
    pub fn increase_max_mintable(&mut self, caller: H160, amount: U256) -> SaleResult<()> {
        self.ensure_operator(caller)?;
        if amount.is_zero() {
            return Err(ClaimGateError::InvalidAmount.into());
        }

        let value = self
            .max_mintable
            .checked_add(amount)
            .ok_or(ClaimGateError::ArithmeticOverflow)?;
        if value > self.cap {
            return Err(SaleError::ExceedCap);
        }

        self.max_mintable = value;
        self.events.push(SaleEvent::MaxMintableSet { value });
        Ok(())
    }

    pub fn start_presale(&mut self, caller: H160) -> SaleResult<()> {
        self.set_phase(caller, SalePhase::Presale)?;
        self.events.push(SaleEvent::PresaleStarted { operator: caller });
        Ok(())
    }

    pub fn start_sale(&mut self, caller: H160) -> SaleResult<()> {
        self.set_phase(caller, SalePhase::Sale)?;
        self.events.push(SaleEvent::SaleStarted { operator: caller });
        Ok(())
    }

    pub fn end_sale(&mut self, caller: H160) -> SaleResult<()> {
        self.set_phase(caller, SalePhase::Ended)?;
        self.events.push(SaleEvent::SaleEnded { operator: caller });
        Ok(())
    }

    fn set_phase(&mut self, caller: H160, phase: SalePhase) -> SaleResult<()> {
        self.ensure_operator(caller)?;
        if self.phase == phase {
            return Err(ClaimGateError::NoChangeToTheState.into());
        }

        tracing::info!("Sale phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        Ok(())
    }

    /// Buy `amount` units paying `value`. `signature` is only read during
    /// the presale.
    pub fn purchase<S: PayoutSink + ?Sized>(
        &mut self,
        caller: H160,
        amount: U256,
        signature: Option<&Signature>,
        value: U256,
        sink: &mut S,
    ) -> SaleResult<PurchaseReceipt> {
        let presale = match self.phase {
            SalePhase::Presale => true,
            SalePhase::Sale => false,
            _ => return Err(SaleError::SaleNotGoing),
        };

        if amount.is_zero() {
            return Err(ClaimGateError::InvalidAmount.into());
        }

        let total_minted = self
            .total_minted
            .checked_add(amount)
            .ok_or(ClaimGateError::ArithmeticOverflow)?;
        if total_minted > self.max_mintable {
            return Err(SaleError::ExceedMaxMintable);
        }

        if amount > self.max_mint_per_tx {
            return Err(SaleError::ExceedMaxMintPerTx);
        }

        let key = Self::nonce_key(caller);
        let nonce = if presale {
            let nonce = self.nonces.next(&key)?;
            let message_hash = PackedEncoder::new()
                .uint(self.domain_id)
                .address(self.asset)
                .uint(amount)
                .address(caller)
                .uint(nonce)
                .hash();

            let authorized = signature
                .map(|sig| self.verifier.is_authorized(message_hash, sig, self.authority.authority()))
                .unwrap_or(false);
            if !authorized {
                tracing::debug!("Presale purchase by {:?} rejected: invalid signature", caller);
                return Err(ClaimGateError::InvalidSignature.into());
            }
            Some(nonce)
        } else {
            None
        };

        let required = self
            .price
            .checked_mul(amount)
            .ok_or(ClaimGateError::ArithmeticOverflow)?;
        if value < required {
            return Err(SaleError::InsufficientEth {
                required,
                provided: value,
            });
        }

        let counters = if presale {
            &self.minted_presale
        } else {
            &self.minted
        };
        let bought = counters
            .get(&caller)
            .copied()
            .unwrap_or_default()
            .checked_add(amount)
            .ok_or(ClaimGateError::ArithmeticOverflow)?;
        if bought > self.max_mint_per_address {
            return Err(SaleError::ExceedMaxMintPerAddress);
        }

        let proceeds = self
            .proceeds
            .checked_add(required)
            .ok_or(ClaimGateError::ArithmeticOverflow)?;

        // commit, then mint
        let previous_total = self.total_minted;
        let previous_bought = bought - amount;
        let previous_proceeds = self.proceeds;
        let previous_nonce = self.nonces.current(&key);

        self.total_minted = total_minted;
        self.proceeds = proceeds;
        self.counters_mut(presale).insert(caller, bought);
        if presale {
            self.nonces.advance(&key)?;
        }

        let payout = Payout {
            token: self.asset,
            to: caller,
            amount,
        };
        if let Err(e) = sink.payout(&payout) {
            self.total_minted = previous_total;
            self.proceeds = previous_proceeds;
            self.counters_mut(presale).insert(caller, previous_bought);
            self.nonces.restore(&key, previous_nonce);
            tracing::warn!("Mint for {:?} failed, purchase rolled back: {}", caller, e);
            return Err(e.into());
        }

        tracing::info!(
            "{:?} bought {} (presale: {}, paid {})",
            caller,
            amount,
            presale,
            required
        );
        self.events.push(SaleEvent::Purchased {
            buyer: caller,
            amount,
            presale,
        });

        Ok(PurchaseReceipt {
            buyer: caller,
            amount,
            paid: required,
            refund: value - required,
            nonce,
        })
    }

    fn counters_mut(&mut self, presale: bool) -> &mut HashMap<H160, U256> {
        if presale {
            &mut self.minted_presale
        } else {
            &mut self.minted
        }
    }

    /// Mint whatever the cap still allows to `to` once the sale has ended
    pub fn mint_unsold<S: PayoutSink + ?Sized>(&mut self, caller: H160, to: H160, sink: &mut S) -> SaleResult<U256> {
        self.ensure_operator(caller)?;
        if self.phase != SalePhase::Ended {
            return Err(SaleError::SaleNotEnded);
        }

        let unsold = self.cap.saturating_sub(self.total_minted);
        if unsold.is_zero() {
            return Err(SaleError::NftSoldOut);
        }

        let previous_total = self.total_minted;
        self.total_minted = self.cap;

        let payout = Payout {
            token: self.asset,
            to,
            amount: unsold,
        };
        if let Err(e) = sink.payout(&payout) {
            self.total_minted = previous_total;
            return Err(e.into());
        }

        tracing::info!("Minted {} unsold units to {:?}", unsold, to);
        self.events.push(SaleEvent::UnsoldTokensMinted { to, amount: unsold });
        Ok(unsold)
    }

    /// Hand every held payment to `to`; owner only
    pub fn withdraw_proceeds(&mut self, caller: H160, to: H160) -> SaleResult<U256> {
        self.authority.ensure_owner(caller)?;
        if to.is_zero() {
            return Err(ClaimGateError::InvalidAddress { address: to }.into());
        }

        let amount = std::mem::take(&mut self.proceeds);
        tracing::info!("Sent {} to {:?}", amount, to);
        self.events.push(SaleEvent::EthSent { to, amount });
        Ok(amount)
    }
}
