//! Claim authorization engine.
//!
//! A claim is accepted only when the trusted authority signed the exact
//! parameters presented (bound to this domain and to the claimant's next
//! nonce) and the cumulative ledger total stays within the signed ceiling.
//! Internal state is committed before the payout sink runs; a failing payout
//! rolls the ledger and nonce back so a rejected claim leaves nothing behind.

use chrono::{DateTime, Utc};
use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};

use crate::authority::{AuthorityConfig, AuthorityEvent};
use crate::crypto::{Secp256k1Verifier, Signature, SignatureVerifier};
use crate::encoding::ClaimMessage;
use crate::ledger::{ClaimKey, ClaimLedger, NonceKey, NonceRegistry, NonceScope};
use crate::storage::EngineSnapshot;
use crate::{ClaimGateError, Result};

/// Order in which the ceiling and the signature are validated.
///
/// The zero-amount check always runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOrder {
    /// Ceiling, then signature: an exhausted line reports `InvalidAmount`
    /// even when the signature is also wrong.
    #[default]
    AmountFirst,
    /// Signature, then ceiling
    SignatureFirst,
}

/// A claim as submitted by the claimant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub resource: Option<H160>,
    pub amount: U256,
    pub ceiling: U256,
    pub source: U256,
    pub signature: Signature,
}

/// External effect triggered once per accepted claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Asset to mint or release: the claim's resource, or the engine's own
    /// contract address when the claim names none
    pub token: H160,
    pub to: H160,
    pub amount: U256,
}

/// Performs payouts. An error aborts the claim that requested it.
pub trait PayoutSink {
    fn payout(&mut self, payout: &Payout) -> Result<()>;
}

impl<T: PayoutSink + ?Sized> PayoutSink for &mut T {
    fn payout(&mut self, payout: &Payout) -> Result<()> {
        (**self).payout(payout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub claimant: H160,
    pub key: ClaimKey,
    pub slot: H256,
    pub amount: U256,
    pub total: U256,
    pub nonce: U256,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimEvent {
    Claimed {
        claimant: H160,
        slot: H256,
        amount: U256,
        total: U256,
    },
    SignerSet {
        authority: H160,
    },
    OwnershipTransferred {
        old_owner: H160,
        new_owner: H160,
    },
}

impl From<AuthorityEvent> for ClaimEvent {
    fn from(event: AuthorityEvent) -> Self {
        match event {
            AuthorityEvent::SignerSet { authority } => ClaimEvent::SignerSet { authority },
            AuthorityEvent::OwnershipTransferred {
                old_owner,
                new_owner,
            } => ClaimEvent::OwnershipTransferred {
                old_owner,
                new_owner,
            },
        }
    }
}

pub struct ClaimEngine<V: SignatureVerifier = Secp256k1Verifier> {
    domain_id: U256,
    authority: AuthorityConfig,
    ledger: ClaimLedger,
    nonces: NonceRegistry,
    check_order: CheckOrder,
    nonce_scope: NonceScope,
    verifier: V,
    events: Vec<ClaimEvent>,
}

impl ClaimEngine<Secp256k1Verifier> {
    pub fn new(domain_id: U256, authority: AuthorityConfig) -> Self {
        Self::with_verifier(domain_id, authority, Secp256k1Verifier::new())
    }

    /// Rebuild an engine from persisted state
    pub fn from_snapshot(snapshot: EngineSnapshot) -> Self {
        Self {
            domain_id: snapshot.domain_id,
            authority: snapshot.authority,
            ledger: snapshot.ledger,
            nonces: snapshot.nonces,
            check_order: snapshot.check_order,
            nonce_scope: snapshot.nonce_scope,
            verifier: Secp256k1Verifier::new(),
            events: Vec::new(),
        }
    }
}

impl<V: SignatureVerifier> ClaimEngine<V> {
    pub fn with_verifier(domain_id: U256, authority: AuthorityConfig, verifier: V) -> Self {
        Self {
            domain_id,
            authority,
            ledger: ClaimLedger::new(),
            nonces: NonceRegistry::new(),
            check_order: CheckOrder::default(),
            nonce_scope: NonceScope::default(),
            verifier,
            events: Vec::new(),
        }
    }

    pub fn with_check_order(mut self, check_order: CheckOrder) -> Self {
        self.check_order = check_order;
        self
    }

    pub fn with_nonce_scope(mut self, nonce_scope: NonceScope) -> Self {
        self.nonce_scope = nonce_scope;
        self
    }

    pub fn domain_id(&self) -> U256 {
        self.domain_id
    }

    pub fn authority(&self) -> H160 {
        self.authority.authority()
    }

    pub fn authority_config(&self) -> &AuthorityConfig {
        &self.authority
    }

    pub fn check_order(&self) -> CheckOrder {
        self.check_order
    }

    pub fn nonce_scope(&self) -> NonceScope {
        self.nonce_scope
    }

    pub fn ledger(&self) -> &ClaimLedger {
        &self.ledger
    }

    pub fn current_amount(&self, key: &ClaimKey) -> U256 {
        self.ledger.current_amount(key)
    }

    /// Nonce the next authorization for `account` (and `resource`, under
    /// per-resource scope) must carry
    pub fn next_nonce(&self, account: H160, resource: Option<H160>) -> Result<U256> {
        self.nonces
            .next(&NonceKey::new(self.nonce_scope, account, resource))
    }

    /// Message the authority has to sign for `claimant`'s next claim
    pub fn claim_message(
        &self,
        claimant: H160,
        resource: Option<H160>,
        ceiling: U256,
        source: U256,
    ) -> Result<ClaimMessage> {
        Ok(ClaimMessage {
            domain_id: self.domain_id,
            resource,
            ceiling,
            source,
            claimant,
            nonce: self.next_nonce(claimant, resource)?,
        })
    }

    /// Replace the trusted signer; owner only
    pub fn set_authority(&mut self, caller: H160, new_authority: H160) -> Result<()> {
        let event = self.authority.set_authority(caller, new_authority)?;
        self.events.push(event.into());
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: H160, new_owner: H160) -> Result<()> {
        let event = self.authority.transfer_ownership(caller, new_owner)?;
        self.events.push(event.into());
        Ok(())
    }

    /// Forbid a known contract address from ever becoming the signer
    pub fn reserve_address(&mut self, address: H160) {
        self.authority.reserve(address);
    }

    /// Claim `request.amount` on behalf of `caller`.
    pub fn claim<S: PayoutSink + ?Sized>(
        &mut self,
        caller: H160,
        request: &ClaimRequest,
        sink: &mut S,
    ) -> Result<ClaimReceipt> {
        let key = ClaimKey::new(caller, request.resource, request.source);
        let nonce_key = NonceKey::new(self.nonce_scope, caller, request.resource);

        let (_, nonce) = self.validate(caller, &key, &nonce_key, request).map_err(|e| {
            tracing::debug!("Claim by {:?} rejected: {}", caller, e);
            e
        })?;

        let previous_total = self.ledger.current_amount(&key);
        let previous_nonce = self.nonces.current(&nonce_key);

        let total = self
            .ledger
            .record_claim(&key, request.amount, request.ceiling)?;
        self.nonces.advance(&nonce_key)?;

        let payout = Payout {
            token: request.resource.unwrap_or(self.authority.contract),
            to: caller,
            amount: request.amount,
        };

        if let Err(e) = sink.payout(&payout) {
            self.ledger.restore(&key, previous_total);
            self.nonces.restore(&nonce_key, previous_nonce);
            tracing::warn!("Payout to {:?} failed, claim rolled back: {}", caller, e);
            return Err(match e {
                ClaimGateError::PayoutFailed(reason) => ClaimGateError::PayoutFailed(reason),
                other => ClaimGateError::PayoutFailed(other.to_string()),
            });
        }

        let slot = key.slot();
        self.events.push(ClaimEvent::Claimed {
            claimant: caller,
            slot,
            amount: request.amount,
            total,
        });

        tracing::info!(
            "Claimed {} for {:?} (slot {:?}, total {}, nonce {})",
            request.amount,
            caller,
            slot,
            total,
            nonce
        );

        Ok(ClaimReceipt {
            claimant: caller,
            key,
            slot,
            amount: request.amount,
            total,
            nonce,
            timestamp: Utc::now(),
        })
    }

    /// Every check a claim must pass, without touching state.
    /// Returns the new ledger total and the nonce that was consumed.
    fn validate(
        &self,
        caller: H160,
        key: &ClaimKey,
        nonce_key: &NonceKey,
        request: &ClaimRequest,
    ) -> Result<(U256, U256)> {
        if request.amount.is_zero() {
            return Err(ClaimGateError::InvalidAmount);
        }

        let nonce = self.nonces.next(nonce_key)?;
        let message = ClaimMessage {
            domain_id: self.domain_id,
            resource: request.resource,
            ceiling: request.ceiling,
            source: request.source,
            claimant: caller,
            nonce,
        };

        let total = match self.check_order {
            CheckOrder::AmountFirst => {
                let total = self
                    .ledger
                    .check_claim(key, request.amount, request.ceiling)?;
                self.verify(&message, &request.signature)?;
                total
            }
            CheckOrder::SignatureFirst => {
                self.verify(&message, &request.signature)?;
                self.ledger
                    .check_claim(key, request.amount, request.ceiling)?
            }
        };

        Ok((total, nonce))
    }

    fn verify(&self, message: &ClaimMessage, signature: &Signature) -> Result<()> {
        if self
            .verifier
            .is_authorized(message.hash(), signature, self.authority.authority())
        {
            Ok(())
        } else {
            Err(ClaimGateError::InvalidSignature)
        }
    }

    pub fn events(&self) -> &[ClaimEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ClaimEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            domain_id: self.domain_id,
            authority: self.authority.clone(),
            ledger: self.ledger.clone(),
            nonces: self.nonces.clone(),
            check_order: self.check_order,
            nonce_scope: self.nonce_scope,
        }
    }
}

impl<V: SignatureVerifier> std::fmt::Debug for ClaimEngine<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimEngine")
            .field("domain_id", &self.domain_id)
            .field("authority", &self.authority.authority())
            .field("claims", &self.ledger.len())
            .field("check_order", &self.check_order)
            .field("nonce_scope", &self.nonce_scope)
            .finish()
    }
}
