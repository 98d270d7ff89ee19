use primitive_types::{H160, U256};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::{ClaimEngine, ClaimEvent, ClaimReceipt, ClaimRequest, PayoutSink};
use crate::ledger::ClaimKey;
use crate::storage::{EngineSnapshot, SnapshotStore};
use crate::Result;

struct ServiceState<S> {
    engine: ClaimEngine,
    sink: S,
}

/// Shared handle to one claim engine and its payout sink.
///
/// Every mutation holds the write lock from validation through payout, so
/// claims execute one at a time in a single total order. Clones share the
/// same state.
pub struct ClaimService<S> {
    state: Arc<RwLock<ServiceState<S>>>,
}

impl<S> Clone for ClaimService<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: PayoutSink + Send + Sync> ClaimService<S> {
    pub fn new(engine: ClaimEngine, sink: S) -> Self {
        Self {
            state: Arc::new(RwLock::new(ServiceState { engine, sink })),
        }
    }

    pub async fn claim(&self, caller: H160, request: ClaimRequest) -> Result<ClaimReceipt> {
        let mut state = self.state.write().await;
        let ServiceState { engine, sink } = &mut *state;
        engine.claim(caller, &request, sink)
    }

    pub async fn set_authority(&self, caller: H160, new_authority: H160) -> Result<()> {
        self.state
            .write()
            .await
            .engine
            .set_authority(caller, new_authority)
    }

    pub async fn authority(&self) -> H160 {
        self.state.read().await.engine.authority()
    }

    pub async fn current_amount(&self, key: ClaimKey) -> U256 {
        self.state.read().await.engine.current_amount(&key)
    }

    pub async fn next_nonce(&self, account: H160, resource: Option<H160>) -> Result<U256> {
        self.state.read().await.engine.next_nonce(account, resource)
    }

    pub async fn drain_events(&self) -> Vec<ClaimEvent> {
        self.state.write().await.engine.drain_events()
    }

    /// Read access to the payout sink, e.g. to report balances
    pub async fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.read().await.sink)
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.state.read().await.engine.snapshot()
    }

    /// Persist the engine while holding the read lock, so the snapshot
    /// reflects a point between two claims
    pub async fn save(&self, store: &SnapshotStore) -> Result<()> {
        let state = self.state.read().await;
        store.save(&state.engine.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::AuthorityConfig;
    use crate::crypto::AuthorityKey;
    use crate::token::AssetRegistry;
    use crate::ClaimGateError;

    fn setup() -> (AuthorityKey, ClaimService<AssetRegistry>, H160) {
        let signer = AuthorityKey::from_bytes(&[7u8; 32]).unwrap();
        let authority = AuthorityConfig::new(
            H160::from_low_u64_be(1),
            H160::from_low_u64_be(1000),
            signer.address(),
        )
        .unwrap();
        let engine = ClaimEngine::new(U256::from(31337), authority);

        let mut assets = AssetRegistry::new();
        let gold = assets.deploy_fungible("Gold".to_string(), "GLD".to_string(), 18, None);

        (signer, ClaimService::new(engine, assets), gold)
    }

    async fn request(
        service: &ClaimService<AssetRegistry>,
        signer: &AuthorityKey,
        claimant: H160,
        gold: H160,
        amount: u64,
        ceiling: u64,
    ) -> ClaimRequest {
        let nonce = service.next_nonce(claimant, Some(gold)).await.unwrap();
        let message = crate::encoding::ClaimMessage {
            domain_id: U256::from(31337),
            resource: Some(gold),
            ceiling: U256::from(ceiling),
            source: U256::zero(),
            claimant,
            nonce,
        };
        ClaimRequest {
            resource: Some(gold),
            amount: U256::from(amount),
            ceiling: U256::from(ceiling),
            source: U256::zero(),
            signature: signer.sign_hash(message.hash()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_claim_through_service() {
        let (signer, service, gold) = setup();
        let alice = H160::from_low_u64_be(0xa11ce);

        let req = request(&service, &signer, alice, gold, 3, 4).await;
        let receipt = service.claim(alice, req).await.unwrap();

        assert_eq!(receipt.total, U256::from(3));
        assert_eq!(
            service.current_amount(receipt.key).await,
            U256::from(3)
        );
        let balance = service
            .with_sink(|assets| assets.balance_of(gold, alice))
            .await
            .unwrap();
        assert_eq!(balance, U256::from(3));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_claims_accept_one() {
        let (signer, service, gold) = setup();
        let alice = H160::from_low_u64_be(0xa11ce);
        let req = request(&service, &signer, alice, gold, 4, 4).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let req = req.clone();
            handles.push(tokio::spawn(async move { service.claim(alice, req).await }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        let balance = service
            .with_sink(|assets| assets.balance_of(gold, alice))
            .await
            .unwrap();
        assert_eq!(balance, U256::from(4));
    }

    #[tokio::test]
    async fn test_set_authority_applies_to_next_claim() {
        let (signer, service, gold) = setup();
        let next = AuthorityKey::from_bytes(&[8u8; 32]).unwrap();
        let alice = H160::from_low_u64_be(0xa11ce);

        let req = request(&service, &signer, alice, gold, 1, 4).await;
        service
            .set_authority(H160::from_low_u64_be(1), next.address())
            .await
            .unwrap();

        assert_eq!(service.authority().await, next.address());
        assert_eq!(
            service.claim(alice, req).await,
            Err(ClaimGateError::InvalidSignature)
        );
        assert_eq!(service.drain_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_snapshot() {
        let (signer, service, gold) = setup();
        let alice = H160::from_low_u64_be(0xa11ce);
        let req = request(&service, &signer, alice, gold, 2, 4).await;
        service.claim(alice, req).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("engine.snapshot"));
        service.save(&store).await.unwrap();

        let restored = ClaimEngine::from_snapshot(store.load().unwrap().unwrap());
        assert_eq!(restored.snapshot(), service.snapshot().await);
    }
}
