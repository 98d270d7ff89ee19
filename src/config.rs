use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::authority::AuthorityConfig;
use crate::engine::{CheckOrder, ClaimEngine};
use crate::ledger::NonceScope;
use crate::storage::{EngineSnapshot, SnapshotStore};
use crate::{ClaimGateError, Result, DEFAULT_DOMAIN_ID};

/// Deployment configuration, usually read from a JSON file and then
/// overridden from the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimGateConfig {
    /// Chain / deployment id mixed into every signed message
    pub domain_id: u64,

    /// Address of this deployment
    pub contract: H160,

    pub owner: H160,

    /// Trusted signer
    pub authority: H160,

    pub check_order: CheckOrder,

    pub nonce_scope: NonceScope,

    /// Where engine state is persisted between runs
    pub snapshot_path: Option<PathBuf>,
}

impl Default for ClaimGateConfig {
    fn default() -> Self {
        Self {
            domain_id: DEFAULT_DOMAIN_ID,
            contract: H160::zero(),
            owner: H160::zero(),
            authority: H160::zero(),
            check_order: CheckOrder::AmountFirst,
            nonce_scope: NonceScope::PerClaimant,
            snapshot_path: None,
        }
    }
}

impl ClaimGateConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClaimGateError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ClaimGateError::Config(format!("Invalid configuration: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ClaimGateError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.is_zero() {
            return Err(ClaimGateError::Config("Owner must be set".to_string()));
        }
        if self.authority.is_zero() {
            return Err(ClaimGateError::Config("Authority must be set".to_string()));
        }
        if self.authority == self.contract {
            return Err(ClaimGateError::Config(
                "Authority cannot be the contract itself".to_string(),
            ));
        }
        Ok(())
    }

    pub fn domain(&self) -> U256 {
        U256::from(self.domain_id)
    }

    pub fn authority_config(&self) -> Result<AuthorityConfig> {
        self.validate()?;
        AuthorityConfig::new(self.owner, self.contract, self.authority)
    }

    pub fn snapshot_store(&self) -> Option<SnapshotStore> {
        self.snapshot_path.as_ref().map(SnapshotStore::new)
    }

    /// Fresh engine for this deployment
    pub fn build_engine(&self) -> Result<ClaimEngine> {
        Ok(ClaimEngine::new(self.domain(), self.authority_config()?)
            .with_check_order(self.check_order)
            .with_nonce_scope(self.nonce_scope))
    }

    /// Engine restored from the configured snapshot when one exists.
    /// A snapshot that belongs to another domain is refused. Any other
    /// setting that differs from the snapshot is logged; the snapshot wins.
    pub fn load_engine(&self) -> Result<ClaimEngine> {
        let snapshot = match self.snapshot_store() {
            Some(store) => store.load()?,
            None => None,
        };

        match snapshot {
            Some(snapshot) if snapshot.domain_id != self.domain() => Err(ClaimGateError::Config(format!(
                "Snapshot belongs to domain {}, configured domain is {}",
                snapshot.domain_id, self.domain_id
            ))),
            Some(snapshot) => {
                self.warn_on_drift(&snapshot);
                Ok(ClaimEngine::from_snapshot(snapshot))
            }
            None => self.build_engine(),
        }
    }

    fn warn_on_drift(&self, snapshot: &EngineSnapshot) {
        if snapshot.authority.owner != self.owner {
            tracing::warn!(
                "Snapshot owner {:?} differs from configured owner {:?}, keeping snapshot",
                snapshot.authority.owner,
                self.owner
            );
        }
        if snapshot.authority.authority() != self.authority {
            tracing::warn!(
                "Snapshot authority {:?} differs from configured authority {:?}, keeping snapshot",
                snapshot.authority.authority(),
                self.authority
            );
        }
        if snapshot.check_order != self.check_order {
            tracing::warn!(
                "Snapshot check order {:?} differs from configured {:?}, keeping snapshot",
                snapshot.check_order,
                self.check_order
            );
        }
        if snapshot.nonce_scope != self.nonce_scope {
            tracing::warn!(
                "Snapshot nonce scope {:?} differs from configured {:?}, keeping snapshot",
                snapshot.nonce_scope,
                self.nonce_scope
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> ClaimGateConfig {
        ClaimGateConfig {
            contract: H160::from_low_u64_be(1000),
            owner: H160::from_low_u64_be(1),
            authority: H160::from_low_u64_be(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ClaimGateConfig::default();
        assert_eq!(config.domain_id, 31337);
        assert_eq!(config.check_order, CheckOrder::AmountFirst);
        assert_eq!(config.nonce_scope, NonceScope::PerClaimant);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let raw = r#"{
            "owner": "0x0000000000000000000000000000000000000001",
            "authority": "0x0000000000000000000000000000000000000032",
            "check_order": "signature_first"
        }"#;
        let config = ClaimGateConfig::from_json(raw).unwrap();

        assert_eq!(config.owner, H160::from_low_u64_be(1));
        assert_eq!(config.authority, H160::from_low_u64_be(50));
        assert_eq!(config.check_order, CheckOrder::SignatureFirst);
        assert_eq!(config.domain_id, 31337);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("claimgate.json");
        std::fs::write(&path, config().to_json().unwrap()).unwrap();

        assert_eq!(ClaimGateConfig::from_file(&path).unwrap(), config());
        assert!(ClaimGateConfig::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_authority_cannot_be_contract() {
        let mut config = config();
        config.authority = config.contract;
        assert!(matches!(config.validate(), Err(ClaimGateError::Config(_))));
    }

    #[test]
    fn test_build_engine_applies_policies() {
        let mut config = config();
        config.nonce_scope = NonceScope::PerResource;
        let engine = config.build_engine().unwrap();

        assert_eq!(engine.authority(), H160::from_low_u64_be(50));
        assert_eq!(engine.nonce_scope(), NonceScope::PerResource);
        assert_eq!(engine.domain_id(), U256::from(31337));
    }

    #[test]
    fn test_load_engine_refuses_foreign_snapshot() {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.snapshot_path = Some(dir.path().join("engine.snapshot"));

        // nothing saved yet: fresh engine
        let engine = config.load_engine().unwrap();
        config.snapshot_store().unwrap().save(&engine.snapshot()).unwrap();
        assert!(config.load_engine().is_ok());

        config.domain_id = 1;
        assert!(config.load_engine().is_err());
    }

    #[test]
    fn test_snapshot_settings_win_over_config() {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.snapshot_path = Some(dir.path().join("engine.snapshot"));

        let engine = config.build_engine().unwrap();
        config.snapshot_store().unwrap().save(&engine.snapshot()).unwrap();

        config.owner = H160::from_low_u64_be(2);
        config.authority = H160::from_low_u64_be(51);
        config.check_order = CheckOrder::SignatureFirst;
        config.nonce_scope = NonceScope::PerResource;

        let loaded = config.load_engine().unwrap();
        assert_eq!(loaded.authority_config().owner, H160::from_low_u64_be(1));
        assert_eq!(loaded.authority(), H160::from_low_u64_be(50));
        assert_eq!(loaded.check_order(), CheckOrder::AmountFirst);
        assert_eq!(loaded.nonce_scope(), NonceScope::PerClaimant);
    }
}
