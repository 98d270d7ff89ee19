use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::authority::AuthorityConfig;
use crate::engine::CheckOrder;
use crate::ledger::{ClaimLedger, NonceRegistry, NonceScope};
use crate::{ClaimGateError, Result};

/// Persisted engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub domain_id: U256,
    pub authority: AuthorityConfig,
    pub ledger: ClaimLedger,
    pub nonces: NonceRegistry,
    pub check_order: CheckOrder,
    pub nonce_scope: NonceScope,
}

/// Single-file bincode snapshot store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or `None` if nothing was saved yet
    pub fn load(&self) -> Result<Option<EngineSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)
            .map_err(|e| ClaimGateError::Storage(format!("Failed to read snapshot: {}", e)))?;

        let snapshot = bincode::deserialize(&bytes)
            .map_err(|e| ClaimGateError::Storage(format!("Failed to decode snapshot: {}", e)))?;

        tracing::info!("Loaded snapshot from {}", self.path.display());
        Ok(Some(snapshot))
    }

    /// Write the snapshot next to its final location, then rename it into
    /// place. Readers never observe a partially written file.
    pub fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let bytes = bincode::serialize(snapshot)
            .map_err(|e| ClaimGateError::Storage(format!("Failed to encode snapshot: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ClaimGateError::Storage(format!("Failed to create snapshot directory: {}", e))
                })?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)
            .map_err(|e| ClaimGateError::Storage(format!("Failed to write snapshot: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| ClaimGateError::Storage(format!("Failed to move snapshot into place: {}", e)))?;

        tracing::info!("Saved snapshot to {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ClaimKey, NonceKey};
    use primitive_types::H160;
    use tempfile::tempdir;

    fn snapshot() -> EngineSnapshot {
        let mut ledger = ClaimLedger::new();
        let key = ClaimKey::new(H160::from_low_u64_be(1), None, U256::from(3));
        ledger.record_claim(&key, U256::from(2), U256::from(5)).unwrap();

        let mut nonces = NonceRegistry::new();
        nonces
            .advance(&NonceKey::new(NonceScope::PerClaimant, H160::from_low_u64_be(1), None))
            .unwrap();

        EngineSnapshot {
            domain_id: U256::from(31337),
            authority: AuthorityConfig::new(
                H160::from_low_u64_be(1),
                H160::from_low_u64_be(1000),
                H160::from_low_u64_be(50),
            )
            .unwrap(),
            ledger,
            nonces,
            check_order: CheckOrder::SignatureFirst,
            nonce_scope: NonceScope::PerClaimant,
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("engine.snapshot"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state").join("engine.snapshot"));

        store.save(&snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot()));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.snapshot");
        fs::write(&path, b"\x01\x02").unwrap();

        let result = SnapshotStore::new(&path).load();
        assert!(matches!(result, Err(ClaimGateError::Storage(_))));
    }
}
