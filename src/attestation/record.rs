//! Persisted attestation key record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attestation::AttestationError;
use crate::storage::{SecureStorage, StorageError};

/// Attestation key identity and registration state.
///
/// Lifecycle: absent → generated (`attested = false`) → attested.
/// Invalidation deletes the record, returning the state to absent. An
/// attested record is never re-attested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationKeyRecord {
    pub key_id: String,
    pub attested: bool,
}

/// Secret-store persistence for the attestation key record, keyed by bundle
/// identity.
pub struct AttestationRecordStore {
    storage: Arc<dyn SecureStorage>,
    tag: String,
}

impl AttestationRecordStore {
    pub fn new(storage: Arc<dyn SecureStorage>, bundle_identifier: &str) -> Self {
        Self {
            storage,
            tag: format!("{bundle_identifier}.attestation-key"),
        }
    }

    pub fn load(&self) -> Result<Option<AttestationKeyRecord>, AttestationError> {
        match self.storage.retrieve(&self.tag) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                AttestationError::Failed(format!("corrupt attestation record: {e}"))
            }),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(AttestationError::Failed(format!(
                "attestation record storage: {e}"
            ))),
        }
    }

    pub fn save(&self, record: &AttestationKeyRecord) -> Result<(), AttestationError> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| AttestationError::Failed(format!("record encoding: {e}")))?;
        self.storage
            .store(&self.tag, &bytes)
            .map_err(|e| AttestationError::Failed(format!("attestation record storage: {e}")))
    }

    /// Delete the record. Deleting an absent record is a no-op.
    pub fn clear(&self) -> Result<(), AttestationError> {
        match self.storage.delete(&self.tag) {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(AttestationError::Failed(format!(
                "attestation record storage: {e}"
            ))),
        }
    }
}
