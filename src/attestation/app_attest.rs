//! Platform-backed attestation provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::attestation::{
    AttestationError, AttestationKeyRecord, AttestationProvider, AttestationRecordStore,
};
use crate::storage::SecureStorage;

/// Raw platform attestation primitives.
///
/// This is the seam to the platform SDK: key generation, the one-time
/// attestation object, and per-use assertions. Implementations are assumed
/// non-reentrant; callers serialize access.
#[async_trait]
pub trait AttestationBackend: Send + Sync {
    /// Generate a new attestation key, returning its platform key id.
    async fn generate_key(&self) -> Result<String, AttestationError>;

    /// Produce the one-time attestation object binding `key_id` to the hash.
    async fn attest_key(
        &self,
        key_id: &str,
        client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError>;

    /// Produce a fresh assertion binding `key_id` to the hash.
    async fn generate_assertion(
        &self,
        key_id: &str,
        client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError>;
}

/// Attestation provider combining a platform backend with the persisted key
/// record.
///
/// The record tracks whether the key completed server-side registration;
/// assertion requests for an unregistered key surface `NotAttested` so the
/// engine can run the registration flow first.
pub struct AppAttestProvider {
    backend: Arc<dyn AttestationBackend>,
    records: AttestationRecordStore,
}

impl AppAttestProvider {
    pub fn new(
        backend: Arc<dyn AttestationBackend>,
        storage: Arc<dyn SecureStorage>,
        bundle_identifier: &str,
    ) -> Self {
        Self {
            backend,
            records: AttestationRecordStore::new(storage, bundle_identifier),
        }
    }
}

#[async_trait]
impl AttestationProvider for AppAttestProvider {
    async fn ensure_key_id(&self) -> Result<String, AttestationError> {
        if let Some(record) = self.records.load()? {
            return Ok(record.key_id);
        }
        let key_id = self.backend.generate_key().await?;
        self.records.save(&AttestationKeyRecord {
            key_id: key_id.clone(),
            attested: false,
        })?;
        info!("generated new attestation key");
        Ok(key_id)
    }

    async fn attest(
        &self,
        key_id: &str,
        client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError> {
        debug!("producing one-time attestation object");
        self.backend.attest_key(key_id, client_data_hash).await
    }

    async fn mark_attested(&self, key_id: &str) -> Result<(), AttestationError> {
        self.records.save(&AttestationKeyRecord {
            key_id: key_id.to_string(),
            attested: true,
        })
    }

    async fn generate_assertion(
        &self,
        key_id: &str,
        client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError> {
        match self.records.load()? {
            Some(record) if record.key_id == key_id && record.attested => {
                self.backend.generate_assertion(key_id, client_data_hash).await
            }
            _ => Err(AttestationError::NotAttested),
        }
    }

    async fn clear(&self) -> Result<(), AttestationError> {
        debug!("clearing attestation key record");
        self.records.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        keys: AtomicU32,
        attests: AtomicU32,
        assertions: AtomicU32,
    }

    #[async_trait]
    impl AttestationBackend for CountingBackend {
        async fn generate_key(&self) -> Result<String, AttestationError> {
            let n = self.keys.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("key-{n}"))
        }

        async fn attest_key(
            &self,
            key_id: &str,
            _client_data_hash: &[u8],
        ) -> Result<Vec<u8>, AttestationError> {
            self.attests.fetch_add(1, Ordering::SeqCst);
            Ok(format!("attestation-{key_id}").into_bytes())
        }

        async fn generate_assertion(
            &self,
            key_id: &str,
            _client_data_hash: &[u8],
        ) -> Result<Vec<u8>, AttestationError> {
            self.assertions.fetch_add(1, Ordering::SeqCst);
            Ok(format!("assertion-{key_id}").into_bytes())
        }
    }

    fn provider() -> (AppAttestProvider, Arc<CountingBackend>) {
        let backend = Arc::new(CountingBackend::default());
        let provider = AppAttestProvider::new(
            backend.clone(),
            Arc::new(MemoryStorage::new()),
            "com.example.app",
        );
        (provider, backend)
    }

    #[tokio::test]
    async fn test_ensure_key_id_generates_once() {
        let (provider, backend) = provider();

        let first = provider.ensure_key_id().await.unwrap();
        let second = provider.ensure_key_id().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.keys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_key_is_not_attested() {
        let (provider, backend) = provider();
        let key_id = provider.ensure_key_id().await.unwrap();

        let result = provider.generate_assertion(&key_id, b"hash").await;
        assert!(matches!(result, Err(AttestationError::NotAttested)));
        assert_eq!(backend.assertions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_assertion_after_mark_attested() {
        let (provider, backend) = provider();
        let key_id = provider.ensure_key_id().await.unwrap();

        provider.mark_attested(&key_id).await.unwrap();

        let assertion = provider.generate_assertion(&key_id, b"hash").await.unwrap();
        assert_eq!(assertion, b"assertion-key-1");
        assert_eq!(backend.assertions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_regenerates_key_id() {
        let (provider, backend) = provider();
        let first = provider.ensure_key_id().await.unwrap();
        provider.mark_attested(&first).await.unwrap();

        provider.clear().await.unwrap();

        let second = provider.ensure_key_id().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(backend.keys.load(Ordering::SeqCst), 2);

        // The regenerated key starts unattested.
        let result = provider.generate_assertion(&second, b"hash").await;
        assert!(matches!(result, Err(AttestationError::NotAttested)));
    }

    #[tokio::test]
    async fn test_assertion_for_stale_key_id_is_not_attested() {
        let (provider, _backend) = provider();
        let key_id = provider.ensure_key_id().await.unwrap();
        provider.mark_attested(&key_id).await.unwrap();

        let result = provider.generate_assertion("some-other-key", b"hash").await;
        assert!(matches!(result, Err(AttestationError::NotAttested)));
    }
}
