//! Attestation stub for platforms without an attestation service.

use async_trait::async_trait;

use crate::attestation::{AttestationError, AttestationProvider};

/// Provider variant for environments where the platform offers no attestation
/// service at all. Every operation reports `Unavailable`.
pub struct UnsupportedAttestation;

#[async_trait]
impl AttestationProvider for UnsupportedAttestation {
    async fn ensure_key_id(&self) -> Result<String, AttestationError> {
        Err(AttestationError::Unavailable)
    }

    async fn attest(
        &self,
        _key_id: &str,
        _client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError> {
        Err(AttestationError::Unavailable)
    }

    async fn mark_attested(&self, _key_id: &str) -> Result<(), AttestationError> {
        Err(AttestationError::Unavailable)
    }

    async fn generate_assertion(
        &self,
        _key_id: &str,
        _client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError> {
        Err(AttestationError::Unavailable)
    }

    async fn clear(&self) -> Result<(), AttestationError> {
        Err(AttestationError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_operation_is_unavailable() {
        let provider = UnsupportedAttestation;

        assert!(matches!(
            provider.ensure_key_id().await,
            Err(AttestationError::Unavailable)
        ));
        assert!(matches!(
            provider.attest("k", b"h").await,
            Err(AttestationError::Unavailable)
        ));
        assert!(matches!(
            provider.mark_attested("k").await,
            Err(AttestationError::Unavailable)
        ));
        assert!(matches!(
            provider.generate_assertion("k", b"h").await,
            Err(AttestationError::Unavailable)
        ));
        assert!(matches!(
            provider.clear().await,
            Err(AttestationError::Unavailable)
        ));
    }
}
