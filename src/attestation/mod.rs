//! Device attestation capability and key-record lifecycle.
//!
//! The engine depends only on the [`AttestationProvider`] trait. Variants:
//! the platform-backed provider, [`UnsupportedAttestation`] for environments
//! with no attestation service, and test doubles.

pub mod app_attest;
pub mod record;
pub mod unsupported;

use async_trait::async_trait;
use thiserror::Error;

pub use app_attest::{AppAttestProvider, AttestationBackend};
pub use record::{AttestationKeyRecord, AttestationRecordStore};
pub use unsupported::UnsupportedAttestation;

/// Failure classification for attestation operations.
///
/// `NotAttested` and `InvalidKey` are the two signals the engine recovers
/// from; everything else propagates.
#[derive(Debug, Clone, Error)]
pub enum AttestationError {
    /// The key exists but has not completed server-side registration.
    #[error("attestation key is not attested yet")]
    NotAttested,

    /// The platform reports the key as unusable; it must be deleted and
    /// regenerated.
    #[error("attestation key was invalidated by the platform")]
    InvalidKey,

    /// Attestation is not supported in this environment at all.
    #[error("attestation is unavailable on this platform")]
    Unavailable,

    #[error("attestation failure: {0}")]
    Failed(String),
}

/// Capability for device attestation.
#[async_trait]
pub trait AttestationProvider: Send + Sync {
    /// Return the stored attestation key id, generating one if absent.
    ///
    /// Never marks the key as attested.
    async fn ensure_key_id(&self) -> Result<String, AttestationError>;

    /// Produce the one-time attestation object for `key_id`. Called at most
    /// once per key id over its lifetime.
    async fn attest(
        &self,
        key_id: &str,
        client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError>;

    /// Record locally that `key_id` completed server-side registration.
    async fn mark_attested(&self, key_id: &str) -> Result<(), AttestationError>;

    /// Produce a fresh assertion bound to `client_data_hash`.
    async fn generate_assertion(
        &self,
        key_id: &str,
        client_data_hash: &[u8],
    ) -> Result<Vec<u8>, AttestationError>;

    /// Delete the stored key id and its record.
    async fn clear(&self) -> Result<(), AttestationError>;
}
