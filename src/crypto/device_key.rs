//! Long-lived device keypair management.
//!
//! The device holds exactly one P-256 keypair per bundle identity. The
//! private half never leaves its owner; everything downstream works with an
//! opaque signing handle, the public JWK, and its thumbprint.

use std::sync::Arc;

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::rand_core::OsRng;
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::base64url;
use crate::crypto::jwk::EcPublicJwk;
use crate::storage::{SecureStorage, StorageError};

/// Signing capability of the device keypair.
///
/// Callers get DER-encoded ECDSA signatures and nothing else. Hardware-backed
/// implementations delegate concurrency safety to the platform primitive; the
/// wrapper must not share mutable state around the handle.
pub trait DeviceKey: Send + Sync {
    /// Sign `data` with the device private key, returning a DER signature.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, DeviceKeyError>;
}

#[derive(Debug, Error)]
pub enum DeviceKeyError {
    /// The platform refused hardware-backed key storage.
    #[error("hardware-backed key storage is unavailable")]
    SecureEnclaveUnavailable,

    #[error("invalid key bytes")]
    InvalidKeyBytes,

    #[error("device key signing failed: {0}")]
    Signing(String),

    #[error("key storage error: {0}")]
    Storage(StorageError),
}

/// Software P-256 device key held in the secret store.
pub struct SoftwareDeviceKey {
    signing_key: SigningKey,
}

impl SoftwareDeviceKey {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn import(bytes: &[u8]) -> Result<Self, DeviceKeyError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| DeviceKeyError::InvalidKeyBytes)?;
        Ok(Self { signing_key })
    }

    /// Export the private scalar for secret storage.
    pub fn export(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Uncompressed SEC1 public key: `0x04 || x || y` (65 bytes for P-256).
    pub fn public_key_sec1(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }
}

impl DeviceKey for SoftwareDeviceKey {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, DeviceKeyError> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

/// Device key material exposed to the engine: the signing handle, the public
/// JWK, and its RFC 7638 thumbprint. The JWK is immutable once derived.
#[derive(Clone)]
pub struct DeviceKeyMaterial {
    key: Arc<dyn DeviceKey>,
    jwk: EcPublicJwk,
    thumbprint: String,
}

impl DeviceKeyMaterial {
    /// Derive material from a signing handle and its 65-byte uncompressed
    /// SEC1 public key.
    pub fn from_sec1(key: Arc<dyn DeviceKey>, sec1: &[u8]) -> Result<Self, DeviceKeyError> {
        if sec1.len() != 65 || sec1[0] != 0x04 {
            return Err(DeviceKeyError::InvalidKeyBytes);
        }
        let jwk = EcPublicJwk::new(
            base64url::encode(&sec1[1..33]),
            base64url::encode(&sec1[33..65]),
        );
        let thumbprint = jwk.thumbprint();
        Ok(Self {
            key,
            jwk,
            thumbprint,
        })
    }

    pub fn key(&self) -> &Arc<dyn DeviceKey> {
        &self.key
    }

    pub fn jwk(&self) -> &EcPublicJwk {
        &self.jwk
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

impl std::fmt::Debug for DeviceKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyMaterial")
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

/// Loads or creates the per-bundle device keypair in the secret store.
pub struct DeviceKeyStore {
    storage: Arc<dyn SecureStorage>,
    tag: String,
}

impl DeviceKeyStore {
    pub fn new(storage: Arc<dyn SecureStorage>, bundle_identifier: &str) -> Self {
        Self {
            storage,
            tag: format!("{bundle_identifier}.device-key"),
        }
    }

    /// Locate the keypair tagged for this bundle, creating one on first use.
    ///
    /// Idempotent: repeated calls return the same material.
    pub fn load_or_create(&self) -> Result<DeviceKeyMaterial, DeviceKeyError> {
        match self.storage.retrieve(&self.tag) {
            Ok(bytes) => {
                debug!(tag = %self.tag, "loading existing device key");
                let key = SoftwareDeviceKey::import(&bytes)?;
                let sec1 = key.public_key_sec1();
                DeviceKeyMaterial::from_sec1(Arc::new(key), &sec1)
            }
            Err(StorageError::NotFound(_)) => {
                info!(tag = %self.tag, "generating new device key");
                let key = SoftwareDeviceKey::generate();
                self.storage
                    .store(&self.tag, &key.export())
                    .map_err(storage_error)?;
                let sec1 = key.public_key_sec1();
                DeviceKeyMaterial::from_sec1(Arc::new(key), &sec1)
            }
            Err(e) => Err(storage_error(e)),
        }
    }
}

fn storage_error(e: StorageError) -> DeviceKeyError {
    match e {
        StorageError::AccessDenied => DeviceKeyError::SecureEnclaveUnavailable,
        other => DeviceKeyError::Storage(other),
    }
}
