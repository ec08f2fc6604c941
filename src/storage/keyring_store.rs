//! OS keychain storage for hosts with a platform secret service.

use keyring::Entry;
use tracing::warn;

use crate::codec::base64url;
use crate::storage::{SecureStorage, StorageError};

const DEFAULT_SERVICE: &str = "attest-auth";

/// Version tag prefixed to every stored value; keychains hold strings, and
/// the tag lets a future format change detect (rather than misparse) old
/// entries.
const ENVELOPE_V1: &str = "aa1:";

/// Keychain-backed storage for the device key and the attestation record.
///
/// This is the closest analog to hardware-backed secret storage on desktop
/// platforms: entries live in the user keychain (Keychain on macOS, the
/// secret service on Linux), keyed by the bundle-derived tag. A keychain
/// that refuses access surfaces as `AccessDenied`, which the engine reports
/// as `SecureEnclaveUnavailable`.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE)
    }

    /// Use a custom keychain service name, for hosts running several
    /// independent sessions side by side.
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, key).map_err(|e| map_keyring_error(key, e))
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureStorage for KeyringStorage {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entry(key)?
            .set_password(&encode_envelope(value))
            .map_err(|e| map_keyring_error(key, e))
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let envelope = self
            .entry(key)?
            .get_password()
            .map_err(|e| map_keyring_error(key, e))?;
        decode_envelope(&envelope)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entry(key)?
            .delete_password()
            .map_err(|e| map_keyring_error(key, e))
    }

    fn exists(&self, key: &str) -> bool {
        matches!(
            self.entry(key).map(|entry| entry.get_password()),
            Ok(Ok(_))
        )
    }
}

fn encode_envelope(value: &[u8]) -> String {
    format!("{ENVELOPE_V1}{}", base64url::encode(value))
}

fn decode_envelope(envelope: &str) -> Result<Vec<u8>, StorageError> {
    let Some(encoded) = envelope.strip_prefix(ENVELOPE_V1) else {
        return Err(StorageError::Backend(
            "keychain entry has an unknown envelope version".to_string(),
        ));
    };
    base64url::decode(encoded)
        .map_err(|_| StorageError::Backend("keychain entry payload is corrupt".to_string()))
}

fn map_keyring_error(key: &str, e: keyring::Error) -> StorageError {
    match e {
        keyring::Error::NoEntry => StorageError::NotFound(key.to_string()),
        keyring::Error::NoStorageAccess(detail) => {
            warn!(key, %detail, "keychain refused access");
            StorageError::AccessDenied
        }
        keyring::Error::PlatformFailure(detail) => {
            StorageError::Backend(format!("keychain platform failure: {detail}"))
        }
        other => StorageError::Backend(other.to_string()),
    }
}
