//! Secret storage for device credentials.
//!
//! Backends hold the device keypair bytes and the attestation key record,
//! keyed by tags derived from the bundle identifier.

pub mod file_store;
pub mod keyring_store;
pub mod memory;

use thiserror::Error;

/// Capability for storing device-bound secrets.
pub trait SecureStorage: Send + Sync {
    /// Store a secret.
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Retrieve a secret.
    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete a secret.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("access denied")]
    AccessDenied,

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

pub use file_store::FileStorage;
pub use keyring_store::KeyringStorage;
pub use memory::MemoryStorage;
