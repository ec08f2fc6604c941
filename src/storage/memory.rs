//! In-memory storage for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::storage::{SecureStorage, StorageError};

/// Process-local storage backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemoryStorage {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries
            .lock()
            .expect("storage lock poisoned")
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.entries
            .lock()
            .expect("storage lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .expect("storage lock poisoned")
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> bool {
        self.entries
            .lock()
            .expect("storage lock poisoned")
            .contains_key(key)
    }
}
