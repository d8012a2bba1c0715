// SealedPrefs — In-Memory Key Provisioner
//
// Keeps keys in process memory only. Used by tests and for throwaway stores
// whose contents must not survive the process.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::crypto::SecretKey;

use super::{KeyProvisioner, KeyStoreError};

#[derive(Default)]
pub struct MemoryProvisioner {
    keys: Mutex<HashMap<String, SecretKey>>,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provisioner pre-loaded with a known key.
    pub fn with_key(alias: &str, key: SecretKey) -> Self {
        let provisioner = Self::new();
        provisioner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alias.to_string(), key);
        provisioner
    }
}

impl KeyProvisioner for MemoryProvisioner {
    fn get_or_create_key(&self, alias: &str) -> Result<SecretKey, KeyStoreError> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let key = keys
            .entry(alias.to_string())
            .or_insert_with(SecretKey::generate);
        Ok(key.clone())
    }

    fn delete_key(&self, alias: &str) -> Result<(), KeyStoreError> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(alias);
        Ok(())
    }

    fn has_key(&self, alias: &str) -> Result<bool, KeyStoreError> {
        Ok(self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(alias))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
