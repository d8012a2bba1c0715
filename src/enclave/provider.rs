// SealedPrefs — Key Provisioner
//
// Maps a store name (alias) to a durable AES-256 key. The production backend
// keeps the raw key in the platform keyring so it never touches the
// preference database.
//
// Flow:
//   1. `get_or_create_key(alias)` fetches from the backend, or generates and
//      stores a new key on first use
//   2. The key is held by the open store for its lifetime and zeroized on drop
//   3. `delete_key(alias)` destroys it; every blob sealed under it is lost

use std::sync::{Mutex, PoisonError};

use crate::crypto::{SecretKey, KEY_LEN};

use super::{KeyStoreCause, KeyStoreError};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Service name used to identify SealedPrefs entries in the platform keyring.
pub const DEFAULT_KEYRING_SERVICE: &str = "sealed-prefs";

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over symmetric key storage, enabling platform-specific backends
/// and in-memory implementations for testing.
pub trait KeyProvisioner: Send + Sync {
    /// Return the key stored under `alias`, generating and persisting a new
    /// one if none exists. An existing key is never overwritten.
    fn get_or_create_key(&self, alias: &str) -> Result<SecretKey, KeyStoreError>;

    /// Remove the key stored under `alias`. Missing aliases are not an error.
    /// WARNING: every value encrypted under this key becomes unrecoverable.
    fn delete_key(&self, alias: &str) -> Result<(), KeyStoreError>;

    /// Check whether a key exists for `alias` without creating one.
    fn has_key(&self, alias: &str) -> Result<bool, KeyStoreError>;
}

impl<P: KeyProvisioner + ?Sized> KeyProvisioner for Box<P> {
    fn get_or_create_key(&self, alias: &str) -> Result<SecretKey, KeyStoreError> {
        (**self).get_or_create_key(alias)
    }

    fn delete_key(&self, alias: &str) -> Result<(), KeyStoreError> {
        (**self).delete_key(alias)
    }

    fn has_key(&self, alias: &str) -> Result<bool, KeyStoreError> {
        (**self).has_key(alias)
    }
}

// ─── Platform Implementation ─────────────────────────────────────────────────

/// Production implementation using the `keyring` crate.
/// Dispatches to:
///   - Linux: D-Bus Secret Service (GNOME Keyring / KDE Wallet)
///   - macOS: Security.framework Keychain
///   - Windows: Windows Credential Manager
///
/// The keyring has no compare-and-set, so creation is serialized through a
/// process-local lock: within one process exactly one key is ever minted per
/// alias.
pub struct KeyringProvisioner {
    service: String,
    create_lock: Mutex<()>,
}

impl KeyringProvisioner {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_KEYRING_SERVICE)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            create_lock: Mutex::new(()),
        }
    }

    fn entry(&self, alias: &str) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, alias).map_err(|e| {
            KeyStoreError::new(
                alias,
                KeyStoreCause::Keyring(format!("failed to create keyring entry: {}", e)),
            )
        })
    }

    fn decode_key(alias: &str, raw: &[u8]) -> Result<SecretKey, KeyStoreError> {
        SecretKey::from_bytes(raw).map_err(|_| {
            KeyStoreError::new(
                alias,
                KeyStoreCause::InvalidKey(format!(
                    "expected {} bytes, found {}",
                    KEY_LEN,
                    raw.len()
                )),
            )
        })
    }
}

impl Default for KeyringProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvisioner for KeyringProvisioner {
    fn get_or_create_key(&self, alias: &str) -> Result<SecretKey, KeyStoreError> {
        let _guard = self
            .create_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = self.entry(alias)?;

        match entry.get_secret() {
            Ok(secret) => {
                let secret = zeroize::Zeroizing::new(secret);
                let key = Self::decode_key(alias, &secret)?;
                tracing::debug!(fingerprint = %key.fingerprint(), "Retrieved existing key from keyring");
                Ok(key)
            }
            Err(keyring::Error::NoEntry) => {
                tracing::info!("No key found for store — generating new one");
                let key = SecretKey::generate();
                entry.set_secret(key.as_bytes()).map_err(|e| {
                    KeyStoreError::new(
                        alias,
                        KeyStoreCause::Keyring(format!("failed to store key: {}", e)),
                    )
                })?;
                tracing::info!(fingerprint = %key.fingerprint(), "Key stored in platform keyring");
                Ok(key)
            }
            Err(e) => Err(KeyStoreError::new(
                alias,
                KeyStoreCause::Keyring(format!("failed to retrieve key: {}", e)),
            )),
        }
    }

    fn delete_key(&self, alias: &str) -> Result<(), KeyStoreError> {
        let entry = self.entry(alias)?;
        match entry.delete_credential() {
            Ok(()) => {
                tracing::warn!("Key deleted from keyring — data sealed under it is now unrecoverable");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("No key to delete");
                Ok(())
            }
            Err(e) => Err(KeyStoreError::new(
                alias,
                KeyStoreCause::Keyring(format!("failed to delete key: {}", e)),
            )),
        }
    }

    fn has_key(&self, alias: &str) -> Result<bool, KeyStoreError> {
        let entry = self.entry(alias)?;
        match entry.get_secret() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(KeyStoreError::new(
                alias,
                KeyStoreCause::Keyring(format!("failed to check key: {}", e)),
            )),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
