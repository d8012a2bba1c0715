// SealedPrefs — Enclave error types

use thiserror::Error;

/// Any failure of a key backend, tagged with the alias it concerned.
#[derive(Debug, Error)]
#[error("key store error for alias '{alias}': {cause}")]
pub struct KeyStoreError {
    pub alias: String,
    #[source]
    pub cause: KeyStoreCause,
}

impl KeyStoreError {
    pub fn new(alias: &str, cause: KeyStoreCause) -> Self {
        Self {
            alias: alias.to_string(),
            cause,
        }
    }
}

#[derive(Debug, Error)]
pub enum KeyStoreCause {
    #[error("keyring: {0}")]
    Keyring(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("keystore file is corrupt: {0}")]
    Corrupt(String),

    #[error("key derivation: {0}")]
    Derivation(String),

    #[error("sealing key material failed: {0}")]
    Seal(String),

    #[error("wrong passphrase or tampered key material")]
    Unseal,

    #[error("stored key material is invalid: {0}")]
    InvalidKey(String),
}
