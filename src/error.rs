// SealedPrefs — Top-level error types
//
// Aggregates errors from the crypto, enclave, store, and config modules into a
// single error enum for the public API.

use thiserror::Error;

/// Top-level error type for all SealedPrefs operations.
#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] crate::enclave::KeyStoreError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Type mismatch for '{key}': stored value is not a valid {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PrefsError>;
