// SealedPrefs — Crypto error types

use thiserror::Error;

/// Codec failures. Every variant means no plaintext was produced.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: authentication tag did not verify")]
    Authentication,

    #[error("invalid blob encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("blob too short: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    #[error("decrypted payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}
