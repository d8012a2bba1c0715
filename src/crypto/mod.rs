// SealedPrefs — Crypto Module
//
// AES-256-GCM codec for preference keys and values, plus the in-memory
// secret key type handed out by the enclave provisioners.

pub mod codec;
mod error;
mod key;

pub use codec::{decrypt, decrypt_str, encrypt, encrypt_str, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use key::{SecretKey, KEY_LEN};
