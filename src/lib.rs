// SealedPrefs — Library root
//
// Re-exports the crypto, enclave, store, config, and CLI modules.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod enclave;
pub mod error;
pub mod store;

pub use crypto::{CryptoError, SecretKey};
pub use enclave::{FileProvisioner, KeyProvisioner, KeyStoreError, KeyringProvisioner, MemoryProvisioner};
pub use error::{PrefsError, Result};
pub use store::{EncryptedPreferences, Editor, MemorySubstrate, SqliteSubstrate, StoredValue, Substrate};
