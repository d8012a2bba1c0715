// SealedPrefs — Enclave Module
//
// Provisions the per-store AES key. A store name is used as the key alias;
// the key is created on first use and lives in the configured backend
// (OS keyring, passphrase-protected keystore file, or process memory).

mod error;
mod file;
mod memory;
mod provider;

pub use error::{KeyStoreCause, KeyStoreError};
pub use file::{FileProvisioner, KdfParams};
pub use memory::MemoryProvisioner;
pub use provider::{KeyProvisioner, KeyringProvisioner, DEFAULT_KEYRING_SERVICE};
