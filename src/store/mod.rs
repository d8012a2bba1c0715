// SealedPrefs — Store Module
//
// The encrypted preference store and the plaintext substrates it wraps.
// Substrates only ever see sealed keys and values; the logical-key index and
// the batch editor live on top of them.

mod db;
mod editor;
mod encrypted;
mod error;
mod memory;
mod sqlite;
mod substrate;

pub use db::Database;
pub use editor::Editor;
pub use encrypted::EncryptedPreferences;
pub use error::StoreError;
pub use memory::MemorySubstrate;
pub use sqlite::SqliteSubstrate;
pub use substrate::{
    ChangeListener, ListenerId, ListenerRegistry, PendingEdits, Staged, StoredValue, Substrate,
    SubstrateEditor,
};
