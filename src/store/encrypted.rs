// SealedPrefs — Encrypted Preference Store
//
// Wraps a substrate so that neither keys nor values are ever stored in the
// clear. Callers address preferences by logical key; the store keeps an index
// from logical key to the sealed key actually used in the substrate.
//
// Key design decisions:
//   - The index is rebuilt at open by decrypting every substrate key. Keys
//     that fail to decrypt (legacy plaintext, rotated key) are left out.
//   - The index is only replaced wholesale, by a committed or applied
//     `Editor`. Readers clone an `Arc` snapshot and never see a torn index.
//   - `get_all` is best-effort: undecryptable entries are dropped. Typed
//     getters propagate decryption and parse failures instead.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::crypto::{self, SecretKey};
use crate::enclave::KeyProvisioner;
use crate::error::{PrefsError, Result};

use super::editor::Editor;
use super::substrate::{ChangeListener, ListenerId, StoredValue, Substrate};

/// Logical key → sealed substrate key.
pub(crate) type KeyIndex = HashMap<String, String>;

pub(crate) struct Shared<S> {
    pub(crate) substrate: S,
    pub(crate) key: SecretKey,
    index: RwLock<Arc<KeyIndex>>,
}

impl<S> Shared<S> {
    pub(crate) fn snapshot(&self) -> Arc<KeyIndex> {
        Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn replace_index(&self, index: KeyIndex) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
    }
}

/// Encrypted view over a substrate. Cheap to clone; clones share the index.
pub struct EncryptedPreferences<S: Substrate> {
    shared: Arc<Shared<S>>,
}

impl<S: Substrate> Clone for EncryptedPreferences<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Substrate> EncryptedPreferences<S> {
    /// Open the store, fetching (or minting) the key aliased by the
    /// substrate's name.
    pub fn open<P: KeyProvisioner + ?Sized>(substrate: S, provisioner: &P) -> Result<Self> {
        let key = provisioner.get_or_create_key(substrate.name())?;
        Ok(Self::with_key(substrate, key))
    }

    /// Open the store with an already provisioned key.
    pub fn with_key(substrate: S, key: SecretKey) -> Self {
        let index = Self::rebuild_index(&substrate, &key);
        Self {
            shared: Arc::new(Shared {
                substrate,
                key,
                index: RwLock::new(Arc::new(index)),
            }),
        }
    }

    fn rebuild_index(substrate: &S, key: &SecretKey) -> KeyIndex {
        let mut index = KeyIndex::new();
        let mut skipped = 0usize;

        for sealed in substrate.get_all().into_keys() {
            match crypto::decrypt_str(&sealed, key) {
                Ok(logical) => {
                    index.insert(logical, sealed);
                }
                Err(_) => skipped += 1,
            }
        }

        tracing::debug!(
            store = %substrate.name(),
            indexed = index.len(),
            skipped,
            "Rebuilt key index"
        );
        index
    }

    pub fn name(&self) -> &str {
        self.shared.substrate.name()
    }

    /// The wrapped substrate, for inspecting raw (sealed) contents.
    pub fn substrate(&self) -> &S {
        &self.shared.substrate
    }

    fn sealed_key(&self, key: &str) -> Option<String> {
        self.shared.snapshot().get(key).cloned()
    }

    fn decrypt_members(&self, members: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        for member in members {
            out.insert(crypto::decrypt_str(member, &self.shared.key)?);
        }
        Ok(out)
    }

    fn decrypt_value(&self, value: &StoredValue) -> Result<StoredValue> {
        Ok(match value {
            StoredValue::Text(text) => StoredValue::Text(crypto::decrypt_str(text, &self.shared.key)?),
            StoredValue::Set(members) => StoredValue::Set(self.decrypt_members(members)?),
        })
    }

    /// Decrypt everything that can be decrypted. Entries that fail are
    /// silently dropped, so the result may be incomplete.
    pub fn get_all(&self) -> BTreeMap<String, StoredValue> {
        let mut out = BTreeMap::new();
        let mut skipped = 0usize;

        for (sealed_key, sealed_value) in self.shared.substrate.get_all() {
            let logical = match crypto::decrypt_str(&sealed_key, &self.shared.key) {
                Ok(logical) => logical,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            match self.decrypt_value(&sealed_value) {
                Ok(value) => {
                    out.insert(logical, value);
                }
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::debug!(store = %self.name(), skipped, "Dropped undecryptable entries");
        }
        out
    }

    /// Read and decrypt a string slot. `Ok(None)` means absent.
    fn read_text(&self, key: &str, expected: &'static str) -> Result<Option<String>> {
        let Some(sealed_key) = self.sealed_key(key) else {
            return Ok(None);
        };
        match self.shared.substrate.get(&sealed_key) {
            None => Ok(None),
            Some(StoredValue::Text(sealed)) => Ok(Some(crypto::decrypt_str(&sealed, &self.shared.key)?)),
            Some(StoredValue::Set(_)) => Err(PrefsError::TypeMismatch {
                key: key.to_string(),
                expected,
            }),
        }
    }

    fn read_scalar<T: FromStr>(&self, key: &str, default: T, expected: &'static str) -> Result<T> {
        match self.read_text(key, expected)? {
            None => Ok(default),
            Some(text) => text.parse().map_err(|_| PrefsError::TypeMismatch {
                key: key.to_string(),
                expected,
            }),
        }
    }

    pub fn get_string(&self, key: &str, default: Option<&str>) -> Result<Option<String>> {
        Ok(self
            .read_text(key, "string")?
            .or_else(|| default.map(str::to_string)))
    }

    pub fn get_string_set(
        &self,
        key: &str,
        default: Option<BTreeSet<String>>,
    ) -> Result<Option<BTreeSet<String>>> {
        let Some(sealed_key) = self.sealed_key(key) else {
            return Ok(default);
        };
        match self.shared.substrate.get(&sealed_key) {
            None => Ok(default),
            Some(StoredValue::Set(members)) => Ok(Some(self.decrypt_members(&members)?)),
            Some(StoredValue::Text(_)) => Err(PrefsError::TypeMismatch {
                key: key.to_string(),
                expected: "string set",
            }),
        }
    }

    pub fn get_int(&self, key: &str, default: i32) -> Result<i32> {
        self.read_scalar(key, default, "int")
    }

    pub fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        self.read_scalar(key, default, "long")
    }

    pub fn get_float(&self, key: &str, default: f32) -> Result<f32> {
        self.read_scalar(key, default, "float")
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> Result<bool> {
        self.read_scalar(key, default, "boolean")
    }

    /// True iff `key` is indexed and its sealed slot exists in the substrate.
    pub fn contains(&self, key: &str) -> bool {
        self.sealed_key(key)
            .is_some_and(|sealed| self.shared.substrate.contains(&sealed))
    }

    /// Number of logical keys with a live slot.
    pub fn len(&self) -> usize {
        self.shared
            .snapshot()
            .values()
            .filter(|sealed| self.shared.substrate.contains(sealed))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a transaction seeded with the current index.
    pub fn edit(&self) -> Editor<S> {
        Editor::new(Arc::clone(&self.shared))
    }

    /// Subscribe to raw substrate changes. Listeners receive sealed keys;
    /// call `get_all` again to see decrypted contents.
    pub fn register_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.shared.substrate.register_change_listener(listener)
    }

    pub fn unregister_change_listener(&self, id: ListenerId) -> bool {
        self.shared.substrate.unregister_change_listener(id)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::MemoryProvisioner;
    use crate::store::MemorySubstrate;
    use std::sync::Mutex;

    fn open_store() -> EncryptedPreferences<MemorySubstrate> {
        EncryptedPreferences::with_key(MemorySubstrate::new("prefs"), SecretKey::generate())
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_trip_all_types() {
        let store = open_store();
        assert!(store
            .edit()
            .put_string("name", "alice")
            .unwrap()
            .put_string_set("tags", set(&["a", "b"]))
            .unwrap()
            .put_int("count", -42)
            .unwrap()
            .put_long("big", i64::MAX)
            .unwrap()
            .put_float("ratio", 0.25)
            .unwrap()
            .put_boolean("enabled", true)
            .unwrap()
            .commit());

        assert_eq!(store.get_string("name", None).unwrap().as_deref(), Some("alice"));
        assert_eq!(store.get_string_set("tags", None).unwrap(), Some(set(&["a", "b"])));
        assert_eq!(store.get_int("count", 0).unwrap(), -42);
        assert_eq!(store.get_long("big", 0).unwrap(), i64::MAX);
        assert_eq!(store.get_float("ratio", 0.0).unwrap(), 0.25);
        assert!(store.get_boolean("enabled", false).unwrap());
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn test_substrate_never_sees_plaintext() {
        let store = open_store();
        assert!(store
            .edit()
            .put_string("api-token", "hunter2")
            .unwrap()
            .put_string_set("roles", set(&["admin"]))
            .unwrap()
            .commit());

        for (key, value) in store.substrate().get_all() {
            assert!(!key.contains("api-token") && !key.contains("roles"));
            match value {
                StoredValue::Text(text) => assert!(!text.contains("hunter2")),
                StoredValue::Set(members) => assert!(!members.contains("admin")),
            }
        }
    }

    #[test]
    fn test_defaults_for_absent_keys() {
        let store = open_store();
        assert_eq!(store.get_string("absent", Some("D")).unwrap().as_deref(), Some("D"));
        assert_eq!(store.get_string("absent", None).unwrap(), None);
        assert_eq!(store.get_int("absent", 7).unwrap(), 7);
        assert_eq!(store.get_long("absent", 7).unwrap(), 7);
        assert_eq!(store.get_float("absent", 1.5).unwrap(), 1.5);
        assert!(store.get_boolean("absent", true).unwrap());
        assert_eq!(
            store.get_string_set("absent", Some(set(&["d"]))).unwrap(),
            Some(set(&["d"]))
        );
        assert!(!store.contains("absent"));
    }

    #[test]
    fn test_type_mismatch_is_not_a_default() {
        let store = open_store();
        assert!(store
            .edit()
            .put_string("k", "not a number")
            .unwrap()
            .put_string_set("s", set(&["x"]))
            .unwrap()
            .commit());

        assert!(matches!(
            store.get_int("k", 0),
            Err(PrefsError::TypeMismatch { expected: "int", .. })
        ));
        assert!(matches!(store.get_boolean("k", false), Err(PrefsError::TypeMismatch { .. })));
        assert!(matches!(store.get_string("s", None), Err(PrefsError::TypeMismatch { .. })));
        assert!(matches!(
            store.get_string_set("k", None),
            Err(PrefsError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_index_stability_under_reuse() {
        let store = open_store();
        assert!(store.edit().put_string("k", "a").unwrap().commit());
        assert!(store.edit().put_string("k", "b").unwrap().commit());

        assert_eq!(store.substrate().len(), 1, "One logical key must use one slot");
        assert_eq!(store.get_string("k", None).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_reopen_rebuilds_index() {
        let substrate = MemorySubstrate::new("prefs");
        let key = SecretKey::generate();

        let store = EncryptedPreferences::with_key(substrate.clone(), key.clone());
        assert!(store.edit().put_int("n", 3).unwrap().commit());

        let reopened = EncryptedPreferences::with_key(substrate, key);
        assert!(reopened.contains("n"));
        assert_eq!(reopened.get_int("n", 0).unwrap(), 3);

        assert!(reopened.edit().put_int("n", 4).unwrap().commit());
        assert_eq!(reopened.substrate().len(), 1);
    }

    #[test]
    fn test_get_all_skips_undecryptable_entries() {
        let substrate = MemorySubstrate::new("prefs");
        let store = EncryptedPreferences::with_key(substrate.clone(), SecretKey::generate());
        assert!(store.edit().put_string("good", "1").unwrap().commit());

        let mut raw = substrate.edit();
        raw.put_string("legacy-plaintext", Some("value".to_string()));
        raw.commit();

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("good"), Some(&StoredValue::Text("1".to_string())));

        let reopened = EncryptedPreferences::with_key(substrate, store.shared.key.clone());
        assert!(!reopened.contains("legacy-plaintext"));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_corrupt_value_surfaces_crypto_error() {
        let store = open_store();
        assert!(store.edit().put_string("k", "v").unwrap().commit());

        let sealed_key = store.sealed_key("k").unwrap();
        let mut raw = store.substrate().edit();
        raw.put_string(&sealed_key, Some("garbage".to_string()));
        raw.commit();

        assert!(matches!(store.get_string("k", None), Err(PrefsError::Crypto(_))));
        assert!(store.get_all().is_empty(), "get_all must drop the corrupt entry");
    }

    #[test]
    fn test_key_rotation_loses_data() {
        let provisioner = MemoryProvisioner::new();
        let substrate = MemorySubstrate::new("X");

        let store = EncryptedPreferences::open(substrate.clone(), &provisioner).unwrap();
        assert!(store.edit().put_string("a", "1").unwrap().commit());
        assert!(store.contains("a"));

        provisioner.delete_key("X").unwrap();

        let reopened = EncryptedPreferences::open(substrate, &provisioner).unwrap();
        assert!(reopened.get_all().is_empty());
        assert!(!reopened.contains("a"));
        assert_eq!(reopened.get_string("a", None).unwrap(), None);
    }

    #[test]
    fn test_clear_semantics() {
        let store = open_store();
        assert!(store
            .edit()
            .put_string("a", "1")
            .unwrap()
            .put_string("b", "2")
            .unwrap()
            .commit());

        assert!(store.edit().clear().commit());
        assert!(store.get_all().is_empty());
        assert!(!store.contains("a"));

        assert!(store.edit().put_string("a", "3").unwrap().commit());
        assert_eq!(store.get_string("a", None).unwrap().as_deref(), Some("3"));
        assert_eq!(store.substrate().len(), 1);
    }

    #[test]
    fn test_listener_receives_sealed_keys() {
        let store = open_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store.register_change_listener(Arc::new(move |key: Option<&str>| {
            sink.lock().unwrap().push(key.map(str::to_string));
        }));

        assert!(store.edit().put_string("k", "v").unwrap().commit());
        let sealed = store.sealed_key("k").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Some(sealed)]);

        assert!(store.unregister_change_listener(id));
        assert!(store.edit().put_string("k", "w").unwrap().commit());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    // ─── Persistent store ────────────────────────────────────────────────

    fn open_sqlite<P: KeyProvisioner>(
        dir: &tempfile::TempDir,
        provisioner: &P,
    ) -> EncryptedPreferences<crate::store::SqliteSubstrate> {
        let substrate =
            crate::store::SqliteSubstrate::open(&dir.path().join("prefs.db"), "settings").unwrap();
        EncryptedPreferences::open(substrate, provisioner).unwrap()
    }

    #[test]
    fn test_sqlite_commit_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let provisioner = MemoryProvisioner::new();

        let slot = {
            let store = open_sqlite(&dir, &provisioner);
            assert!(store
                .edit()
                .put_string("theme", "dark")
                .unwrap()
                .put_string_set("langs", set(&["en", "fr"]))
                .unwrap()
                .put_int("retries", 3)
                .unwrap()
                .commit());
            store.sealed_key("theme").unwrap()
        };

        let store = open_sqlite(&dir, &provisioner);
        assert_eq!(store.len(), 3, "Index must be rebuilt from disk");
        assert_eq!(store.get_string("theme", None).unwrap().as_deref(), Some("dark"));
        assert_eq!(store.get_string_set("langs", None).unwrap(), Some(set(&["en", "fr"])));
        assert_eq!(store.get_int("retries", 0).unwrap(), 3);

        assert!(store.edit().put_string("theme", "light").unwrap().commit());
        assert_eq!(store.sealed_key("theme").unwrap(), slot, "Reopened index must reuse the slot");
        assert_eq!(store.substrate().get_all().len(), 3);
    }

    #[test]
    fn test_sqlite_apply_then_drop_is_persisted() {
        let dir = tempfile::TempDir::new().unwrap();
        let provisioner = MemoryProvisioner::new();

        {
            let store = open_sqlite(&dir, &provisioner);
            store.edit().put_boolean("synced", true).unwrap().apply();
            assert!(store.get_boolean("synced", false).unwrap());
        }

        let store = open_sqlite(&dir, &provisioner);
        assert!(store.get_boolean("synced", false).unwrap());
    }

    #[test]
    fn test_sqlite_with_file_keystore_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let keystore = || {
            crate::enclave::FileProvisioner::with_params(
                dir.path().join("keys.json"),
                "hunter2",
                crate::enclave::KdfParams {
                    m_cost: 1024,
                    t_cost: 1,
                    p_cost: 1,
                },
            )
        };

        {
            let store = open_sqlite(&dir, &keystore());
            assert!(store.edit().put_long("launches", 12).unwrap().commit());
        }

        let store = open_sqlite(&dir, &keystore());
        assert_eq!(store.get_long("launches", 0).unwrap(), 12);
    }
}
