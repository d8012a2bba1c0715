// SealedPrefs — Substrate Contract
//
// The plaintext key-value map the encrypted store persists into. Anything
// that behaves like a flat string-keyed map with batched edits, an atomic
// commit, a fire-and-forget apply, and change notification can serve.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A value slot in the substrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Text(String),
    Set(BTreeSet<String>),
}

impl StoredValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoredValue::Text(text) => Some(text),
            StoredValue::Set(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            StoredValue::Set(set) => Some(set),
            StoredValue::Text(_) => None,
        }
    }
}

/// One staged mutation. `PutNull` is kept distinct from `Remove` so the
/// explicit-null write reaches the substrate as such.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staged {
    Put(StoredValue),
    PutNull,
    Remove,
}

/// Mutations collected by a substrate editor, flushed as one unit.
///
/// On flush a pending clear runs first, then the per-key operations, so
/// `clear().put(k, v)` leaves exactly `k` behind regardless of call order.
#[derive(Debug, Clone, Default)]
pub struct PendingEdits {
    clear: bool,
    ops: BTreeMap<String, Staged>,
}

impl PendingEdits {
    pub fn put_string(&mut self, key: &str, value: Option<String>) {
        let staged = match value {
            Some(text) => Staged::Put(StoredValue::Text(text)),
            None => Staged::PutNull,
        };
        self.ops.insert(key.to_string(), staged);
    }

    pub fn put_string_set(&mut self, key: &str, value: Option<BTreeSet<String>>) {
        let staged = match value {
            Some(set) => Staged::Put(StoredValue::Set(set)),
            None => Staged::PutNull,
        };
        self.ops.insert(key.to_string(), staged);
    }

    pub fn remove(&mut self, key: &str) {
        self.ops.insert(key.to_string(), Staged::Remove);
    }

    pub fn clear(&mut self) {
        self.clear = true;
    }

    pub fn is_clear(&self) -> bool {
        self.clear
    }

    pub fn ops(&self) -> impl Iterator<Item = (&str, &Staged)> {
        self.ops.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        !self.clear && self.ops.is_empty()
    }

    /// Apply onto an in-memory map. Explicit nulls remove the slot, which is
    /// how the wrapped platform store treats them. Returns the keys whose slot
    /// changed.
    pub fn apply_to(&self, map: &mut BTreeMap<String, StoredValue>) -> Vec<String> {
        if self.clear {
            map.clear();
        }

        let mut changed = Vec::new();
        for (key, staged) in &self.ops {
            match staged {
                Staged::Put(value) => {
                    if map.get(key) != Some(value) {
                        map.insert(key.clone(), value.clone());
                        changed.push(key.clone());
                    }
                }
                Staged::PutNull | Staged::Remove => {
                    if map.remove(key).is_some() {
                        changed.push(key.clone());
                    }
                }
            }
        }
        changed
    }
}

// ─── Change Notification ─────────────────────────────────────────────────────

/// Callback fired with the raw (still encrypted) key that changed, or `None`
/// after a clear.
pub type ChangeListener = Arc<dyn Fn(Option<&str>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
}

impl ListenerRegistry {
    pub fn register(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns true if the listener was registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Listeners run outside the registry lock so they may re-register.
    pub fn notify(&self, cleared: bool, changed: &[String]) {
        let snapshot: Vec<ChangeListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in &snapshot {
            if cleared {
                listener(None);
            }
            for key in changed {
                listener(Some(key));
            }
        }
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A named plaintext key-value map.
pub trait Substrate: Send + Sync {
    fn name(&self) -> &str;

    fn get_all(&self) -> BTreeMap<String, StoredValue>;

    fn get(&self, key: &str) -> Option<StoredValue>;

    fn contains(&self, key: &str) -> bool;

    /// Open a batch of mutations against this substrate.
    fn edit(&self) -> Box<dyn SubstrateEditor>;

    fn register_change_listener(&self, listener: ChangeListener) -> ListenerId;

    fn unregister_change_listener(&self, id: ListenerId) -> bool;
}

/// Batched mutations. `commit` flushes synchronously and reports success;
/// `apply` makes the edits visible immediately and persists in the
/// background without reporting failure.
pub trait SubstrateEditor: Send {
    fn put_string(&mut self, key: &str, value: Option<String>);

    fn put_string_set(&mut self, key: &str, value: Option<BTreeSet<String>>);

    fn remove(&mut self, key: &str);

    fn clear(&mut self);

    fn commit(self: Box<Self>) -> bool;

    fn apply(self: Box<Self>);
}

// ─── Tests ───────────────────────────────────────────────────────────────────
