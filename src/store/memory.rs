// SealedPrefs — In-Memory Substrate
//
// A process-local substrate. `commit` and `apply` both take effect at once;
// nothing is persisted. A read-only switch makes every flush fail, which is
// how callers exercise the commit-failure path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::substrate::{
    ChangeListener, ListenerId, ListenerRegistry, PendingEdits, StoredValue, Substrate,
    SubstrateEditor,
};

struct MemoryInner {
    name: String,
    map: RwLock<BTreeMap<String, StoredValue>>,
    listeners: ListenerRegistry,
    read_only: AtomicBool,
}

impl MemoryInner {
    fn flush(&self, edits: &PendingEdits) -> bool {
        if self.read_only.load(Ordering::Acquire) {
            tracing::warn!(store = %self.name, "Rejected write to read-only substrate");
            return false;
        }

        let changed = {
            let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
            edits.apply_to(&mut map)
        };
        self.listeners.notify(edits.is_clear(), &changed);
        true
    }
}

/// Cloning shares the same underlying map.
#[derive(Clone)]
pub struct MemorySubstrate {
    inner: Arc<MemoryInner>,
}

impl MemorySubstrate {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name: name.to_string(),
                map: RwLock::new(BTreeMap::new()),
                listeners: ListenerRegistry::default(),
                read_only: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.inner.read_only.store(read_only, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.inner
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Substrate for MemorySubstrate {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn get_all(&self) -> BTreeMap<String, StoredValue> {
        self.inner
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        self.inner
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.inner
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn edit(&self) -> Box<dyn SubstrateEditor> {
        Box::new(MemoryEditor {
            inner: Arc::clone(&self.inner),
            pending: PendingEdits::default(),
        })
    }

    fn register_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.inner.listeners.register(listener)
    }

    fn unregister_change_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.unregister(id)
    }
}

struct MemoryEditor {
    inner: Arc<MemoryInner>,
    pending: PendingEdits,
}

impl SubstrateEditor for MemoryEditor {
    fn put_string(&mut self, key: &str, value: Option<String>) {
        self.pending.put_string(key, value);
    }

    fn put_string_set(&mut self, key: &str, value: Option<BTreeSet<String>>) {
        self.pending.put_string_set(key, value);
    }

    fn remove(&mut self, key: &str) {
        self.pending.remove(key);
    }

    fn clear(&mut self) {
        self.pending.clear();
    }

    fn commit(self: Box<Self>) -> bool {
        self.inner.flush(&self.pending)
    }

    fn apply(self: Box<Self>) {
        self.inner.flush(&self.pending);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
