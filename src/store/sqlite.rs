// SealedPrefs — SQLite Substrate
//
// A persistent substrate backed by `Database`. Reads are served from an
// in-memory cache loaded at open. All disk writes go through one writer
// thread that owns the connection, so `apply` and `commit` reach disk in the
// order they were issued. Submissions are serialized so the cache sees edits
// in that same order.
//
//   commit: lock → enqueue → wait for the writer's verdict → update cache on success
//   apply:  lock → update cache → enqueue → return (failures are only logged)

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use super::db::Database;
use super::substrate::{
    ChangeListener, ListenerId, ListenerRegistry, PendingEdits, StoredValue, Substrate,
    SubstrateEditor,
};
use super::StoreError;

struct WriteJob {
    edits: PendingEdits,
    reply: Option<Sender<bool>>,
}

struct SqliteInner {
    name: String,
    cache: RwLock<BTreeMap<String, StoredValue>>,
    listeners: ListenerRegistry,
    // Held from cache update through enqueue (and a commit's verdict).
    submit: Mutex<()>,
    writer: Mutex<Option<Sender<WriteJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteInner {
    fn enqueue(&self, job: WriteJob) -> Result<(), StoreError> {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| StoreError::WriterUnavailable),
            None => Err(StoreError::WriterUnavailable),
        }
    }

    /// Caller holds `submit`. Listeners are notified by the caller after it
    /// releases the lock, so a listener may itself write.
    fn update_cache(&self, edits: &PendingEdits) -> Vec<String> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        edits.apply_to(&mut cache)
    }

    fn commit(&self, edits: PendingEdits) -> bool {
        let changed = {
            let _submit = self.submit.lock().unwrap_or_else(PoisonError::into_inner);
            let (reply_tx, reply_rx) = mpsc::channel();
            let job = WriteJob {
                edits: edits.clone(),
                reply: Some(reply_tx),
            };

            if let Err(e) = self.enqueue(job) {
                tracing::warn!(store = %self.name, error = %e, "Commit could not be queued");
                return false;
            }

            match reply_rx.recv() {
                Ok(true) => self.update_cache(&edits),
                Ok(false) | Err(_) => return false,
            }
        };

        self.listeners.notify(edits.is_clear(), &changed);
        true
    }

    fn apply(&self, edits: PendingEdits) {
        let cleared = edits.is_clear();
        let changed = {
            let _submit = self.submit.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = self.update_cache(&edits);
            if let Err(e) = self.enqueue(WriteJob { edits, reply: None }) {
                tracing::warn!(store = %self.name, error = %e, "Applied edits were not persisted");
            }
            changed
        };
        self.listeners.notify(cleared, &changed);
    }
}

impl Drop for SqliteInner {
    /// Closing the queue lets the writer drain pending jobs and exit.
    fn drop(&mut self) {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                tracing::warn!(store = %self.name, "Writer thread panicked");
            }
        }
    }
}

/// Cloning shares the cache and writer.
#[derive(Clone)]
pub struct SqliteSubstrate {
    inner: Arc<SqliteInner>,
}

impl SqliteSubstrate {
    /// Open the named store inside the database file at `path`.
    pub fn open(path: &Path, name: &str) -> Result<Self, StoreError> {
        Self::from_database(Database::open(path)?, name)
    }

    /// Take ownership of an open database and serve the named store from it.
    pub fn from_database(mut db: Database, name: &str) -> Result<Self, StoreError> {
        let cache = db.load(name)?;
        tracing::debug!(store = %name, slots = cache.len(), "Loaded substrate cache");

        let (tx, rx) = mpsc::channel::<WriteJob>();
        let store = name.to_string();
        let worker = std::thread::Builder::new()
            .name(format!("sealed-prefs-writer-{}", name))
            .spawn(move || {
                for job in rx {
                    let ok = match db.write(&store, &job.edits) {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(store = %store, error = %e, "Failed to persist edits");
                            false
                        }
                    };
                    if let Some(reply) = job.reply {
                        let _ = reply.send(ok);
                    }
                }
            })?;

        Ok(Self {
            inner: Arc::new(SqliteInner {
                name: name.to_string(),
                cache: RwLock::new(cache),
                listeners: ListenerRegistry::default(),
                submit: Mutex::new(()),
                writer: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// Block until every write queued so far has reached disk.
    pub fn flush(&self) -> bool {
        self.inner.commit(PendingEdits::default())
    }
}

impl Substrate for SqliteSubstrate {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn get_all(&self) -> BTreeMap<String, StoredValue> {
        self.inner
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        self.inner
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.inner
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn edit(&self) -> Box<dyn SubstrateEditor> {
        Box::new(SqliteEditor {
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

struct SqliteEditor {
    inner: Arc<SqliteInner>,
    pending: PendingEdits,
}

impl SubstrateEditor for SqliteEditor {
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
        let SqliteEditor { inner, pending } = *self;
        inner.commit(pending)
    }

    fn apply(self: Box<Self>) {
        let SqliteEditor { inner, pending } = *self;
        inner.apply(pending)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, name: &str) -> SqliteSubstrate {
        SqliteSubstrate::open(&dir.path().join("prefs.db"), name).unwrap()
    }

    #[test]
    fn test_commit_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let substrate = open(&dir, "prefs");
            let mut editor = substrate.edit();
            editor.put_string("a", Some("1".to_string()));
            editor.put_string_set("b", Some(BTreeSet::from(["x".to_string()])));
            assert!(editor.commit());
        }

        let reopened = open(&dir, "prefs");
        assert_eq!(
            reopened.get("a"),
            Some(StoredValue::Text("1".to_string()))
        );
        assert!(reopened.contains("b"));
    }

    #[test]
    fn test_apply_is_visible_immediately_and_persisted_after_flush() {
        let dir = TempDir::new().unwrap();
        let substrate = open(&dir, "prefs");

        let mut editor = substrate.edit();
        editor.put_string("a", Some("1".to_string()));
        editor.apply();
        assert!(substrate.contains("a"), "apply must update reads at once");

        assert!(substrate.flush());
        let db = Database::open(&dir.path().join("prefs.db")).unwrap();
        assert!(db.load("prefs").unwrap().contains_key("a"));
    }

    #[test]
    fn test_drop_drains_pending_applies() {
        let dir = TempDir::new().unwrap();
        {
            let substrate = open(&dir, "prefs");
            for i in 0..20 {
                let mut editor = substrate.edit();
                editor.put_string(&format!("k{}", i), Some(i.to_string()));
                editor.apply();
            }
        }

        let reopened = open(&dir, "prefs");
        assert_eq!(reopened.get_all().len(), 20);
    }

    #[test]
    fn test_writes_land_in_issue_order() {
        let dir = TempDir::new().unwrap();
        {
            let substrate = open(&dir, "prefs");
            let mut first = substrate.edit();
            first.put_string("k", Some("first".to_string()));
            first.apply();

            let mut second = substrate.edit();
            second.put_string("k", Some("second".to_string()));
            assert!(second.commit());
        }

        let reopened = open(&dir, "prefs");
        assert_eq!(
            reopened.get("k"),
            Some(StoredValue::Text("second".to_string()))
        );
    }

    #[test]
    fn test_cache_matches_disk_after_racing_commit_and_apply() {
        let dir = TempDir::new().unwrap();
        let substrate = open(&dir, "prefs");

        for run in 0..50 {
            let committer = substrate.clone();
            let handle = std::thread::spawn(move || {
                let mut editor = committer.edit();
                editor.put_string("k", Some("commit".to_string()));
                assert!(editor.commit());
            });

            std::thread::sleep(std::time::Duration::from_micros(50));
            let mut editor = substrate.edit();
            editor.put_string("k", Some("apply".to_string()));
            editor.apply();

            handle.join().unwrap();
            assert!(substrate.flush());

            let on_disk = Database::open(&dir.path().join("prefs.db"))
                .unwrap()
                .load("prefs")
                .unwrap();
            assert_eq!(
                substrate.get("k"),
                on_disk.get("k").cloned(),
                "cache and disk diverged on run {}",
                run
            );
        }
    }

    #[test]
    fn test_clear_only_touches_own_store() {
        let dir = TempDir::new().unwrap();
        {
            let one = open(&dir, "one");
            let mut editor = one.edit();
            editor.put_string("a", Some("1".to_string()));
            assert!(editor.commit());
        }
        {
            let two = open(&dir, "two");
            let mut editor = two.edit();
            editor.clear();
            assert!(editor.commit());
        }

        assert!(open(&dir, "one").contains("a"));
    }
}
