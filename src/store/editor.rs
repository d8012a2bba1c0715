// SealedPrefs — Batch Editor
//
// A transaction over an `EncryptedPreferences`. Mutations are sealed and
// staged on the substrate's own editor; the store's key index is swapped for
// the editor's working copy only when the batch is committed or applied.
//
// Lifecycle is enforced by ownership: builder methods consume and return the
// editor, `commit`/`apply` consume it, and dropping it discards the batch.
// A builder method that returns an error has also discarded the batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::crypto;
use crate::error::Result;

use super::encrypted::{KeyIndex, Shared};
use super::substrate::{Substrate, SubstrateEditor};

#[must_use = "an editor does nothing until commit() or apply() is called"]
pub struct Editor<S: Substrate> {
    shared: Arc<Shared<S>>,
    working: KeyIndex,
    inner: Box<dyn SubstrateEditor>,
    staged: usize,
}

impl<S: Substrate> Editor<S> {
    pub(crate) fn new(shared: Arc<Shared<S>>) -> Self {
        let working = (*shared.snapshot()).clone();
        let inner = shared.substrate.edit();
        Self {
            shared,
            working,
            inner,
            staged: 0,
        }
    }

    /// Sealed slot for `key`, minted on first use within this batch. Checked
    /// against the working index so repeated puts share one slot.
    fn slot_for(&mut self, key: &str) -> Result<String> {
        if let Some(sealed) = self.working.get(key) {
            return Ok(sealed.clone());
        }
        let sealed = crypto::encrypt_str(key, &self.shared.key)?;
        self.working.insert(key.to_string(), sealed.clone());
        Ok(sealed)
    }

    fn put_text(mut self, key: &str, value: Option<&str>) -> Result<Self> {
        let slot = self.slot_for(key)?;
        let sealed = match value {
            Some(text) => Some(crypto::encrypt_str(text, &self.shared.key)?),
            None => None,
        };
        self.inner.put_string(&slot, sealed);
        self.staged += 1;
        Ok(self)
    }

    /// Stage a string write. `None` stages an explicit null.
    pub fn put_string<'v>(self, key: &str, value: impl Into<Option<&'v str>>) -> Result<Self> {
        self.put_text(key, value.into())
    }

    /// Stage a string-set write; every member is sealed independently.
    pub fn put_string_set(
        mut self,
        key: &str,
        value: impl Into<Option<BTreeSet<String>>>,
    ) -> Result<Self> {
        let slot = self.slot_for(key)?;
        let sealed = match value.into() {
            Some(members) => {
                let mut out = BTreeSet::new();
                for member in &members {
                    out.insert(crypto::encrypt_str(member, &self.shared.key)?);
                }
                Some(out)
            }
            None => None,
        };
        self.inner.put_string_set(&slot, sealed);
        self.staged += 1;
        Ok(self)
    }

    pub fn put_int(self, key: &str, value: i32) -> Result<Self> {
        self.put_text(key, Some(&value.to_string()))
    }

    pub fn put_long(self, key: &str, value: i64) -> Result<Self> {
        self.put_text(key, Some(&value.to_string()))
    }

    pub fn put_float(self, key: &str, value: f32) -> Result<Self> {
        self.put_text(key, Some(&value.to_string()))
    }

    pub fn put_boolean(self, key: &str, value: bool) -> Result<Self> {
        self.put_text(key, Some(if value { "true" } else { "false" }))
    }

    /// Stage removal of the stored value. The index entry is kept, so a later
    /// put of the same key lands on the same sealed slot.
    pub fn remove(mut self, key: &str) -> Self {
        if let Some(sealed) = self.working.get(key) {
            self.inner.remove(sealed);
            self.staged += 1;
        }
        self
    }

    /// Stage removal of every slot. The index is left as is.
    pub fn clear(mut self) -> Self {
        self.inner.clear();
        self.staged += 1;
        self
    }

    /// Flush synchronously. Returns false, leaving the index untouched, if
    /// the substrate rejected the batch.
    pub fn commit(self) -> bool {
        let Editor {
            shared,
            working,
            inner,
            staged,
        } = self;

        if inner.commit() {
            shared.replace_index(working);
            tracing::debug!(store = %shared.substrate.name(), staged, "Committed batch");
            true
        } else {
            tracing::warn!(store = %shared.substrate.name(), staged, "Commit failed; index unchanged");
            false
        }
    }

    /// Flush in the background. The index is swapped before the flush is
    /// known to have completed.
    pub fn apply(self) {
        let Editor {
            shared,
            working,
            inner,
            staged,
        } = self;

        shared.replace_index(working);
        inner.apply();
        tracing::debug!(store = %shared.substrate.name(), staged, "Applied batch");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
