// SealedPrefs — SQLite Database Management
//
// Opens the preference database and maps substrate edits onto rows. Every
// key and value written here is already sealed; the database itself is a
// plain SQLite file.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rusqlite::{params, Connection};

use super::substrate::{PendingEdits, Staged, StoredValue};
use super::StoreError;

const KIND_STRING: &str = "string";
const KIND_SET: &str = "set";

/// Wrapper around a SQLite connection holding one or more named stores.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (nothing persisted).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run schema migrations to create or update tables.
    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                store       TEXT NOT NULL,
                key         TEXT NOT NULL,
                kind        TEXT NOT NULL CHECK (kind IN ('string', 'set')),
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (store, key)
            );
            ",
        )?;

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Load every slot of one named store.
    pub fn load(&self, store: &str) -> Result<BTreeMap<String, StoredValue>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, kind, value FROM preferences WHERE store = ?1")?;

        let rows = stmt.query_map(params![store], |row| {
            let key: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let value: String = row.get(2)?;
            Ok((key, kind, value))
        })?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (key, kind, value) = row?;
            let stored = match kind.as_str() {
                KIND_STRING => StoredValue::Text(value),
                KIND_SET => {
                    let members: BTreeSet<String> = serde_json::from_str(&value)?;
                    StoredValue::Set(members)
                }
                other => {
                    return Err(StoreError::Corrupt {
                        key,
                        reason: format!("unknown kind '{}'", other),
                    })
                }
            };
            map.insert(key, stored);
        }

        Ok(map)
    }

    /// Write a batch of edits for one store inside a single transaction.
    pub fn write(&mut self, store: &str, edits: &PendingEdits) -> Result<(), StoreError> {
        if edits.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        if edits.is_clear() {
            tx.execute("DELETE FROM preferences WHERE store = ?1", params![store])?;
        }

        for (key, staged) in edits.ops() {
            match staged {
                Staged::Put(value) => {
                    let (kind, encoded) = match value {
                        StoredValue::Text(text) => (KIND_STRING, text.clone()),
                        StoredValue::Set(set) => (KIND_SET, serde_json::to_string(set)?),
                    };
                    tx.execute(
                        "INSERT INTO preferences (store, key, kind, value, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT (store, key) DO UPDATE SET
                            kind = excluded.kind,
                            value = excluded.value,
                            updated_at = excluded.updated_at",
                        params![store, key, kind, encoded, now],
                    )?;
                }
                Staged::PutNull | Staged::Remove => {
                    tx.execute(
                        "DELETE FROM preferences WHERE store = ?1 AND key = ?2",
                        params![store, key],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
