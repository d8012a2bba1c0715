// SealedPrefs — Store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Background writer is no longer running")]
    WriterUnavailable,
}
