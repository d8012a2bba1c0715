// SealedPrefs — Configuration
//
// Where the preference database lives and which key backend provisions store
// keys. Loaded from an optional JSON file; every field has a default, and the
// data directory can be overridden through the environment.
//
// Example:
//   {
//     "data_dir": "/var/lib/myapp",
//     "key_backend": { "type": "file", "passphrase_env": "MYAPP_PASSPHRASE" }
//   }

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enclave::{FileProvisioner, KeyProvisioner, KeyringProvisioner, DEFAULT_KEYRING_SERVICE};

/// Overrides `data_dir` when set.
pub const DATA_DIR_ENV: &str = "SEALED_PREFS_DATA_DIR";

const DEFAULT_DATABASE_FILE: &str = "prefs.db";
const DEFAULT_KEYSTORE_FILE: &str = "keystore.json";
const DEFAULT_PASSPHRASE_ENV: &str = "SEALED_PREFS_PASSPHRASE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("passphrase environment variable '{0}' is not set")]
    MissingPassphrase(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyBackend {
    /// Platform keyring (Keychain / Credential Manager / Secret Service).
    Keyring { service: String },

    /// Passphrase-protected keystore file. `path` defaults to
    /// `<data_dir>/keystore.json`.
    File {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default = "default_passphrase_env")]
        passphrase_env: String,
    },
}

fn default_passphrase_env() -> String {
    DEFAULT_PASSPHRASE_ENV.to_string()
}

impl Default for KeyBackend {
    fn default() -> Self {
        KeyBackend::Keyring {
            service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub key_backend: KeyBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            key_backend: KeyBackend::default(),
        }
    }
}

/// Default directory for SealedPrefs data files.
fn default_data_dir() -> PathBuf {
    let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("sealed-prefs")
}

impl Config {
    /// Load from `path` if given, else defaults; then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_json(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        Ok(config.with_env(|var| std::env::var(var).ok()))
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply environment overrides through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Build the configured key backend.
    pub fn provisioner(&self) -> Result<Box<dyn KeyProvisioner>, ConfigError> {
        self.provisioner_with(|var| std::env::var(var).ok())
    }

    fn provisioner_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Box<dyn KeyProvisioner>, ConfigError> {
        match &self.key_backend {
            KeyBackend::Keyring { service } => Ok(Box::new(KeyringProvisioner::with_service(service))),
            KeyBackend::File {
                path,
                passphrase_env,
            } => {
                let passphrase = lookup(passphrase_env)
                    .ok_or_else(|| ConfigError::MissingPassphrase(passphrase_env.clone()))?;
                let path = path
                    .clone()
                    .unwrap_or_else(|| self.data_dir.join(DEFAULT_KEYSTORE_FILE));
                Ok(Box::new(FileProvisioner::new(path, passphrase)))
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
