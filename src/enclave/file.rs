// SealedPrefs — Passphrase Keystore File
//
// A software keystore for hosts without a platform keyring. Keys live in a
// JSON file, each one sealed with the AEAD codec under a key-encryption key
// (KEK) derived from a passphrase with Argon2id.
//
// File layout:
//   { "version": 1, "salt": "<base64>", "check": "<sealed blob>",
//     "keys": { "<alias>": "<sealed blob>" } }
//
// `check` seals a fixed marker under the KEK. A passphrase that cannot open it
// is rejected before any key is read or minted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{self, SecretKey, KEY_LEN};

use super::{KeyProvisioner, KeyStoreCause, KeyStoreError};

// ─── Constants ───────────────────────────────────────────────────────────────

const FILE_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const CHECK_MARKER: &[u8] = b"sealed-prefs keystore";

// Argon2id parameters: strong defaults for a security application.
// m=65536 (64 MiB), t=3 (3 iterations), p=4 (4 parallelism lanes)
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

/// Argon2id cost parameters used to derive the KEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: ARGON2_M_COST,
            t_cost: ARGON2_T_COST,
            p_cost: ARGON2_P_COST,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeystoreFile {
    version: u32,
    salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check: Option<String>,
    keys: BTreeMap<String, String>,
}

impl KeystoreFile {
    fn fresh() -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        Self {
            version: FILE_VERSION,
            salt: STANDARD_NO_PAD.encode(salt),
            check: None,
            keys: BTreeMap::new(),
        }
    }
}

/// Passphrase-protected keystore file.
///
/// All reads and writes of the file go through one lock, so concurrent
/// `get_or_create_key` calls in this process agree on a single key per alias.
/// The derived KEK is cached per salt to avoid re-running Argon2 on every call.
pub struct FileProvisioner {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    params: KdfParams,
    state: Mutex<Option<(String, SecretKey)>>,
}

impl FileProvisioner {
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self::with_params(path, passphrase, KdfParams::default())
    }

    pub fn with_params(
        path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
        params: KdfParams,
    ) -> Self {
        Self {
            path: path.into(),
            passphrase: Zeroizing::new(passphrase.into()),
            params,
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, alias: &str) -> Result<Option<KeystoreFile>, KeyStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KeyStoreError::new(alias, KeyStoreCause::Io(e))),
        };

        let file: KeystoreFile = serde_json::from_str(&raw)
            .map_err(|e| KeyStoreError::new(alias, KeyStoreCause::Corrupt(e.to_string())))?;

        if file.version != FILE_VERSION {
            return Err(KeyStoreError::new(
                alias,
                KeyStoreCause::Corrupt(format!("unsupported version {}", file.version)),
            ));
        }

        Ok(Some(file))
    }

    /// Write via a sibling temp file and rename, so a crash never leaves a
    /// half-written keystore.
    fn save(&self, alias: &str, file: &KeystoreFile) -> Result<(), KeyStoreError> {
        let io_err = |e: std::io::Error| KeyStoreError::new(alias, KeyStoreCause::Io(e));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(file)
            .map_err(|e| KeyStoreError::new(alias, KeyStoreCause::Corrupt(e.to_string())))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }

        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    fn derive_kek(&self, alias: &str, salt_b64: &str) -> Result<SecretKey, KeyStoreError> {
        let derivation = |msg: String| KeyStoreError::new(alias, KeyStoreCause::Derivation(msg));

        let salt = STANDARD_NO_PAD
            .decode(salt_b64.as_bytes())
            .map_err(|e| KeyStoreError::new(alias, KeyStoreCause::Corrupt(e.to_string())))?;

        let params = Params::new(
            self.params.m_cost,
            self.params.t_cost,
            self.params.p_cost,
            Some(KEY_LEN),
        )
        .map_err(|e| derivation(format!("invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut derived = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(self.passphrase.as_bytes(), &salt, derived.as_mut_slice())
            .map_err(|e| derivation(format!("Argon2id hash failed: {}", e)))?;

        SecretKey::from_bytes(derived.as_slice()).map_err(|e| derivation(e.to_string()))
    }

    fn kek_for(
        &self,
        cached: &mut Option<(String, SecretKey)>,
        alias: &str,
        salt: &str,
    ) -> Result<SecretKey, KeyStoreError> {
        if let Some((cached_salt, kek)) = cached.as_ref() {
            if cached_salt == salt {
                return Ok(kek.clone());
            }
        }
        let kek = self.derive_kek(alias, salt)?;
        *cached = Some((salt.to_string(), kek.clone()));
        Ok(kek)
    }

    /// Reject a KEK that does not open this file. Files written before the
    /// marker existed are checked against any one stored key instead.
    fn verify_kek(alias: &str, file: &KeystoreFile, kek: &SecretKey) -> Result<(), KeyStoreError> {
        if let Some(check) = &file.check {
            return match crypto::decrypt(check, kek) {
                Ok(marker) if marker == CHECK_MARKER => Ok(()),
                _ => Err(KeyStoreError::new(alias, KeyStoreCause::Unseal)),
            };
        }
        match file.keys.values().next() {
            Some(sealed) => Self::unseal(alias, sealed, kek).map(|_| ()),
            None => Ok(()),
        }
    }

    fn seal(alias: &str, plaintext: &[u8], kek: &SecretKey) -> Result<String, KeyStoreError> {
        crypto::encrypt(plaintext, kek)
            .map_err(|e| KeyStoreError::new(alias, KeyStoreCause::Seal(e.to_string())))
    }

    fn unseal(alias: &str, sealed: &str, kek: &SecretKey) -> Result<SecretKey, KeyStoreError> {
        let raw = Zeroizing::new(
            crypto::decrypt(sealed, kek).map_err(|_| KeyStoreError::new(alias, KeyStoreCause::Unseal))?,
        );
        SecretKey::from_bytes(&raw)
            .map_err(|e| KeyStoreError::new(alias, KeyStoreCause::InvalidKey(e.to_string())))
    }
}

impl KeyProvisioner for FileProvisioner {
    fn get_or_create_key(&self, alias: &str) -> Result<SecretKey, KeyStoreError> {
        let mut cached = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = self.load(alias)?.unwrap_or_else(KeystoreFile::fresh);
        let kek = self.kek_for(&mut cached, alias, &file.salt)?;
        Self::verify_kek(alias, &file, &kek)?;

        if let Some(sealed) = file.keys.get(alias) {
            let key = Self::unseal(alias, sealed, &kek)?;
            tracing::debug!(fingerprint = %key.fingerprint(), "Retrieved existing key from keystore file");
            return Ok(key);
        }

        tracing::info!(path = %self.path.display(), "No key found for store — generating new one");
        let key = SecretKey::generate();
        if file.check.is_none() {
            file.check = Some(Self::seal(alias, CHECK_MARKER, &kek)?);
        }
        file.keys.insert(alias.to_string(), Self::seal(alias, key.as_bytes(), &kek)?);
        self.save(alias, &file)?;

        tracing::info!(fingerprint = %key.fingerprint(), "Key stored in keystore file");
        Ok(key)
    }

    fn delete_key(&self, alias: &str) -> Result<(), KeyStoreError> {
        let _guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut file) = self.load(alias)? else {
            tracing::debug!("No keystore file — nothing to delete");
            return Ok(());
        };

        if file.keys.remove(alias).is_none() {
            tracing::debug!("No key to delete");
            return Ok(());
        }

        self.save(alias, &file)?;
        tracing::warn!("Key deleted from keystore file — data sealed under it is now unrecoverable");
        Ok(())
    }

    fn has_key(&self, alias: &str) -> Result<bool, KeyStoreError> {
        let _guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .load(alias)?
            .is_some_and(|file| file.keys.contains_key(alias)))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
