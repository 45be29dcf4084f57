//! Per-user symmetric key storage
//!
//! Keys live as raw 32-byte files at `<keys_root>/<username>.key`, written
//! atomically (tempfile + rename) with mode 0644. Creation is serialized per
//! username so concurrent first-logins converge to one key; reads take no
//! lock.

use rand::RngCore;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use zeroize::Zeroize;

use crate::KEY_SIZE;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no key on disk for user {0:?}")]
    NotFound(String),

    #[error("key file for user {0:?} is {1} bytes, expected {KEY_SIZE}")]
    BadLength(String, usize),

    #[error("invalid username: {0:?}")]
    InvalidUser(String),

    #[error("key storage: {0}")]
    Io(#[from] std::io::Error),
}

/// A user's 256-bit symmetric key. Zeroized on drop.
#[derive(Clone)]
pub struct UserKey {
    bytes: [u8; KEY_SIZE],
}

impl UserKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for UserKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Key files under one root directory, one per user.
pub struct KeyStore {
    root: PathBuf,
    /// Per-username creation locks; entries are created on demand and
    /// retained for the process lifetime (one small Arc per known user).
    creating: StdMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl KeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            creating: StdMutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, username: &str) -> Result<PathBuf, KeyError> {
        if username.is_empty()
            || username == "."
            || username == ".."
            || username.contains(std::path::is_separator)
        {
            return Err(KeyError::InvalidUser(username.to_string()));
        }
        Ok(self.root.join(format!("{username}.key")))
    }

    /// Read a user's key from disk. A missing file is `NotFound`; a file of
    /// the wrong size is corruption and is reported as `BadLength`.
    pub fn get(&self, username: &str) -> Result<UserKey, KeyError> {
        let path = self.key_path(username)?;
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeyError::NotFound(username.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let bytes: [u8; KEY_SIZE] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::BadLength(username.to_string(), raw.len()))?;
        Ok(UserKey::from_bytes(bytes))
    }

    /// Generate and persist a fresh key for `username`.
    ///
    /// Not idempotent: a second call overwrites the first key. Callers go
    /// through [`ensure_for`](Self::ensure_for), which serializes creation.
    pub fn create(&self, username: &str) -> Result<UserKey, KeyError> {
        let path = self.key_path(username)?;
        std::fs::create_dir_all(&self.root)?;

        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(&path).map_err(|e| KeyError::Io(e.error))?;

        tracing::info!(user = username, path = %path.display(), "key created");
        Ok(UserKey::from_bytes(bytes))
    }

    /// Get the user's key, creating one on first login.
    ///
    /// Concurrent calls for the same username serialize on a keyed lock and
    /// all observe the same key value.
    pub async fn ensure_for(&self, username: &str) -> Result<UserKey, KeyError> {
        let slot = {
            let mut map = self.creating.lock().expect("keystore lock poisoned");
            map.entry(username.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        let _guard = slot.lock().await;

        match self.get(username) {
            Ok(key) => Ok(key),
            Err(KeyError::NotFound(_)) => self.create(username),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_then_get() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());

        let created = store.create("alice").unwrap();
        let loaded = store.get("alice").unwrap();

        assert_eq!(created.as_bytes(), loaded.as_bytes());
        assert_eq!(
            std::fs::read(tmp.path().join("alice.key")).unwrap().len(),
            KEY_SIZE
        );
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());

        assert!(matches!(store.get("ghost"), Err(KeyError::NotFound(_))));
    }

    #[test]
    fn test_truncated_key_file_is_bad_length() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());

        std::fs::write(tmp.path().join("bob.key"), [0u8; 7]).unwrap();
        assert!(matches!(store.get("bob"), Err(KeyError::BadLength(_, 7))));
    }

    #[test]
    fn test_separator_in_username_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());

        assert!(matches!(
            store.get("../evil"),
            Err(KeyError::InvalidUser(_))
        ));
        assert!(matches!(store.create("a/b"), Err(KeyError::InvalidUser(_))));
    }

    #[test]
    fn test_keys_differ_between_users() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());

        let a = store.create("alice").unwrap();
        let b = store.create("bob").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[tokio::test]
    async fn test_ensure_for_is_stable() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());

        let first = store.ensure_for("alice").await.unwrap();
        let second = store.ensure_for("alice").await.unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[tokio::test]
    async fn test_concurrent_first_login_single_key() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(KeyStore::new(tmp.path()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.ensure_for("alice").await },
            ));
        }

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap().unwrap());
        }

        let reference = keys[0].as_bytes();
        assert!(keys.iter().all(|k| k.as_bytes() == reference));

        // Exactly one key file on disk, matching what every caller saw
        let on_disk = std::fs::read(tmp.path().join("alice.key")).unwrap();
        assert_eq!(on_disk.as_slice(), reference);
    }
}
