//! Flat per-user file namespace on disk.
//!
//! Layout: `<storage_root>/<username>/<name>.enc`. The `.enc` suffix is
//! appended by the store and never by callers; `list` returns names as
//! stored, i.e. with the suffix. User directories are created lazily on
//! first write. Writes are atomic replaces, so same-name races resolve to
//! last-writer-wins without cross-call locking.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix every stored object carries on disk.
pub const ENC_SUFFIX: &str = ".enc";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file {0:?} not found")]
    NotFound(String),

    #[error("invalid filename: {0:?}")]
    InvalidName(String),

    #[error("invalid username: {0:?}")]
    InvalidUser(String),

    #[error("storage: {0}")]
    Io(#[from] std::io::Error),
}

/// Reduce a wire filename to its base component, as taken from the first
/// upload frame. Returns `None` for empty names and names with no base
/// (`"."`, `".."`, trailing separators).
pub fn base_name(name: &str) -> Option<&str> {
    Path::new(name).file_name()?.to_str()
}

pub struct UserStore {
    root: PathBuf,
}

impl UserStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, username: &str) -> Result<PathBuf, StoreError> {
        if username.is_empty()
            || username == "."
            || username == ".."
            || username.contains(std::path::is_separator)
        {
            return Err(StoreError::InvalidUser(username.to_string()));
        }
        Ok(self.root.join(username))
    }

    fn object_path(&self, username: &str, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(std::path::is_separator)
        {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.user_dir(username)?.join(format!("{name}{ENC_SUFFIX}")))
    }

    /// Entries of the user's directory, as stored (with `.enc`), excluding
    /// subdirectories. A user who has never written lists as empty.
    pub fn list(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.user_dir(username)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn read(&self, username: &str, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(username, name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic replace of `<name>.enc`; `bytes` are already-encrypted.
    pub fn write(&self, username: &str, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.object_path(username, name)?;
        let dir = self.user_dir(username)?;
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    pub fn delete(&self, username: &str, name: &str) -> Result<(), StoreError> {
        let path = self.object_path(username, name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("hello.txt"), Some("hello.txt"));
        assert_eq!(base_name("a/b/hello.txt"), Some("hello.txt"));
        assert_eq!(base_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(base_name(""), None);
        assert_eq!(base_name(".."), None);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        store.write("alice", "hello.txt", b"cipherbytes").unwrap();
        assert_eq!(store.read("alice", "hello.txt").unwrap(), b"cipherbytes");

        // Stored with the .enc suffix, under the user directory
        assert!(tmp.path().join("alice/hello.txt.enc").exists());
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        assert!(matches!(
            store.read("alice", "ghost.txt"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_as_stored_sorted() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        store.write("alice", "b.txt", b"b").unwrap();
        store.write("alice", "a.txt", b"a").unwrap();

        assert_eq!(
            store.list("alice").unwrap(),
            vec!["a.txt.enc".to_string(), "b.txt.enc".to_string()]
        );
    }

    #[test]
    fn test_list_unknown_user_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        assert!(store.list("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_list_excludes_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        store.write("alice", "f.txt", b"x").unwrap();
        std::fs::create_dir(tmp.path().join("alice/subdir")).unwrap();

        assert_eq!(store.list("alice").unwrap(), vec!["f.txt.enc".to_string()]);
    }

    #[test]
    fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        store.write("alice", "f.txt", b"x").unwrap();
        store.delete("alice", "f.txt").unwrap();

        assert!(store.list("alice").unwrap().is_empty());
        assert!(matches!(
            store.delete("alice", "f.txt"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_separator_names_rejected_without_mutation() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        assert!(matches!(
            store.write("alice", "a/b.txt", b"x"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            store.read("alice", "../b.txt"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            store.delete("alice", "x/../y"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            store.write("alice", "", b"x"),
            Err(StoreError::InvalidName(_))
        ));

        // Nothing was created, not even the user directory
        assert!(!tmp.path().join("alice").exists());
    }

    #[test]
    fn test_bad_username_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        assert!(matches!(
            store.write("../alice", "f.txt", b"x"),
            Err(StoreError::InvalidUser(_))
        ));
        assert!(matches!(store.list(""), Err(StoreError::InvalidUser(_))));
    }

    #[test]
    fn test_unicode_names_preserved() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        store.write("alice", "café übersicht.txt", b"unicode").unwrap();
        assert_eq!(
            store.list("alice").unwrap(),
            vec!["café übersicht.txt.enc".to_string()]
        );
        assert_eq!(
            store.read("alice", "café übersicht.txt").unwrap(),
            b"unicode"
        );
    }

    #[test]
    fn test_same_name_last_writer_wins() {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::new(tmp.path());

        store.write("alice", "f.txt", b"first").unwrap();
        store.write("alice", "f.txt", b"second").unwrap();

        assert_eq!(store.read("alice", "f.txt").unwrap(), b"second");
        assert_eq!(store.list("alice").unwrap().len(), 1);
    }
}
