//! Credential verification.
//!
//! The daemon only ever asks "does (username, password) check out". The
//! trait keeps that boundary abstract so a real backing store can be swapped
//! in behind it; the shipped implementation reads the static `[auth.users]`
//! table from the config file.

use std::collections::BTreeMap;

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Config-backed credential table.
pub struct StaticCredentials {
    users: BTreeMap<String, String>,
}

impl StaticCredentials {
    pub fn new(users: BTreeMap<String, String>) -> Self {
        Self { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(expected) => ct_eq(expected.as_bytes(), password.as_bytes()),
            None => false,
        }
    }
}

/// Constant-time byte comparison; length mismatch short-circuits.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> StaticCredentials {
        let mut users = BTreeMap::new();
        users.insert("alice".to_string(), "pw".to_string());
        users.insert("bob".to_string(), "hunter2".to_string());
        StaticCredentials::new(users)
    }

    #[test]
    fn test_accepts_known_pair() {
        assert!(verifier().verify("alice", "pw"));
        assert!(verifier().verify("bob", "hunter2"));
    }

    #[test]
    fn test_rejects_wrong_password() {
        assert!(!verifier().verify("alice", "wrong"));
        assert!(!verifier().verify("alice", ""));
        assert!(!verifier().verify("alice", "pw "));
    }

    #[test]
    fn test_rejects_unknown_user() {
        assert!(!verifier().verify("mallory", "pw"));
    }

    #[test]
    fn test_empty_table_rejects_everything() {
        let empty = StaticCredentials::new(BTreeMap::new());
        assert!(empty.is_empty());
        assert!(!empty.verify("alice", "pw"));
    }
}
