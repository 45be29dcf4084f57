use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level daemon configuration (loaded from duffel.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuffelConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub bus: BusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen address for gRPC (default: 0.0.0.0:50051)
    pub listen: String,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for per-user ciphertext namespaces
    pub root: PathBuf,
    /// Root directory for per-user key files
    pub keys_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for token signing. The DUFFEL_TOKEN_SECRET environment
    /// variable overrides this; the daemon refuses to start with neither set.
    pub secret: Option<String>,
    /// Access token lifetime in seconds (default: 1 hour)
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds (default: 7 days)
    pub refresh_ttl_secs: u64,
    /// Static credential table: username → password
    pub users: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-subscriber event queue capacity; a subscriber that lags past
    /// this many events loses the oldest ones (default: 256)
    pub capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:50051".into(),
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
            keys_root: PathBuf::from("./keys"),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            access_ttl_secs: 3600,
            refresh_ttl_secs: 7 * 24 * 3600,
            users: BTreeMap::new(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:6000"
log_level = "debug"
log_format = "json"

[storage]
root = "/var/lib/duffel/storage"
keys_root = "/var/lib/duffel/keys"

[auth]
secret = "not-for-production"
access_ttl_secs = 600
refresh_ttl_secs = 86400

[auth.users]
alice = "pw-a"
bob = "pw-b"

[bus]
capacity = 64
"#;
        let config: DuffelConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:6000");
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.log_format, "json");
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/duffel/storage"));
        assert_eq!(config.storage.keys_root, PathBuf::from("/var/lib/duffel/keys"));
        assert_eq!(config.auth.secret.as_deref(), Some("not-for-production"));
        assert_eq!(config.auth.access_ttl_secs, 600);
        assert_eq!(config.auth.refresh_ttl_secs, 86400);
        assert_eq!(config.auth.users.get("alice").map(String::as_str), Some("pw-a"));
        assert_eq!(config.auth.users.len(), 2);
        assert_eq!(config.bus.capacity, 64);
    }

    #[test]
    fn test_parse_defaults() {
        let config: DuffelConfig = toml::from_str("").unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:50051");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.log_format, "text");
        assert_eq!(config.storage.root, PathBuf::from("./storage"));
        assert_eq!(config.storage.keys_root, PathBuf::from("./keys"));
        assert!(config.auth.secret.is_none());
        assert_eq!(config.auth.access_ttl_secs, 3600);
        assert_eq!(config.auth.refresh_ttl_secs, 604800);
        assert!(config.auth.users.is_empty());
        assert_eq!(config.bus.capacity, 256);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[storage]
root = "/srv/duffel"
"#;
        let config: DuffelConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.storage.root, PathBuf::from("/srv/duffel"));
        // Defaults
        assert_eq!(config.storage.keys_root, PathBuf::from("./keys"));
        assert_eq!(config.server.listen, "0.0.0.0:50051");
        assert_eq!(config.auth.access_ttl_secs, 3600);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = DuffelConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DuffelConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.server.listen, parsed.server.listen);
        assert_eq!(config.storage.root, parsed.storage.root);
        assert_eq!(config.auth.refresh_ttl_secs, parsed.auth.refresh_ttl_secs);
        assert_eq!(config.bus.capacity, parsed.bus.capacity);
    }
}
