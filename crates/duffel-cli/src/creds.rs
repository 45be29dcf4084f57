//! Client-side credential persistence.
//!
//! Login and refresh write the current token pair to a small JSON file
//! (default `credentials.json`); authenticated commands load it back. The
//! file holds bearer tokens, so it is written with owner-only permissions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub refresh_token: String,
}

pub fn save(path: &Path, creds: &Credentials) -> Result<()> {
    let json = serde_json::to_string_pretty(creds)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing credentials to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

pub fn load(path: &Path) -> Result<Credentials> {
    let json = std::fs::read_to_string(path).with_context(|| {
        format!(
            "no credentials at {} (run `duffel login` first)",
            path.display()
        )
    })?;
    serde_json::from_str(&json)
        .with_context(|| format!("parsing credentials file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");

        let creds = Credentials {
            token: "access-token".into(),
            refresh_token: "refresh-token".into(),
        };
        save(&path, &creds).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.token, "access-token");
        assert_eq!(loaded.refresh_token, "refresh-token");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_missing_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(load(&tmp.path().join("nope.json")).is_err());
    }
}
