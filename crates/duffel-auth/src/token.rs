//! HS256 token issuance and validation.
//!
//! ## Token format
//!
//! Compact JWT: `b64url(header) . b64url(claims) . b64url(signature)` where
//! the header is fixed `{"alg":"HS256","typ":"JWT"}`, the claims are
//! `{"username": ..., "exp": <unix seconds>}`, and the signature is
//! HMAC-SHA256 over the first two segments.
//!
//! Validation order: signature, then header algorithm, then claims, then
//! expiry. A token with `exp <= now` is expired.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token expired")]
    Expired,
}

/// The claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub username: String,
    pub exp: u64,
}

/// Issues and validates signed bearer tokens.
pub struct TokenService {
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Short-lived token authenticating each RPC.
    pub fn issue_access(&self, username: &str) -> String {
        self.issue(username, self.access_ttl)
    }

    /// Long-lived token used only to mint new pairs.
    pub fn issue_refresh(&self, username: &str) -> String {
        self.issue(username, self.refresh_ttl)
    }

    /// Sign `{username, exp = now + ttl}`.
    pub fn issue(&self, username: &str, ttl: Duration) -> String {
        let claims = Claims {
            username: username.to_string(),
            exp: now_secs() + ttl.as_secs(),
        };
        let claims_json = serde_json::to_string(&claims).expect("claims are serializable");

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER_JSON),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));

        format!("{signing_input}.{signature}")
    }

    /// Verify signature and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, sig_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(TokenError::Malformed),
            };

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let header_raw = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed)?;
        let header: serde_json::Value =
            serde_json::from_slice(&header_raw).map_err(|_| TokenError::Malformed)?;
        if header.get("alg").and_then(|v| v.as_str()) != Some("HS256") {
            return Err(TokenError::BadSignature);
        }

        let claims_raw = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_raw).map_err(|_| TokenError::Malformed)?;
        if claims.username.is_empty() {
            return Err(TokenError::Malformed);
        }
        if claims.exp <= now_secs() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            "test-secret",
            Duration::from_secs(3600),
            Duration::from_secs(7 * 24 * 3600),
        )
    }

    #[test]
    fn test_issue_and_validate() {
        let svc = service();
        let token = svc.issue_access("alice");

        let claims = svc.validate(&token).unwrap();
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > now_secs());
    }

    #[test]
    fn test_refresh_outlives_access() {
        let svc = service();
        let access = svc.validate(&svc.issue_access("alice")).unwrap();
        let refresh = svc.validate(&svc.issue_refresh("alice")).unwrap();
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_expired_rejected() {
        let svc = service();
        // ttl 0 → exp == now → rejected (exp <= now)
        let token = svc.issue("alice", Duration::from_secs(0));
        assert_eq!(svc.validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let svc = service();
        let mut token = svc.issue_access("alice");
        // Flip the last signature character
        let flipped = if token.ends_with('A') { 'B' } else { 'A' };
        token.pop();
        token.push(flipped);

        assert_eq!(svc.validate(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let svc = service();
        let token = svc.issue_access("alice");
        let mut parts: Vec<&str> = token.split('.').collect();

        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_string(&Claims {
                username: "mallory".into(),
                exp: now_secs() + 3600,
            })
            .unwrap(),
        );
        parts[1] = &forged_claims;

        assert_eq!(
            svc.validate(&parts.join(".")),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let svc = service();
        let other = TokenService::new(
            "other-secret",
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );

        let token = other.issue_access("alice");
        assert_eq!(svc.validate(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let svc = service();
        assert_eq!(svc.validate(""), Err(TokenError::Malformed));
        assert_eq!(svc.validate("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(svc.validate("a.b"), Err(TokenError::Malformed));
        assert_eq!(svc.validate("a.b.c.d"), Err(TokenError::Malformed));
        assert_eq!(svc.validate("!!!.???.###"), Err(TokenError::Malformed));
    }
}
