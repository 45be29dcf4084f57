//! Request authentication: token extraction from call metadata.

use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};

use crate::token::{TokenError, TokenService};

/// Metadata key carrying the raw access token (no bearer prefix).
pub const AUTHORIZATION_KEY: &str = "authorization";

/// Resolves the authenticated username for a call.
///
/// Every RPC except `Login` and `RefreshToken` starts here; handlers resolve
/// the username exactly once and abort before any I/O when it fails.
#[derive(Clone)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    pub fn username_of<T>(&self, request: &Request<T>) -> Result<String, Status> {
        self.username_from_metadata(request.metadata())
    }

    pub fn username_from_metadata(&self, metadata: &MetadataMap) -> Result<String, Status> {
        // Single value expected; `get` takes the first if several were sent
        let value = metadata
            .get(AUTHORIZATION_KEY)
            .ok_or_else(|| Status::unauthenticated("missing authorization token"))?;
        let token = value
            .to_str()
            .map_err(|_| Status::unauthenticated("authorization token is not valid ASCII"))?;

        let claims = self.tokens.validate(token).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            match e {
                TokenError::Expired => Status::unauthenticated("token expired"),
                TokenError::BadSignature | TokenError::Malformed => {
                    Status::unauthenticated("invalid token")
                }
            }
        })?;

        Ok(claims.username)
    }
}
