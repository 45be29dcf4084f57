//! duffel-auth: bearer-token authentication
//!
//! Tokens are compact HS256 JWTs carrying a single claim pair
//! `{username, exp}`, signed under a process-wide secret. Two lifetimes share
//! the format: short-lived access tokens authenticate every RPC, long-lived
//! refresh tokens only mint new pairs. There is no revocation list; logout is
//! client-side token drop.

pub mod gate;
pub mod token;
pub mod verify;

pub use gate::AuthGate;
pub use token::{Claims, TokenError, TokenService};
pub use verify::{CredentialVerifier, StaticCredentials};
