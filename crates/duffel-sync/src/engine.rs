//! Transfer pipelines: codec + key lookup + storage, composed per call.
//!
//! The engine is stateless across calls; the RPC surface owns the stream
//! loops and hands fully-buffered wire bytes in (upload) or slices wire
//! bytes out (download). Nothing reaches disk unless every stage before the
//! write succeeds, so a failed upload leaves the namespace untouched.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use duffel_crypto::{codec, CodecError, KeyError, KeyStore, UserKey};

use crate::store::{StoreError, UserStore};

/// Frame payload size for server-streaming downloads.
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("key lookup: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

pub struct TransferEngine {
    store: Arc<UserStore>,
    keys: Arc<KeyStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<UserStore>, keys: Arc<KeyStore>) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    /// Fetch the user's at-rest key. Handlers resolve this before consuming
    /// any frames; a miss after login is a server-side invariant violation.
    pub fn user_key(&self, username: &str) -> Result<UserKey, EngineError> {
        Ok(self.keys.get(username)?)
    }

    /// Commit one fully-received upload: decompress the wire bytes, encrypt
    /// under the user's key, atomically replace the stored object. Returns
    /// the plaintext size.
    pub fn commit_upload(
        &self,
        username: &str,
        name: &str,
        key: &UserKey,
        compressed: &[u8],
    ) -> Result<u64, EngineError> {
        let plain = codec::decompress(compressed)?;
        let cipher = codec::encrypt(&plain, key.as_bytes())?;
        self.store.write(username, name, &cipher)?;

        debug!(
            user = username,
            file = name,
            bytes = plain.len(),
            "upload committed"
        );
        Ok(plain.len() as u64)
    }

    /// Produce the wire bytes for a download: read the stored object,
    /// decrypt, recompress.
    pub fn prepare_download(&self, username: &str, name: &str) -> Result<Vec<u8>, EngineError> {
        let key = self.keys.get(username)?;
        let cipher = self.store.read(username, name)?;
        let plain = codec::decrypt(&cipher, key.as_bytes())?;
        let compressed = codec::compress(&plain)?;

        debug!(
            user = username,
            file = name,
            bytes = plain.len(),
            wire_bytes = compressed.len(),
            "download prepared"
        );
        Ok(compressed)
    }

    pub fn delete(&self, username: &str, name: &str) -> Result<(), EngineError> {
        self.store.delete(username, name)?;
        debug!(user = username, file = name, "file deleted");
        Ok(())
    }

    pub fn list(&self, username: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.store.list(username)?)
    }
}
