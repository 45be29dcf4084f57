//! duffel-crypto: the transfer codec and per-user key storage
//!
//! Files cross the wire gzip-compressed and rest on disk encrypted:
//!
//! ```text
//! wire:    gzip(plaintext), sliced into frames
//! at rest: [16-byte random IV][AES-256-CFB ciphertext]
//! ```
//!
//! The two transforms are never merged: encryption always operates on the
//! decompressed plaintext, so the at-rest format is independent of gzip
//! settings.

pub mod codec;
pub mod keystore;

pub use codec::{compress, decompress, decrypt, encrypt, CodecError};
pub use keystore::{KeyError, KeyStore, UserKey};

/// Size of a per-user key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Size of the CFB initialization vector (one AES block)
pub const IV_SIZE: usize = 16;
