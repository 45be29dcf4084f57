//! Gzip compression and AES-256-CFB encryption/decryption
//!
//! Encrypted file format (binary):
//! ```text
//! [16 bytes: random IV][N bytes: CFB ciphertext]
//! ```
//!
//! CFB is a stream mode: the ciphertext is exactly as long as the plaintext,
//! so a stored file is always `IV_SIZE + plaintext_len` bytes. It carries no
//! authentication tag; corruption is only detected downstream (gzip or the
//! consumer).

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::Aes256;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::RngCore;
use std::io::{Read, Write};
use thiserror::Error;

use crate::{IV_SIZE, KEY_SIZE};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("key must be {KEY_SIZE} bytes, got {0}")]
    BadKey(usize),

    #[error("ciphertext shorter than the {IV_SIZE}-byte IV: {0} bytes")]
    MalformedCipher(usize),

    #[error("gzip: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Gzip-compress `data` at the default level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a gzip stream produced by [`compress`] (or any gzip encoder).
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Encrypt `plain` under a 32-byte key.
///
/// Returns `[16-byte random IV][CFB ciphertext]`. A fresh IV is drawn per
/// call, so encrypting the same plaintext twice yields different bytes.
pub fn encrypt(plain: &[u8], key: &[u8]) -> Result<Vec<u8>, CodecError> {
    if key.len() != KEY_SIZE {
        return Err(CodecError::BadKey(key.len()));
    }

    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut out = Vec::with_capacity(IV_SIZE + plain.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(plain);

    let enc =
        Aes256CfbEnc::new_from_slices(key, &iv).map_err(|_| CodecError::BadKey(key.len()))?;
    enc.encrypt(&mut out[IV_SIZE..]);
    Ok(out)
}

/// Decrypt the output of [`encrypt`]: splits off the leading IV and
/// CFB-decrypts the remainder.
pub fn decrypt(cipher: &[u8], key: &[u8]) -> Result<Vec<u8>, CodecError> {
    if key.len() != KEY_SIZE {
        return Err(CodecError::BadKey(key.len()));
    }
    if cipher.len() < IV_SIZE {
        return Err(CodecError::MalformedCipher(cipher.len()));
    }

    let (iv, body) = cipher.split_at(IV_SIZE);
    let mut out = body.to_vec();

    let dec = Aes256CfbDec::new_from_slices(key, iv).map_err(|_| CodecError::BadKey(key.len()))?;
    dec.decrypt(&mut out);
    Ok(out)
}
