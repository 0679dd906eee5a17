//! Authenticated encryption for secrets carried inside the session token.
//!
//! Blobs are `nonce (12 bytes) || tag (16 bytes) || ciphertext`, base64 encoded
//! as a single string. Every call draws a fresh random nonce, so encrypting the
//! same plaintext twice never yields the same blob, and any bit flip in a stored
//! blob fails authentication instead of decrypting to garbage.

use base64ct::{Base64, Encoding};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use thiserror::Error;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("encryption key is not valid base64")]
    Encoding,
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    Length(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecryptionError {
    #[error("ciphertext is not valid base64")]
    Encoding,
    #[error("ciphertext is too short")]
    Truncated,
    #[error("ciphertext failed authentication")]
    Authentication,
    #[error("plaintext is not valid utf-8")]
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("encryption failed")]
pub struct EncryptionError;

/// Symmetric cipher bound to a single static 256-bit key.
#[derive(Clone)]
pub struct Cipher {
    aead: ChaCha20Poly1305,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Build a cipher from raw key bytes.
    ///
    /// # Errors
    /// Returns `KeyError::Length` unless the key is exactly 32 bytes.
    #[allow(deprecated)]
    pub fn new(key: &[u8]) -> Result<Self, KeyError> {
        if key.len() != KEY_LEN {
            return Err(KeyError::Length(key.len()));
        }

        Ok(Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key)),
        })
    }

    /// Decode a base64 key and build the cipher. Meant to run once at startup.
    ///
    /// # Errors
    /// Returns `KeyError` if the key is not base64 or not 32 bytes long.
    pub fn from_base64_key(key: &SecretString) -> Result<Self, KeyError> {
        let bytes =
            Base64::decode_vec(key.expose_secret().trim()).map_err(|_| KeyError::Encoding)?;
        Self::new(&bytes)
    }

    /// Encrypt a UTF-8 secret into a base64 blob.
    ///
    /// # Errors
    /// Returns `EncryptionError` if the OS random source or the AEAD fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        Ok(Base64::encode_string(&self.encrypt_raw(plaintext.as_bytes())?))
    }

    /// Encrypt into the raw `nonce || tag || ciphertext` layout, leaving the
    /// text encoding to the caller.
    ///
    /// # Errors
    /// Returns `EncryptionError` if the OS random source or the AEAD fails.
    #[allow(deprecated)]
    pub fn encrypt_raw(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|_| EncryptionError)?;

        let mut buffer = plaintext.to_vec();
        let tag = self
            .aead
            .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), b"", &mut buffer)
            .map_err(|_| EncryptionError)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&buffer);

        Ok(blob)
    }

    /// Decrypt a blob produced by [`Cipher::encrypt`].
    ///
    /// # Errors
    /// Returns `DecryptionError` on malformed input, tampering, or a wrong key.
    pub fn decrypt(&self, blob: &str) -> Result<String, DecryptionError> {
        let raw = Base64::decode_vec(blob).map_err(|_| DecryptionError::Encoding)?;
        self.decrypt_raw(&raw)
    }

    /// Decrypt a raw blob produced by [`Cipher::encrypt_raw`].
    ///
    /// # Errors
    /// Returns `DecryptionError` on truncation, tampering, or a wrong key.
    #[allow(deprecated)]
    pub fn decrypt_raw(&self, raw: &[u8]) -> Result<String, DecryptionError> {
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(DecryptionError::Truncated);
        }

        let (nonce_bytes, rest) = raw.split_at(NONCE_LEN);
        let (tag_bytes, ciphertext) = rest.split_at(TAG_LEN);

        let mut buffer = ciphertext.to_vec();
        self.aead
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce_bytes),
                b"",
                &mut buffer,
                Tag::from_slice(tag_bytes),
            )
            .map_err(|_| DecryptionError::Authentication)?;

        String::from_utf8(buffer).map_err(|_| DecryptionError::Utf8)
    }
}
