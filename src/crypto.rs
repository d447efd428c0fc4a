//! Encryption Capability
//!
//! The real cipher runs on an external engine and is out of scope here;
//! the command layer only consumes an `encrypt(bytes) -> blob` /
//! `decrypt(bytes) -> blob` capability. This trait is that seam, with a
//! passthrough implementation for deployments without the engine.

use std::io;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors surfaced by a crypto backend.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The backend rejected or failed the operation.
    #[error("crypto backend error: {0}")]
    Backend(String),

    /// I/O toward the backend failed.
    #[error("crypto I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An interchangeable encryption backend.
pub trait Crypto: Send + Sync {
    /// Encrypts plaintext into a storable blob.
    fn encrypt(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypts a stored blob back into plaintext.
    fn decrypt(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Passthrough backend: stores blobs as-is. Stands in for the hardware
/// engine on platforms that lack it.
#[derive(Debug, Default)]
pub struct NullCrypto;

impl Crypto for NullCrypto {
    fn encrypt(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}
