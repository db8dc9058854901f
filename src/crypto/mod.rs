//! Cryptographic primitives for the vault.
//!
//! Provides key derivation, per-field authenticated encryption and the
//! whole-file cipher used while the vault is locked.

pub mod aead;
pub mod file;
pub mod kdf;

use crate::error::{Result, VaultError};

pub use aead::FieldCipher;
pub use file::{EncryptedVaultFile, VaultFileCipher};
pub use kdf::{DerivedKeySet, KdfParams, derive};

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of each derived key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the XChaCha20-Poly1305 nonce (24 bytes).
pub const NONCE_LEN: usize = 24;
/// Length of the AES-CBC initialization vector (16 bytes).
pub const IV_LEN: usize = 16;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| {
        VaultError::from(std::io::Error::other(format!(
            "OS random generator unavailable: {e}"
        )))
    })
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Compares two byte slices without short-circuiting on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
