use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroizing;

use super::{NONCE_LEN, secure_random};
use crate::error::{Result, VaultError};
use crate::session::Session;

/// Authenticated encryption of single secret values.
///
/// The stored form is `base64(nonce || ciphertext || tag)`, so it fits the
/// TEXT column of the `passwords` table.
pub struct FieldCipher {
    cipher: XChaCha20Poly1305,
}

impl FieldCipher {
    /// Builds a cipher keyed with the session's field key.
    pub fn new(session: &Session) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(session.keys().field_key())),
        }
    }

    /// Encrypt plaintext
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        secure_random(&mut nonce)?;

        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| VaultError::CryptoIntegrity("field encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt ciphertext
    pub fn decrypt(&self, encoded: &str) -> Result<Zeroizing<String>> {
        let blob = STANDARD
            .decode(encoded)
            .map_err(|_| VaultError::CryptoIntegrity("malformed field ciphertext".into()))?;

        if blob.len() < NONCE_LEN {
            return Err(VaultError::CryptoIntegrity("field ciphertext too short".into()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::CryptoIntegrity("invalid key or corrupted field".into()))?;

        String::from_utf8(plaintext).map(Zeroizing::new).map_err(|e| {
            let mut bytes = e.into_bytes();
            zeroize::Zeroize::zeroize(&mut bytes);
            VaultError::CryptoIntegrity("field plaintext is not valid UTF-8".into())
        })
    }
}
