//! Key material of one unlocked session.

use crate::crypto::{self, DerivedKeySet, FieldCipher, KdfParams, SALT_LEN};
use crate::error::Result;

/// Holds the derived keys while the vault is unlocked.
///
/// Components receive the session by reference; dropping it zeroizes all
/// three keys together.
#[derive(Debug)]
pub struct Session {
    keys: DerivedKeySet,
    salt: [u8; SALT_LEN],
}

impl Session {
    pub(crate) fn new(keys: DerivedKeySet, salt: [u8; SALT_LEN]) -> Self {
        Self { keys, salt }
    }

    /// Derives a session directly from a passphrase and salt.
    pub fn derive(passphrase: &[u8], salt: Option<[u8; SALT_LEN]>, kdf: KdfParams) -> Result<Self> {
        let (keys, salt) = crypto::derive(passphrase, salt, kdf)?;
        Ok(Self::new(keys, salt))
    }

    pub fn keys(&self) -> &DerivedKeySet {
        &self.keys
    }

    /// Salt the keys were derived from.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn field_cipher(&self) -> FieldCipher {
        FieldCipher::new(self)
    }
}
