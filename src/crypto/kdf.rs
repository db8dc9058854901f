use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{KEY_LEN, SALT_LEN, generate_salt};
use crate::error::{Result, VaultError};

/// Lowest iteration count accepted for either derivation.
pub const MIN_ITERATIONS: u32 = 1_000;

/// PBKDF2-HMAC-SHA256 iteration counts.
///
/// `iterations` produces the auth and field keys, `file_iterations` the
/// file key. The two must differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    iterations: u32,
    file_iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            file_iterations: 150_000,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32, file_iterations: u32) -> Result<Self> {
        let params = Self {
            iterations,
            file_iterations,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn file_iterations(&self) -> u32 {
        self.file_iterations
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations < MIN_ITERATIONS || self.file_iterations < MIN_ITERATIONS {
            return Err(VaultError::InvalidConfig(format!(
                "pbkdf2 iterations must be >= {MIN_ITERATIONS}"
            )));
        }
        if self.iterations == self.file_iterations {
            return Err(VaultError::InvalidConfig(
                "file key iterations must differ from field key iterations".into(),
            ));
        }
        Ok(())
    }
}

/// Keys for one unlocked session. Zeroized as a whole on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeySet {
    auth_key: [u8; KEY_LEN],
    field_key: [u8; KEY_LEN],
    file_key: [u8; KEY_LEN],
}

impl DerivedKeySet {
    /// Key whose encoding is stored as the master password hash.
    pub fn auth_key(&self) -> &[u8; KEY_LEN] {
        &self.auth_key
    }

    pub fn field_key(&self) -> &[u8; KEY_LEN] {
        &self.field_key
    }

    pub fn file_key(&self) -> &[u8; KEY_LEN] {
        &self.file_key
    }
}

impl std::fmt::Debug for DerivedKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKeySet(..)")
    }
}

/// Derives the session keys from a passphrase.
///
/// A fresh salt is generated when `salt` is `None`. The auth and field keys
/// are the two PBKDF2 output blocks of a single 64-byte derivation, the file
/// key is a separate derivation with a different iteration count.
pub fn derive(
    passphrase: &[u8],
    salt: Option<[u8; SALT_LEN]>,
    kdf: KdfParams,
) -> Result<(DerivedKeySet, [u8; SALT_LEN])> {
    kdf.validate()?;

    let salt = match salt {
        Some(salt) => salt,
        None => generate_salt()?,
    };

    let mut okm = Zeroizing::new([0u8; 2 * KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase, &salt, kdf.iterations, okm.as_mut());

    let mut keys = DerivedKeySet {
        auth_key: [0u8; KEY_LEN],
        field_key: [0u8; KEY_LEN],
        file_key: [0u8; KEY_LEN],
    };
    keys.auth_key.copy_from_slice(&okm[..KEY_LEN]);
    keys.field_key.copy_from_slice(&okm[KEY_LEN..]);
    pbkdf2_hmac::<Sha256>(passphrase, &salt, kdf.file_iterations, &mut keys.file_key);

    Ok((keys, salt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(1_000, 1_500).unwrap()
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; SALT_LEN];

        let (k1, s1) = derive(b"password", Some(salt), fast()).unwrap();
        let (k2, s2) = derive(b"password", Some(salt), fast()).unwrap();

        assert_eq!(s1, s2);
        assert_eq!(k1.auth_key(), k2.auth_key());
        assert_eq!(k1.field_key(), k2.field_key());
        assert_eq!(k1.file_key(), k2.file_key());
    }

    #[test]
    fn keys_are_domain_separated() {
        let (keys, _) = derive(b"pw", Some([7u8; SALT_LEN]), fast()).unwrap();

        assert_ne!(keys.auth_key(), keys.field_key());
        assert_ne!(keys.auth_key(), keys.file_key());
        assert_ne!(keys.field_key(), keys.file_key());
    }

    #[test]
    fn missing_salt_is_generated() {
        let (k1, s1) = derive(b"pw", None, fast()).unwrap();
        let (k2, s2) = derive(b"pw", None, fast()).unwrap();

        assert_ne!(s1, s2);
        assert_ne!(k1.auth_key(), k2.auth_key());
    }

    #[test]
    fn matches_pbkdf2_reference() {
        // auth key is the first 32-byte block of the combined derivation
        let mut expected = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(b"passwd", &[0x73; SALT_LEN], 1_000, &mut expected);

        let (keys, _) = derive(b"passwd", Some([0x73; SALT_LEN]), fast()).unwrap();
        assert_eq!(keys.auth_key(), &expected);
    }

    #[test]
    fn kdf_params_affect_output() {
        let salt = [7u8; SALT_LEN];

        let (k1, _) = derive(b"pw", Some(salt), fast()).unwrap();
        let (k2, _) = derive(b"pw", Some(salt), KdfParams::new(2_000, 1_500).unwrap()).unwrap();

        assert_ne!(k1.auth_key(), k2.auth_key());
        assert_eq!(k1.file_key(), k2.file_key());
    }

    #[test]
    fn kdf_invalid_params_fail_gracefully() {
        assert!(KdfParams::new(0, 0).is_err());
        assert!(KdfParams::new(5_000, 5_000).is_err());
        assert!(KdfParams::new(100, 150_000).is_err());
    }

    #[test]
    fn default_params_are_valid() {
        let kdf = KdfParams::default();
        assert_eq!(kdf.iterations(), 100_000);
        assert_eq!(kdf.file_iterations(), 150_000);
        assert!(kdf.validate().is_ok());
    }
}
