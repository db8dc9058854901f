//! Whole-file encryption of the working store while the vault is locked.
//!
//! On-disk format:
//! ```text
//! IV (16) | AES-256-CBC ciphertext, PKCS#7 padded
//! ```
//! The encrypted payload is `SHA-256(plaintext) || plaintext`; the digest is
//! checked after unpadding so a wrong key is always detected.

use std::path::{Path, PathBuf};

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{IV_LEN, KEY_LEN, constant_time_eq, secure_random};
use crate::erase;
use crate::error::{Result, VaultError};
use crate::session::Session;
use crate::storage::Storage;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const DIGEST_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

/// Parsed form of the encrypted vault file.
#[derive(Debug)]
pub struct EncryptedVaultFile {
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedVaultFile {
    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.iv);
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < IV_LEN + BLOCK_LEN {
            return Err(VaultError::CryptoIntegrity("vault file too short".into()));
        }

        let (iv, ciphertext) = data.split_at(IV_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(VaultError::CryptoIntegrity(
                "vault ciphertext is not block aligned".into(),
            ));
        }

        let mut parsed = Self {
            iv: [0u8; IV_LEN],
            ciphertext: ciphertext.to_vec(),
        };
        parsed.iv.copy_from_slice(iv);
        Ok(parsed)
    }

    /// Encrypts `plaintext` under `key` with a fresh random IV.
    pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Self> {
        let mut iv = [0u8; IV_LEN];
        secure_random(&mut iv)?;

        let mut framed = Zeroizing::new(Vec::with_capacity(DIGEST_LEN + plaintext.len()));
        framed.extend_from_slice(&Sha256::digest(plaintext));
        framed.extend_from_slice(plaintext);

        let ciphertext = Aes256CbcEnc::new(key.into(), (&iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(&framed);

        Ok(Self { iv, ciphertext })
    }

    /// Decrypts, strips the padding and verifies the embedded digest.
    pub fn open(&self, key: &[u8; KEY_LEN]) -> Result<Zeroizing<Vec<u8>>> {
        let framed = Zeroizing::new(
            Aes256CbcDec::new(key.into(), (&self.iv).into())
                .decrypt_padded_vec_mut::<Pkcs7>(&self.ciphertext)
                .map_err(|_| VaultError::CryptoIntegrity("invalid vault padding".into()))?,
        );

        if framed.len() < DIGEST_LEN {
            return Err(VaultError::CryptoIntegrity("vault payload too short".into()));
        }
        let (digest, plaintext) = framed.split_at(DIGEST_LEN);

        if !constant_time_eq(digest, &Sha256::digest(plaintext)) {
            return Err(VaultError::CryptoIntegrity("vault digest mismatch".into()));
        }

        Ok(Zeroizing::new(plaintext.to_vec()))
    }
}

/// Moves the vault between the plaintext working store and its encrypted
/// at-rest form.
#[derive(Debug, Clone)]
pub struct VaultFileCipher {
    working: PathBuf,
    encrypted: Storage,
}

impl VaultFileCipher {
    pub fn new(working: impl Into<PathBuf>, encrypted: impl Into<PathBuf>) -> Self {
        Self {
            working: working.into(),
            encrypted: Storage::new(encrypted),
        }
    }

    pub fn working_path(&self) -> &Path {
        &self.working
    }

    pub fn encrypted_path(&self) -> &Path {
        self.encrypted.path()
    }

    /// Encrypts the working store and securely erases it.
    ///
    /// The encrypted file is fully written and renamed into place before the
    /// working store is touched.
    pub fn lock(&self, session: &Session) -> Result<()> {
        let plaintext = Zeroizing::new(std::fs::read(&self.working)?);
        let sealed = EncryptedVaultFile::seal(session.keys().file_key(), &plaintext)?;

        self.encrypted.save(&sealed.to_bytes())?;
        debug!(path = %self.encrypted.path().display(), "encrypted vault written");

        erase::wipe(&self.working)?;
        info!("vault locked");
        Ok(())
    }

    /// Decrypts the encrypted file into the working store.
    ///
    /// On failure the encrypted file is left untouched and no working store is
    /// written.
    pub fn unlock(&self, session: &Session) -> Result<()> {
        if self.working.exists() {
            return Err(VaultError::Precondition("working store already present"));
        }

        let sealed = EncryptedVaultFile::from_bytes(&self.encrypted.load()?)?;
        let plaintext = sealed.open(session.keys().file_key())?;

        let working = Storage::new(&self.working);
        if let Err(e) = working.save(&plaintext) {
            if let Err(wipe_err) = erase::wipe(&self.working) {
                warn!(error = %wipe_err, "could not remove partial working store");
            }
            return Err(e);
        }

        if let Err(e) = self.encrypted.remove() {
            warn!(error = %e, "could not remove encrypted vault after unlock");
        }
        info!("vault unlocked");
        Ok(())
    }
}
