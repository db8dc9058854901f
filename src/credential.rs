//! Master passphrase verification and brute-force lockout.

use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::{KdfParams, SALT_LEN, constant_time_eq};
use crate::error::{Result, VaultError};
use crate::session::Session;
use crate::config::with_suffix;
use crate::storage::Storage;

/// Failed attempts after which every further attempt is refused.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

/// The single credential record of a vault.
///
/// Holds no secret material, so it stays readable while the vault is locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCredential {
    password_hash: String,
    salt: String,
    login_attempts: u32,
    last_attempt: Option<DateTime<Utc>>,
    kdf: KdfParams,
}

impl MasterCredential {
    fn for_session(session: &Session, kdf: KdfParams) -> Self {
        Self {
            password_hash: STANDARD.encode(session.keys().auth_key()),
            salt: hex::encode(session.salt()),
            login_attempts: 0,
            last_attempt: None,
            kdf,
        }
    }

    /// Base64 of the auth key.
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Hex encoded salt.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }

    pub fn is_locked_out(&self) -> bool {
        self.login_attempts >= MAX_LOGIN_ATTEMPTS
    }

    pub fn salt_bytes(&self) -> Result<[u8; SALT_LEN]> {
        let bytes = hex::decode(&self.salt)
            .map_err(|_| VaultError::InvalidConfig("credential salt is not hex".into()))?;
        bytes
            .try_into()
            .map_err(|_| VaultError::InvalidConfig("credential salt has wrong length".into()))
    }

    fn matches(&self, session: &Session) -> bool {
        let computed = STANDARD.encode(session.keys().auth_key());
        constant_time_eq(computed.as_bytes(), self.password_hash.as_bytes())
    }

    fn record_attempt(&mut self, success: bool) {
        self.login_attempts = if success {
            0
        } else {
            self.login_attempts.saturating_add(1)
        };
        self.last_attempt = Some(Utc::now());
    }
}

/// Checks passphrases against the persisted [`MasterCredential`].
///
/// A replacement credential is first staged next to the record as
/// `<record>.new` and only renamed over it once the entries have been
/// re-encrypted.
#[derive(Debug, Clone)]
pub struct Authenticator {
    record: Storage,
    staged: Storage,
}

impl Authenticator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            staged: Storage::new(with_suffix(&path, ".new")),
            record: Storage::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.record.path()
    }

    pub fn staged_path(&self) -> &Path {
        self.staged.path()
    }

    pub fn exists(&self) -> bool {
        self.record.exists()
    }

    pub fn load(&self) -> Result<MasterCredential> {
        if !self.exists() {
            return Err(VaultError::Precondition("vault is not initialized"));
        }
        read_record(&self.record)
    }

    pub fn save(&self, credential: &MasterCredential) -> Result<()> {
        self.record.save(&serde_json::to_vec_pretty(credential)?)
    }

    /// Verifies `passphrase` and returns the session keys on success.
    ///
    /// Every attempt is persisted. Once [`MAX_LOGIN_ATTEMPTS`] failures have
    /// accumulated, even the correct passphrase is refused.
    pub fn verify(&self, passphrase: &[u8]) -> Result<Session> {
        let mut credential = self.load()?;

        if credential.is_locked_out() {
            credential.record_attempt(false);
            self.save(&credential)?;
            warn!(attempts = credential.login_attempts, "login refused: too many failed attempts");
            return Err(VaultError::AuthFailure);
        }

        let session = Session::derive(passphrase, Some(credential.salt_bytes()?), credential.kdf)?;
        let success = credential.matches(&session);
        credential.record_attempt(success);
        self.save(&credential)?;

        if success {
            debug!("master password verified");
            Ok(session)
        } else {
            warn!(attempts = credential.login_attempts, "master password rejected");
            Err(VaultError::AuthFailure)
        }
    }

    /// Checks `passphrase` against an already unlocked session.
    ///
    /// The attempt counter is neither consulted nor updated.
    pub fn confirm(&self, session: &Session, passphrase: &[u8]) -> Result<()> {
        let kdf = self.load()?.kdf;
        let candidate = Session::derive(passphrase, Some(*session.salt()), kdf)?;

        if constant_time_eq(candidate.keys().auth_key(), session.keys().auth_key()) {
            Ok(())
        } else {
            warn!("current master password rejected");
            Err(VaultError::AuthFailure)
        }
    }

    /// Derives a new credential with a fresh salt without persisting it.
    pub fn enroll(&self, passphrase: &[u8], kdf: KdfParams) -> Result<(MasterCredential, Session)> {
        let session = Session::derive(passphrase, None, kdf)?;
        Ok((MasterCredential::for_session(&session, kdf), session))
    }

    /// Writes `credential` as the pending replacement of the record.
    pub fn stage(&self, credential: &MasterCredential) -> Result<()> {
        self.staged.save(&serde_json::to_vec_pretty(credential)?)
    }

    pub fn load_staged(&self) -> Result<Option<MasterCredential>> {
        if !self.staged.exists() {
            return Ok(None);
        }
        read_record(&self.staged).map(Some)
    }

    /// Replaces the record with the staged credential.
    pub fn promote_staged(&self) -> Result<()> {
        self.staged.rename_to(&self.record)?;
        debug!("staged credential promoted");
        Ok(())
    }

    pub fn discard_staged(&self) -> Result<()> {
        self.staged.remove()
    }
}

fn read_record(storage: &Storage) -> Result<MasterCredential> {
    let credential: MasterCredential = serde_json::from_slice(&storage.load()?)?;
    credential.kdf.validate()?;
    Ok(credential)
}
