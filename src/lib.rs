//! Local, single-user password vault.
//!
//! Secrets live in a SQLite working store with every password encrypted
//! individually. While the vault is locked the whole store is encrypted into
//! a single file and the plaintext store is securely erased.

pub mod backup;
mod config;
mod credential;
mod crypto;
pub mod erase;
mod error;
pub mod generator;
mod session;
mod storage;
mod store;

use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

pub use crate::config::{DEFAULT_STORE_NAME, VaultPaths, default_paths};
pub use crate::credential::{Authenticator, MAX_LOGIN_ATTEMPTS, MasterCredential};
pub use crate::crypto::{
    DerivedKeySet, EncryptedVaultFile, FieldCipher, KdfParams, VaultFileCipher, derive,
};
pub use crate::error::{Result, StorageError, VaultError};
pub use crate::session::Session;
pub use crate::storage::Storage;
pub use crate::store::{EntryStore, VaultEntry};

/// The vault and its session state.
///
/// Created locked. [`Vault::setup_master_password`] or [`Vault::login`]
/// unlock it, [`Vault::logout`] (or dropping the value) locks it again.
pub struct Vault {
    paths: VaultPaths,
    kdf: KdfParams,
    auth: Authenticator,
    files: VaultFileCipher,
    store: EntryStore,
    session: Option<Session>,
}

impl Drop for Vault {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.logout() {
                warn!(error = %e, "failed to lock vault on drop");
            }
        }
    }
}

impl Vault {
    pub fn new(paths: VaultPaths) -> Self {
        Self::with_kdf(paths, KdfParams::default())
    }

    /// `kdf` applies to vaults created by [`Vault::setup_master_password`];
    /// existing vaults keep the parameters stored in their credential.
    pub fn with_kdf(paths: VaultPaths, kdf: KdfParams) -> Self {
        Self {
            auth: Authenticator::new(&paths.credential),
            files: VaultFileCipher::new(&paths.working, &paths.encrypted),
            store: EntryStore::new(&paths.working),
            paths,
            kdf,
            session: None,
        }
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn is_initialized(&self) -> bool {
        self.auth.exists()
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_some()
    }

    pub fn credential(&self) -> Result<MasterCredential> {
        self.auth.load()
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or(VaultError::Precondition("vault is locked"))
    }

    /// Creates a new vault protected by `passphrase` and leaves it unlocked.
    pub fn setup_master_password(&mut self, passphrase: &str) -> Result<()> {
        if self.is_initialized() {
            return Err(VaultError::Precondition("vault is already initialized"));
        }
        if self.paths.working.exists() || self.paths.encrypted.exists() {
            return Err(VaultError::Precondition("vault files already exist"));
        }

        let (credential, session) = self.auth.enroll(passphrase.as_bytes(), self.kdf)?;

        let created = self
            .store
            .ensure_schema()
            .and_then(|()| self.store.write_credential(&credential))
            .and_then(|()| self.auth.save(&credential));
        if let Err(e) = created {
            if let Err(wipe_err) = erase::wipe(&self.paths.working) {
                warn!(error = %wipe_err, "could not remove partial working store");
            }
            if let Err(rm_err) = self.auth_record().remove() {
                warn!(error = %rm_err, "could not remove partial credential record");
            }
            return Err(e);
        }

        self.session = Some(session);
        info!(dir = %self.paths.dir().display(), "vault initialized");
        Ok(())
    }

    /// Verifies `passphrase` and unlocks the vault.
    ///
    /// A wrong passphrase, a lockout, an unreadable credential record and an
    /// unreadable encrypted file all surface as [`VaultError::AuthFailure`].
    pub fn login(&mut self, passphrase: &str) -> Result<()> {
        if self.is_unlocked() {
            return Err(VaultError::Precondition("vault is already unlocked"));
        }
        if !self.is_initialized() {
            return Err(VaultError::Precondition("vault is not initialized"));
        }

        self.reconcile_credential().map_err(unlock_failure)?;
        let session = self.auth.verify(passphrase.as_bytes()).map_err(unlock_failure)?;
        self.recover_interrupted_import(&session)
            .map_err(unlock_failure)?;

        let recovered = self.paths.working.exists();
        if recovered {
            warn!("recovering working store left by an interrupted session");
        } else {
            self.files.unlock(&session).map_err(unlock_failure)?;
        }

        let prepared = self
            .store
            .ensure_schema()
            .and_then(|()| self.auth.load())
            .and_then(|credential| self.store.write_credential(&credential));
        if let Err(e) = prepared {
            if !recovered {
                if let Err(lock_err) = self.files.lock(&session) {
                    warn!(error = %lock_err, "could not re-lock vault after failed login");
                }
            }
            return Err(unlock_failure(e));
        }

        self.session = Some(session);
        Ok(())
    }

    /// Finishes or abandons a passphrase change that was interrupted.
    ///
    /// The staged credential is promoted only if the working store's `user`
    /// row, committed together with the re-encrypted entries, matches it.
    fn reconcile_credential(&self) -> Result<()> {
        let staged = match self.auth.load_staged() {
            Ok(Some(staged)) => staged,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "discarding unreadable staged credential");
                return self.auth.discard_staged();
            }
        };

        let committed = self.paths.working.exists()
            && matches!(
                self.store.stored_credential(),
                Ok(Some((hash, salt))) if hash == staged.password_hash() && salt == staged.salt()
            );

        if committed {
            warn!("completing interrupted master password change");
            self.auth.promote_staged()
        } else {
            warn!("discarding unfinished master password change");
            self.auth.discard_staged()
        }
    }

    /// Resolves a `.bak` left behind by an import that never finished.
    fn recover_interrupted_import(&self, session: &Session) -> Result<()> {
        if !self.paths.backup.exists() {
            return Ok(());
        }
        let cipher = session.field_cipher();

        if self.paths.working.exists() && self.store.verify(&cipher).is_ok() {
            warn!("discarding backup left by an interrupted import");
            return erase::wipe(&self.paths.backup);
        }

        if EntryStore::new(&self.paths.backup).verify(&cipher).is_ok() {
            warn!("restoring vault from backup left by an interrupted import");
            erase::wipe(&self.paths.working)?;
            std::fs::rename(&self.paths.backup, &self.paths.working)?;
            return Ok(());
        }

        warn!(path = %self.paths.backup.display(), "leaving unusable import backup in place");
        Ok(())
    }

    /// Encrypts the working store and discards the session keys.
    ///
    /// If locking fails the vault stays unlocked so the call can be retried.
    pub fn logout(&mut self) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };

        self.files.lock(session)?;
        self.session = None;
        Ok(())
    }

    /// Replaces the master passphrase and re-encrypts every entry.
    ///
    /// `old` is checked against the unlocked session, so the failed login
    /// counter does not apply; a successful change resets it. Either all
    /// entries move to the new key and the new credential is stored, or
    /// nothing changes.
    pub fn change_master_password(&mut self, old: &str, new: &str) -> Result<()> {
        let current = self.session()?;
        self.auth.confirm(current, old.as_bytes())?;

        let kdf = self.auth.load()?.kdf();
        let (credential, next) = self.auth.enroll(new.as_bytes(), kdf)?;

        let migrated = self.store.reencrypt_all(
            &current.field_cipher(),
            &next.field_cipher(),
            &credential,
            || self.auth.stage(&credential),
        );
        let entries = match migrated {
            Ok(entries) => entries,
            Err(e) => {
                if let Err(discard) = self.auth.discard_staged() {
                    warn!(error = %discard, "could not discard staged credential");
                }
                return Err(e);
            }
        };

        // entries are committed under the new key from here on
        self.session = Some(next);
        self.auth.promote_staged()?;
        info!(entries, "master password changed");
        Ok(())
    }

    pub fn add_entry(&self, website: &str, username: &str, secret: &str, notes: &str) -> Result<i64> {
        let cipher = self.session()?.field_cipher();
        self.store.add(&cipher, website, username, secret, notes)
    }

    pub fn update_entry(
        &self,
        id: i64,
        website: &str,
        username: &str,
        secret: &str,
        notes: &str,
    ) -> Result<()> {
        let cipher = self.session()?.field_cipher();
        self.store.update(&cipher, id, website, username, secret, notes)
    }

    pub fn delete_entry(&self, id: i64) -> Result<()> {
        self.session()?;
        self.store.delete(id)
    }

    pub fn get_entry(&self, id: i64) -> Result<VaultEntry> {
        let cipher = self.session()?.field_cipher();
        self.store.get(&cipher, id)
    }

    /// All entries, decrypted, sorted by website.
    pub fn list_entries(&self) -> Result<Vec<VaultEntry>> {
        let cipher = self.session()?.field_cipher();
        self.store.list_all(&cipher)
    }

    pub fn search_entries(&self, term: &str) -> Result<Vec<VaultEntry>> {
        let cipher = self.session()?.field_cipher();
        self.store.search(&cipher, term)
    }

    /// Copies the current storage to `dest`: a snapshot of the working store
    /// while unlocked, the encrypted file while locked.
    pub fn export_vault(&self, dest: &Path) -> Result<()> {
        if self.is_unlocked() {
            backup::export_store(&self.paths.working, dest)
        } else if self.paths.encrypted.exists() {
            backup::export(&self.paths.encrypted, dest).map(|_| ())
        } else {
            Err(VaultError::Precondition("vault is not initialized"))
        }
    }

    /// Replaces the working store with an exported one.
    ///
    /// The imported store must decrypt under the current master passphrase;
    /// otherwise the previous store is restored and a storage error returned.
    pub fn import_vault(&self, src: &Path) -> Result<usize> {
        let cipher = self.session()?.field_cipher();

        let pending = backup::import(src, &self.paths.working, &self.paths.backup)?;

        let validated = self.store.verify(&cipher).and_then(|entries| {
            self.store.ensure_schema()?;
            self.store.write_credential(&self.auth.load()?)?;
            Ok(entries)
        });

        match validated {
            Ok(entries) => {
                pending.commit()?;
                Ok(entries)
            }
            Err(e) => {
                warn!(error = %e, "imported vault rejected");
                pending.rollback()?;
                Err(match e {
                    VaultError::StorageIo(_) => e,
                    other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()).into(),
                })
            }
        }
    }

    fn auth_record(&self) -> Storage {
        Storage::new(&self.paths.credential)
    }
}

fn unlock_failure(e: VaultError) -> VaultError {
    if !matches!(e, VaultError::AuthFailure) {
        debug!(error = %e, "unlock failed");
    }
    VaultError::AuthFailure
}
