//! Credential entries kept in the SQLite working store.
//!
//! Every call opens its own connection and commits before returning. The
//! store uses SQLite's default rollback journal so no WAL side files hold
//! plaintext after the store is locked.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use tracing::debug;
use zeroize::Zeroizing;

use crate::credential::MasterCredential;
use crate::crypto::FieldCipher;
use crate::error::{Result, VaultError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY,
    password_hash TEXT NOT NULL,
    salt TEXT NOT NULL,
    login_attempts INTEGER DEFAULT 0,
    last_attempt TIMESTAMP
);

CREATE TABLE IF NOT EXISTS passwords (
    id INTEGER PRIMARY KEY,
    website TEXT NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    notes TEXT,
    date_added TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    date_modified TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);";

const SELECT_ENTRIES: &str = "SELECT id, website, username, password, notes, date_added, date_modified
     FROM passwords";

/// A decrypted credential entry.
#[derive(Clone)]
pub struct VaultEntry {
    id: i64,
    website: String,
    username: String,
    secret: Zeroizing<String>,
    notes: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl VaultEntry {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn website(&self) -> &str {
        &self.website
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
}

impl std::fmt::Debug for VaultEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultEntry")
            .field("id", &self.id)
            .field("website", &self.website)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("notes", &self.notes)
            .field("created_at", &self.created_at)
            .field("modified_at", &self.modified_at)
            .finish()
    }
}

/// Row as stored, secret still encrypted.
struct StoredEntry {
    id: i64,
    website: String,
    username: String,
    ciphertext: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl StoredEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            website: row.get(1)?,
            username: row.get(2)?,
            ciphertext: row.get(3)?,
            notes: row.get(4)?,
            created_at: row.get(5)?,
            modified_at: row.get(6)?,
        })
    }

    fn matches(&self, needle: &str) -> bool {
        self.website.to_lowercase().contains(needle)
            || self.username.to_lowercase().contains(needle)
            || self
                .notes
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(needle))
    }

    fn decrypt(self, cipher: &FieldCipher) -> Result<VaultEntry> {
        let secret = cipher.decrypt(&self.ciphertext).map_err(|_| {
            VaultError::CryptoIntegrity(format!("secret of entry {} failed to decrypt", self.id))
        })?;

        Ok(VaultEntry {
            id: self.id,
            website: self.website,
            username: self.username,
            secret,
            notes: self.notes.unwrap_or_default(),
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }
}

/// CRUD and search over the `passwords` table.
#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "secure_delete", true)?;
        Ok(conn)
    }

    /// Creates the store file and both tables if missing.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Mirrors the credential into the single `user` row.
    pub fn write_credential(&self, credential: &MasterCredential) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        upsert_user(&tx, credential)?;
        tx.commit()?;
        Ok(())
    }

    pub fn add(
        &self,
        cipher: &FieldCipher,
        website: &str,
        username: &str,
        secret: &str,
        notes: &str,
    ) -> Result<i64> {
        let ciphertext = cipher.encrypt(secret)?;
        let now = Utc::now();

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO passwords (website, username, password, notes, date_added, date_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![website, username, ciphertext, notes, now],
        )?;
        let id = conn.last_insert_rowid();

        debug!(id, "entry added");
        Ok(id)
    }

    pub fn update(
        &self,
        cipher: &FieldCipher,
        id: i64,
        website: &str,
        username: &str,
        secret: &str,
        notes: &str,
    ) -> Result<()> {
        let ciphertext = cipher.encrypt(secret)?;

        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE passwords
             SET website = ?1, username = ?2, password = ?3, notes = ?4, date_modified = ?5
             WHERE id = ?6",
            params![website, username, ciphertext, notes, Utc::now(), id],
        )?;

        if changed == 0 {
            return Err(VaultError::NotFound(id));
        }
        debug!(id, "entry updated");
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        let changed = conn.execute("DELETE FROM passwords WHERE id = ?1", params![id])?;

        if changed == 0 {
            return Err(VaultError::NotFound(id));
        }
        debug!(id, "entry deleted");
        Ok(())
    }

    pub fn get(&self, cipher: &FieldCipher, id: i64) -> Result<VaultEntry> {
        let conn = self.connect()?;
        let stored = conn
            .query_row(
                &format!("{SELECT_ENTRIES} WHERE id = ?1"),
                params![id],
                StoredEntry::from_row,
            )
            .optional()?
            .ok_or(VaultError::NotFound(id))?;

        stored.decrypt(cipher)
    }

    /// All entries sorted by website.
    pub fn list_all(&self, cipher: &FieldCipher) -> Result<Vec<VaultEntry>> {
        self.stored_entries()?
            .into_iter()
            .map(|e| e.decrypt(cipher))
            .collect()
    }

    /// Case-insensitive substring search over website, username and notes.
    pub fn search(&self, cipher: &FieldCipher, term: &str) -> Result<Vec<VaultEntry>> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return self.list_all(cipher);
        }

        self.stored_entries()?
            .into_iter()
            .filter(|e| e.matches(&needle))
            .map(|e| e.decrypt(cipher))
            .collect()
    }

    /// Password hash and salt of the mirrored `user` row, if any.
    ///
    /// The row is written in the same transaction as re-encrypted entries, so
    /// it names the credential the stored secrets belong to.
    pub fn stored_credential(&self) -> Result<Option<(String, String)>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT password_hash, salt FROM user WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Re-encrypts every secret from `old` to `new` in one transaction and
    /// mirrors `credential` into the `user` row.
    ///
    /// `before_commit` runs after all rows are rewritten; if it fails the
    /// transaction is rolled back and no entry changes.
    pub fn reencrypt_all<F>(
        &self,
        old: &FieldCipher,
        new: &FieldCipher,
        credential: &MasterCredential,
        before_commit: F,
    ) -> Result<usize>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let rows: Vec<(i64, String)> = {
            let mut stmt = tx.prepare("SELECT id, password FROM passwords")?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?
        };

        for (id, ciphertext) in &rows {
            let secret = old.decrypt(ciphertext).map_err(|_| {
                VaultError::CryptoIntegrity(format!("secret of entry {id} failed to decrypt"))
            })?;
            tx.execute(
                "UPDATE passwords SET password = ?1 WHERE id = ?2",
                params![new.encrypt(&secret)?, id],
            )?;
        }
        upsert_user(&tx, credential)?;

        before_commit()?;
        tx.commit()?;

        debug!(entries = rows.len(), "entries re-encrypted");
        Ok(rows.len())
    }

    /// Checks that the store has the expected tables and that every secret
    /// decrypts under `cipher`.
    pub fn verify(&self, cipher: &FieldCipher) -> Result<usize> {
        self.stored_entries()?
            .into_iter()
            .map(|e| e.decrypt(cipher).map(|_| ()))
            .collect::<Result<Vec<_>>>()
            .map(|v| v.len())
    }

    fn stored_entries(&self) -> Result<Vec<StoredEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("{SELECT_ENTRIES} ORDER BY website, id"))?;
        let rows = stmt
            .query_map([], StoredEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn upsert_user(conn: &Connection, credential: &MasterCredential) -> Result<()> {
    conn.execute("DELETE FROM user WHERE id <> 1", [])?;
    conn.execute(
        "INSERT INTO user (id, password_hash, salt, login_attempts, last_attempt)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             password_hash = excluded.password_hash,
             salt = excluded.salt,
             login_attempts = excluded.login_attempts,
             last_attempt = excluded.last_attempt",
        params![
            credential.password_hash(),
            credential.salt(),
            credential.login_attempts(),
            credential.last_attempt()
        ],
    )?;
    Ok(())
}
