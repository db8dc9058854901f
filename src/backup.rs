//! Export and import of the vault storage as a single file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use rusqlite::{Connection, DatabaseName, OpenFlags};
use tracing::{info, warn};

use crate::erase;
use crate::error::Result;

/// Copies `source` to `dest` byte for byte.
pub fn export(source: &Path, dest: &Path) -> Result<u64> {
    let copied = fs::copy(source, dest)?;
    File::open(dest)?.sync_all()?;
    info!(dest = %dest.display(), bytes = copied, "vault exported");
    Ok(copied)
}

/// Writes a consistent snapshot of the SQLite store at `source` to `dest`
/// using SQLite's online backup.
pub fn export_store(source: &Path, dest: &Path) -> Result<()> {
    let conn = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    conn.backup(DatabaseName::Main, dest, None)?;
    info!(dest = %dest.display(), "vault store exported");
    Ok(())
}

/// An import that has been copied into place but not yet accepted.
///
/// Dropping it without calling [`PendingImport::commit`] rolls the import back.
#[must_use]
#[derive(Debug)]
pub struct PendingImport {
    target: PathBuf,
    backup: PathBuf,
    had_original: bool,
    done: bool,
}

impl PendingImport {
    /// Accepts the import and securely removes the backup.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        if self.had_original {
            erase::wipe(&self.backup)?;
        }
        info!(target = %self.target.display(), "vault imported");
        Ok(())
    }

    /// Discards the imported file and puts the original back.
    pub fn rollback(mut self) -> Result<()> {
        self.done = true;
        restore(&self.target, &self.backup, self.had_original)
    }
}

impl Drop for PendingImport {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = restore(&self.target, &self.backup, self.had_original) {
                warn!(error = %e, "rollback of abandoned import failed");
            }
        }
    }
}

/// Replaces `target` with the file at `source`.
pub fn import(source: &Path, target: &Path, backup: &Path) -> Result<PendingImport> {
    let reader = File::open(source)?;
    import_from_reader(reader, target, backup)
}

/// Replaces `target` with the bytes of `reader`.
///
/// The existing target is first renamed to `backup`. If copying fails the
/// partial file is removed and the backup renamed back; when there was no
/// original the restore step is skipped.
pub fn import_from_reader<R: Read>(
    mut reader: R,
    target: &Path,
    backup: &Path,
) -> Result<PendingImport> {
    let had_original = target.exists();
    if had_original {
        fs::rename(target, backup)?;
    }

    let pending = PendingImport {
        target: target.to_path_buf(),
        backup: backup.to_path_buf(),
        had_original,
        done: false,
    };

    match copy_into(&mut reader, target) {
        Ok(()) => Ok(pending),
        Err(e) => {
            warn!(error = %e, "import failed; restoring previous vault");
            pending.rollback()?;
            Err(e.into())
        }
    }
}

fn copy_into<R: Read>(reader: &mut R, target: &Path) -> io::Result<()> {
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)?;
    io::copy(reader, &mut out)?;
    out.flush()?;
    out.sync_all()
}

fn restore(target: &Path, backup: &Path, had_original: bool) -> Result<()> {
    let wiped = erase::wipe(target);
    if let Err(e) = &wiped {
        warn!(target = %target.display(), error = %e, "could not wipe rejected import");
    }

    if !had_original {
        return wiped;
    }
    fs::rename(backup, target)?;
    info!(target = %target.display(), "previous vault restored");
    Ok(())
}
