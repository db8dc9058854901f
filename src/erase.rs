//! Destructive removal of plaintext files.
//!
//! Overwriting is best effort: on SSDs with wear levelling and on
//! copy-on-write filesystems old blocks may survive the overwrite.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::crypto::secure_random;
use crate::error::Result;

/// Number of random overwrite passes.
pub const WIPE_PASSES: usize = 3;

const CHUNK_LEN: usize = 64 * 1024;

/// Overwrites `path` with random data [`WIPE_PASSES`] times, then removes it.
///
/// A failed overwrite still falls back to a plain delete. A missing file is
/// not an error.
pub fn wipe(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    if let Err(e) = overwrite(path) {
        warn!(path = %path.display(), error = %e, "overwrite failed; deleting without wiping");
    }

    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "wiped");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn overwrite(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    let mut chunk = vec![0u8; CHUNK_LEN];

    for _ in 0..WIPE_PASSES {
        file.seek(SeekFrom::Start(0))?;

        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(CHUNK_LEN as u64) as usize;
            secure_random(&mut chunk[..n])?;
            file.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }

        file.flush()?;
        file.sync_all()
            .map_err(|e| io::Error::new(e.kind(), format!("sync failed: {e}")))?;
    }

    Ok(())
}
