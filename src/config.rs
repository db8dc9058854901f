//! Locations of the files that make up a vault.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{Result, VaultError};

/// Default file name of the working store.
pub const DEFAULT_STORE_NAME: &str = "passwords.db";

/// The four files of one vault.
///
/// `working` exists only while unlocked, `encrypted` only while locked,
/// `backup` only during an import. `credential` always exists once the vault
/// is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    pub working: PathBuf,
    pub encrypted: PathBuf,
    pub backup: PathBuf,
    pub credential: PathBuf,
}

impl VaultPaths {
    /// Derives all paths from the working store path by appending `.enc`,
    /// `.bak` and `.auth`.
    pub fn for_store(working: impl Into<PathBuf>) -> Self {
        let working = working.into();
        Self {
            encrypted: with_suffix(&working, ".enc"),
            backup: with_suffix(&working, ".bak"),
            credential: with_suffix(&working, ".auth"),
            working,
        }
    }

    /// Paths for a vault named [`DEFAULT_STORE_NAME`] inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::for_store(dir.as_ref().join(DEFAULT_STORE_NAME))
    }

    /// Directory holding the vault files.
    pub fn dir(&self) -> &Path {
        self.working.parent().unwrap_or(Path::new("."))
    }
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Paths in the platform data directory.
pub fn default_paths() -> Result<VaultPaths> {
    let project_dirs = ProjectDirs::from("", "", "pwvault").ok_or_else(|| {
        VaultError::InvalidConfig("could not determine platform directories".into())
    })?;

    Ok(VaultPaths::in_dir(project_dirs.data_dir()))
}
