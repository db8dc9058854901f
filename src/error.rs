use thiserror::Error;

/// Failures of the underlying file or relational storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("credential record: {0}")]
    Record(#[from] serde_json::Error),
}

/// Errors returned by vault operations.
///
/// Wrong passphrases and lockouts both map to [`VaultError::AuthFailure`] so
/// callers cannot tell them apart.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("authentication failed")]
    AuthFailure,

    #[error("integrity check failed: {0}")]
    CryptoIntegrity(String),

    #[error("{0}")]
    Precondition(&'static str),

    #[error("storage error: {0}")]
    StorageIo(#[from] StorageError),

    #[error("entry {0} not found")]
    NotFound(i64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::StorageIo(StorageError::Io(e))
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::StorageIo(StorageError::Database(e))
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::StorageIo(StorageError::Record(e))
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
