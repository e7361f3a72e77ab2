//! Error types for the sync core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption failure: {0}")]
    EncryptionFailure(String),

    #[error("Remote gateway error: {0}")]
    Remote(String),

    #[error("Remote gateway unreachable")]
    Unreachable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Legacy migration failed: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<crypto::CryptoError> for SyncError {
    fn from(err: crypto::CryptoError) -> Self {
        SyncError::EncryptionFailure(err.to_string())
    }
}

impl From<figment::Error> for SyncError {
    fn from(err: figment::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl SyncError {
    /// Remote-side failures are never fatal to a caller
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote(_) | SyncError::Unreachable)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
