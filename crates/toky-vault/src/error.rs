//! Vault error types for `toky-vault`.

use thiserror::Error;
use toky_otp_core::OtpError;

use crate::store::EntryHandle;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The secret text was rejected by normalization or validation.
    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    /// The label is blank after trimming.
    #[error("label must not be empty")]
    EmptyLabel,

    /// The handle does not refer to a live entry.
    #[error("entry not found: {0}")]
    NotFound(EntryHandle),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Token file serialization failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// An admitted secret failed to produce a code.
    #[error("code computation failed: {0}")]
    CodeComputation(String),
}

impl From<OtpError> for VaultError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::InvalidSecret(msg) => Self::InvalidSecret(msg),
            OtpError::CodeComputation(msg) => Self::CodeComputation(msg),
        }
    }
}
