//! Error types for `toky-otp-core`.

use thiserror::Error;

/// Errors produced while normalizing secrets or computing codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OtpError {
    /// The raw text does not yield usable Base32 secret material
    /// (too few alphabet characters, or the cleaned text does not decode).
    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    /// HOTP/TOTP generation failed (undecodable key, empty key, zero period).
    #[error("code computation failed: {0}")]
    CodeComputation(String),
}
