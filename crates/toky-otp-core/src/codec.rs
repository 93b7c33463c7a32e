//! Base32 secret normalization and validation.
//!
//! Users paste secrets from QR-code fallbacks, password managers and
//! e-mails, so the raw text routinely carries spaces, dashes, lowercase
//! letters and `=` padding. [`normalize`] is a lossy cleanup that keeps
//! only the RFC 4648 Base32 alphabet; [`validate`] is the authoritative
//! gate that proves a code can actually be computed. [`parse`] runs both
//! and is the only way the vault turns raw text into a [`Secret`].

use std::fmt;
use std::sync::OnceLock;

use data_encoding::{Encoding, Specification};
use zeroize::Zeroizing;

use crate::error::OtpError;
use crate::memory::SecretBuffer;
use crate::totp;

// ── Constants ───────────────────────────────────────────────────────

/// RFC 4648 §6 Base32 alphabet.
pub const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Minimum number of Base32 characters a secret must keep after cleanup
/// (16 characters = 80 bits of key material).
pub const MIN_SECRET_LEN: usize = 16;

// ── Secret ──────────────────────────────────────────────────────────

/// Canonical Base32 secret text.
///
/// Only obtainable through [`normalize`] or [`parse`], so holding a
/// `Secret` guarantees uppercase `A-Z2-7` text of at least
/// [`MIN_SECRET_LEN`] characters. The text is zeroized on drop and
/// masked in `Debug`/`Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    encoded: Zeroizing<String>,
}

impl Secret {
    /// The normalized Base32 text, as written to the token file.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.encoded
    }

    /// Number of Base32 characters in the normalized secret.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    /// Decode the Base32 text into raw HMAC key bytes.
    ///
    /// Decoding is unpadded and tolerates non-zero trailing bits, but
    /// rejects lengths no Base32 encoder can produce (1, 3 or 6 leftover
    /// characters).
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::CodeComputation`] if the text does not decode.
    pub fn decode(&self) -> Result<SecretBuffer, OtpError> {
        let bytes = Zeroizing::new(
            lenient_base32()?
                .decode(self.encoded.as_bytes())
                .map_err(|e| OtpError::CodeComputation(format!("secret is not valid Base32: {e}")))?,
        );
        Ok(SecretBuffer::new(&bytes))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ── Normalization ───────────────────────────────────────────────────

const fn is_base32_symbol(c: char) -> bool {
    matches!(c, 'A'..='Z' | '2'..='7')
}

static LENIENT_BASE32: OnceLock<Result<Encoding, OtpError>> = OnceLock::new();

/// Unpadded RFC 4648 Base32 that ignores leftover bits in the last symbol.
///
/// Built once on first use and shared for the lifetime of the process.
fn lenient_base32() -> Result<&'static Encoding, OtpError> {
    LENIENT_BASE32
        .get_or_init(|| {
            let mut spec = Specification::new();
            spec.symbols.push_str(BASE32_ALPHABET);
            spec.check_trailing_bits = false;
            spec.encoding()
                .map_err(|e| OtpError::CodeComputation(format!("invalid Base32 alphabet: {e}")))
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Uppercase `raw` and drop every character outside the Base32 alphabet.
///
/// # Errors
///
/// Returns [`OtpError::InvalidSecret`] when fewer than [`MIN_SECRET_LEN`]
/// characters survive the cleanup.
pub fn normalize(raw: &str) -> Result<Secret, OtpError> {
    let cleaned: Zeroizing<String> = Zeroizing::new(
        raw.chars()
            .flat_map(char::to_uppercase)
            .filter(|c| is_base32_symbol(*c))
            .collect(),
    );

    if cleaned.len() < MIN_SECRET_LEN {
        return Err(OtpError::InvalidSecret(format!(
            "expected at least {MIN_SECRET_LEN} Base32 characters, found {}",
            cleaned.len()
        )));
    }

    Ok(Secret { encoded: cleaned })
}

/// Returns `true` iff a TOTP code can be computed from `secret` right now.
#[must_use]
pub fn validate(secret: &Secret) -> bool {
    totp::current_code(secret, totp::unix_now()).is_ok()
}

/// Normalize then validate raw user text.
///
/// # Errors
///
/// Returns [`OtpError::InvalidSecret`] if either step rejects the input.
pub fn parse(raw: &str) -> Result<Secret, OtpError> {
    let secret = normalize(raw)?;
    if !validate(&secret) {
        return Err(OtpError::InvalidSecret(
            "secret does not produce a computable code".to_owned(),
        ));
    }
    Ok(secret)
}
