//! RFC 6238 TOTP and RFC 4226 HOTP generation engine.
//!
//! The generic primitives ([`generate_hotp`], [`generate_totp`]) work on
//! raw key bytes with `ring::hmac`. The vault-facing helpers
//! ([`current_code`], [`seconds_remaining`]) fix the parameters every
//! Toky entry uses: HMAC-SHA1, 6 digits, 30-second steps.

use std::time::{SystemTime, UNIX_EPOCH};

use ring::hmac;

use crate::codec::Secret;
use crate::OtpError;

// ── Constants ───────────────────────────────────────────────────────

/// Default TOTP period in seconds (RFC 6238 §4).
pub const DEFAULT_PERIOD: u32 = 30;

/// Digit count of every code shown by the vault.
pub const DEFAULT_DIGITS: OtpDigits = OtpDigits::Six;

// ── Types ───────────────────────────────────────────────────────────

/// HMAC algorithm used for OTP generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpAlgorithm {
    /// HMAC-SHA1 (default for most authenticator apps).
    Sha1,
    /// HMAC-SHA256.
    Sha256,
    /// HMAC-SHA512.
    Sha512,
}

impl OtpAlgorithm {
    /// Map to the corresponding `ring::hmac::Algorithm`.
    fn to_ring_algorithm(self) -> hmac::Algorithm {
        match self {
            Self::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => hmac::HMAC_SHA256,
            Self::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

/// Number of digits in an OTP code (6 or 8 only).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpDigits {
    /// 6-digit code (standard).
    Six,
    /// 8-digit code.
    Eight,
}

impl OtpDigits {
    /// Return the numeric digit count.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::Six => 6,
            Self::Eight => 8,
        }
    }

    /// Return the modulus value (10^digits) for truncation.
    #[must_use]
    const fn modulus(self) -> u32 {
        match self {
            Self::Six => 1_000_000,
            Self::Eight => 100_000_000,
        }
    }
}

// ── HOTP (RFC 4226) ────────────────────────────────────────────────

/// Generate an HOTP code per RFC 4226.
///
/// # Arguments
/// - `secret`: Shared secret key bytes (from `SecretBuffer::expose()`)
/// - `counter`: 8-byte counter value (big-endian per RFC 4226 §5.2)
/// - `digits`: Number of output digits (6 or 8)
/// - `algorithm`: HMAC algorithm to use
///
/// # Errors
/// Returns `OtpError::CodeComputation` if the secret is empty.
#[must_use = "OTP code should be used or stored"]
pub fn generate_hotp(
    secret: &[u8],
    counter: u64,
    digits: OtpDigits,
    algorithm: OtpAlgorithm,
) -> Result<String, OtpError> {
    if secret.is_empty() {
        return Err(OtpError::CodeComputation(
            "secret must not be empty".to_owned(),
        ));
    }

    // HMAC(K, C) where C is counter as 8-byte big-endian (RFC 4226 §5.2).
    let key = hmac::Key::new(algorithm.to_ring_algorithm(), secret);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let mac = tag.as_ref();

    // Dynamic Truncation (RFC 4226 §5.3): offset = low nibble of last byte.
    let offset = usize::from(mac[mac.len().wrapping_sub(1)] & 0x0F);
    let binary_code = u32::from_be_bytes([
        mac[offset] & 0x7F,
        mac[offset.wrapping_add(1)],
        mac[offset.wrapping_add(2)],
        mac[offset.wrapping_add(3)],
    ]);

    // modulus is always 1_000_000 or 100_000_000 (never zero).
    #[allow(clippy::arithmetic_side_effects)]
    let code = binary_code % digits.modulus();
    let width = usize::from(digits.value());

    Ok(format!("{code:0>width$}"))
}

// ── TOTP (RFC 6238) ────────────────────────────────────────────────

/// Generate a TOTP code per RFC 6238.
///
/// # Arguments
/// - `secret`: Shared secret key bytes
/// - `time`: Unix timestamp in seconds
/// - `digits`: Number of output digits (6 or 8)
/// - `period`: Time step in seconds (typically 30)
/// - `algorithm`: HMAC algorithm to use
///
/// # Errors
/// Returns `OtpError::CodeComputation` if `period` is 0 or secret is empty.
#[must_use = "OTP code should be used or stored"]
pub fn generate_totp(
    secret: &[u8],
    time: u64,
    digits: OtpDigits,
    period: u32,
    algorithm: OtpAlgorithm,
) -> Result<String, OtpError> {
    if period == 0 {
        return Err(OtpError::CodeComputation("period must be > 0".to_owned()));
    }

    // T = floor(time / period) per RFC 6238 §4.
    #[allow(clippy::arithmetic_side_effects)]
    let time_step = time / u64::from(period);
    generate_hotp(secret, time_step, digits, algorithm)
}

// ── Vault-facing helpers ───────────────────────────────────────────

/// Current 6-digit code for a normalized secret at Unix time `at`.
///
/// # Errors
///
/// Returns [`OtpError::CodeComputation`] if the secret does not decode.
/// Secrets admitted through `codec::parse` never hit this path.
pub fn current_code(secret: &Secret, at: u64) -> Result<String, OtpError> {
    let key = secret.decode()?;
    generate_totp(
        key.expose(),
        at,
        DEFAULT_DIGITS,
        DEFAULT_PERIOD,
        OtpAlgorithm::Sha1,
    )
}

/// Seconds until the next 30-second boundary, in `1..=30`.
///
/// A countdown never reads 0: at an exact boundary the fresh window has
/// the full 30 seconds left.
#[must_use]
pub fn seconds_remaining(at: u64) -> u32 {
    let period = u64::from(DEFAULT_PERIOD);
    // period is a non-zero constant.
    #[allow(clippy::arithmetic_side_effects)]
    let elapsed = at % period;
    u32::try_from(period.saturating_sub(elapsed)).unwrap_or(DEFAULT_PERIOD)
}

/// Convert a wall-clock instant to whole Unix seconds.
///
/// Clocks set before 1970 clamp to 0.
#[must_use]
pub fn unix_time(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Current Unix time in whole seconds from the system clock.
#[must_use]
pub fn unix_now() -> u64 {
    unix_time(SystemTime::now())
}

// ── Tests ───────────────────────────────────────────────────────────
