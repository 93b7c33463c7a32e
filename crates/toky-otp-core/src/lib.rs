//! `toky-otp-core` — Secret handling and one-time-password engine for Toky.
//!
//! Pure functions only: zero file I/O, zero threads, zero logging.
//! Everything stateful lives in `toky-vault`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod codec;

pub mod totp;

pub use codec::{normalize, parse, validate, Secret, BASE32_ALPHABET, MIN_SECRET_LEN};
pub use error::OtpError;
pub use memory::SecretBuffer;
pub use totp::{
    current_code, generate_hotp, generate_totp, seconds_remaining, unix_now, unix_time,
    OtpAlgorithm, OtpDigits, DEFAULT_DIGITS, DEFAULT_PERIOD,
};
