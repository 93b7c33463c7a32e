//! Zeroizing wrapper for decoded key bytes.
//!
//! Decoded secrets only live for the duration of a single code
//! computation. [`SecretBuffer`] makes sure they:
//! - are erased on drop (via `secrecy`'s built-in `Zeroize`)
//! - never show up in `Debug`/`Display` output

use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;

/// Variable-length buffer for raw HMAC key material.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
}

impl SecretBuffer {
    /// Copy `data` into a new zeroize-on-drop allocation.
    ///
    /// The caller remains responsible for erasing its own copy.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        Self {
            inner: data.to_vec().into(),
        }
    }

    /// Expose the underlying bytes for an HMAC computation.
    ///
    /// Keep exposure minimal: use the slice within a single expression
    /// rather than binding it to a long-lived variable.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Returns the number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}
