//! Durable storage for the token list: a plain JSON array on disk.
//!
//! The file is rewritten in full on every mutation and read once at
//! startup. Reading never fails: a missing file (first run), an
//! unreadable file or malformed JSON all degrade to an empty list so
//! the vault starts instead of crashing.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Default token file name inside the data directory.
pub const TOKENS_FILE: &str = "tokens_data.json";

// ── Record ─────────────────────────────────────────────────────────

/// One persisted `(label, secret)` pair.
///
/// `token` holds the already-normalized Base32 secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Display label of the entry.
    pub service: String,
    /// Normalized Base32 secret.
    pub token: String,
}

impl TokenRecord {
    /// Build a record from a label and a secret string.
    #[must_use]
    pub fn new(service: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            token: token.into(),
        }
    }
}

// ── Gateway trait ──────────────────────────────────────────────────

/// Storage backend for the ordered token list.
pub trait TokenPersistence: Send + Sync {
    /// Read every stored record, in order. Never fails: unavailable or
    /// corrupt storage yields an empty list.
    fn load(&self) -> Vec<TokenRecord>;

    /// Replace the stored list with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] or [`VaultError::Persistence`] when the
    /// write does not complete.
    fn save(&self, records: &[TokenRecord]) -> Result<(), VaultError>;
}

impl<T: TokenPersistence + ?Sized> TokenPersistence for Arc<T> {
    fn load(&self) -> Vec<TokenRecord> {
        (**self).load()
    }

    fn save(&self, records: &[TokenRecord]) -> Result<(), VaultError> {
        (**self).save(records)
    }
}

// ── JSON file ──────────────────────────────────────────────────────

/// JSON token file (`tokens_data.json` by default).
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    /// Token file at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{dir}/tokens_data.json`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(TOKENS_FILE))
    }

    /// Location of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file used for atomic replacement: `.{name}.tmp`.
    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| TOKENS_FILE.into(), |n| n.to_string_lossy());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

/// Serialize with 4-space indentation; non-ASCII labels stay unescaped.
fn to_pretty_json(records: &[TokenRecord]) -> Result<Vec<u8>, VaultError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records
        .serialize(&mut ser)
        .map_err(|e| VaultError::Persistence(format!("failed to serialize tokens: {e}")))?;
    Ok(buf)
}

/// Parse a token document, dropping array items that are not records.
fn parse_records(contents: &str, path: &Path) -> Vec<TokenRecord> {
    let items: Vec<serde_json::Value> = match serde_json::from_str(contents) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "token file is malformed; starting empty");
            return Vec::new();
        }
    };

    let total = items.len();
    let records: Vec<TokenRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    if records.len() < total {
        tracing::warn!(
            path = %path.display(),
            dropped = total.saturating_sub(records.len()),
            "token file contains items that are not records"
        );
    }
    records
}

/// Write `contents` to `tmp`, restrict it to the owner, then rename over `path`.
fn write_atomically(path: &Path, tmp: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(tmp, contents)?;

    // Secrets are stored in clear: owner-only on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(tmp, path)
}

impl TokenPersistence for TokenFile {
    fn load(&self) -> Vec<TokenRecord> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => parse_records(&contents, &self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no token file yet; starting empty");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "token file is unreadable; starting empty");
                Vec::new()
            }
        }
    }

    /// Uses an atomic write pattern (write to `.tmp`, then rename) so a
    /// crash mid-save leaves the previous file intact.
    fn save(&self, records: &[TokenRecord]) -> Result<(), VaultError> {
        let json = to_pretty_json(records)?;
        let tmp = self.tmp_path();

        if let Err(e) = write_atomically(&self.path, &tmp, &json) {
            let _ = fs::remove_file(&tmp);
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write token file");
            return Err(VaultError::Io(e));
        }

        tracing::debug!(path = %self.path.display(), count = records.len(), "token file saved");
        Ok(())
    }
}

// ── In-memory backend ──────────────────────────────────────────────

/// Volatile backend for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: Mutex<Vec<TokenRecord>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    /// Backend pre-seeded with `records`.
    #[must_use]
    pub fn with_records(records: Vec<TokenRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    /// Snapshot of the currently stored records.
    #[must_use]
    pub fn records(&self) -> Vec<TokenRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl TokenPersistence for MemoryPersistence {
    fn load(&self) -> Vec<TokenRecord> {
        self.records()
    }

    fn save(&self, records: &[TokenRecord]) -> Result<(), VaultError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(VaultError::Io(std::io::Error::new(
                ErrorKind::PermissionDenied,
                "saves disabled",
            )));
        }
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.to_vec();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
