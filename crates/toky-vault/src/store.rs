//! In-memory token collection with validated mutations.
//!
//! [`TokenStore`] exclusively owns the ordered list of entries. Every
//! mutation validates its input first and only then takes the write
//! lock, so a concurrent reader (the refresh scheduler) sees either the
//! old entry or the new one, never a half-edited one. After a mutation
//! the full list is handed to the persistence backend; a failed save is
//! reported to the caller but the in-memory state stays authoritative.

use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use toky_otp_core::codec::{self, Secret};

use crate::error::VaultError;
use crate::persistence::{MemoryPersistence, TokenPersistence, TokenRecord};

// ---------------------------------------------------------------------------
// Identity and views
// ---------------------------------------------------------------------------

/// Stable identity of an entry, independent of its (mutable, non-unique)
/// label. Never reused within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryHandle(u64);

impl EntryHandle {
    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live entry: label plus validated secret.
#[derive(Debug, Clone)]
pub struct TokenEntry {
    handle: EntryHandle,
    label: String,
    secret: Secret,
}

impl TokenEntry {
    /// Entry identity.
    #[must_use]
    pub const fn handle(&self) -> EntryHandle {
        self.handle
    }

    /// Trimmed, non-empty display label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) const fn secret(&self) -> &Secret {
        &self.secret
    }

    fn summary(&self) -> EntrySummary {
        EntrySummary {
            handle: self.handle,
            label: self.label.clone(),
        }
    }

    fn record(&self) -> TokenRecord {
        TokenRecord::new(self.label.clone(), self.secret.expose())
    }
}

/// Read-only view of an entry (no secret material).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    /// Entry identity.
    pub handle: EntryHandle,
    /// Display label.
    pub label: String,
}

// ---------------------------------------------------------------------------
// Operation parameters and results
// ---------------------------------------------------------------------------

/// Changes requested by [`TokenStore::edit`].
///
/// Label and secret are independent: leaving `secret` as `None` keeps the
/// working credential untouched.
#[derive(Debug, Clone, Default)]
pub struct EntryEdit {
    /// New label (if changed).
    pub label: Option<String>,
    /// New raw secret text (if changed). Normalized and validated.
    pub secret: Option<String>,
}

impl EntryEdit {
    /// Rename only.
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            secret: None,
        }
    }

    /// Replace only the secret.
    #[must_use]
    pub fn secret(secret: impl Into<String>) -> Self {
        Self {
            label: None,
            secret: Some(secret.into()),
        }
    }

    /// Also replace the secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// `true` when the edit changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.label.is_none() && self.secret.is_none()
    }
}

/// Outcome of [`TokenStore::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records admitted into the store.
    pub loaded: usize,
    /// Records silently dropped (blank label or unusable secret).
    pub skipped: usize,
}

/// A mutation that took effect in memory, plus the outcome of the save
/// that followed it.
#[derive(Debug)]
#[must_use = "a failed save should be reported to the user"]
pub struct Committed<T> {
    /// Operation result.
    pub value: T,
    /// `Some` when the follow-up save failed; memory is still updated.
    pub save_error: Option<VaultError>,
}

impl<T> Committed<T> {
    /// `true` when the change reached durable storage.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.save_error.is_none()
    }

    /// Drop the save outcome and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    entries: Vec<TokenEntry>,
    next_handle: u64,
    /// Bumped on every change; lets saves detect stale snapshots.
    generation: u64,
}

impl StoreState {
    fn allocate_handle(&mut self) -> EntryHandle {
        self.next_handle = self.next_handle.wrapping_add(1);
        EntryHandle(self.next_handle)
    }

    fn position(&self, handle: EntryHandle) -> Option<usize> {
        self.entries.iter().position(|e| e.handle == handle)
    }

    fn touch(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    fn records(&self) -> Vec<TokenRecord> {
        self.entries.iter().map(TokenEntry::record).collect()
    }
}

/// Ordered, thread-safe collection of TOTP entries.
pub struct TokenStore {
    state: RwLock<StoreState>,
    persistence: Box<dyn TokenPersistence>,
    /// Generation of the last state written to storage.
    saved_generation: Mutex<Option<u64>>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Trim a label and reject blank ones.
fn clean_label(raw: &str) -> Result<String, VaultError> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(VaultError::EmptyLabel);
    }
    Ok(label.to_owned())
}

/// Validate a persisted record the same way `add` validates user input.
fn admit(record: &TokenRecord) -> Result<(String, Secret), VaultError> {
    let label = clean_label(&record.service)?;
    let secret = codec::parse(&record.token)?;
    Ok((label, secret))
}

impl TokenStore {
    /// Empty store backed by `persistence`. Nothing is loaded.
    #[must_use]
    pub fn new(persistence: impl TokenPersistence + 'static) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            persistence: Box::new(persistence),
            saved_generation: Mutex::new(None),
        }
    }

    /// Empty store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryPersistence::default())
    }

    /// Store backed by `persistence`, pre-filled with its records.
    ///
    /// Invalid records are skipped; see [`TokenStore::load`].
    pub fn open(persistence: impl TokenPersistence + 'static) -> (Self, LoadReport) {
        let records = persistence.load();
        let store = Self::new(persistence);
        let report = store.load(&records);
        (store, report)
    }

    // A poisoned lock still holds consistent data: mutations validate
    // before touching state and cannot panic half-way.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Mutations ----------------------------------------------------------

    /// Append a new entry.
    ///
    /// # Errors
    ///
    /// - [`VaultError::EmptyLabel`] if `label` is blank after trimming
    /// - [`VaultError::InvalidSecret`] if `raw_secret` fails normalization
    ///   or does not produce a code
    pub fn add(&self, label: &str, raw_secret: &str) -> Result<Committed<EntryHandle>, VaultError> {
        let label = clean_label(label)?;
        let secret = codec::parse(raw_secret)?;

        let (handle, records, generation) = {
            let mut state = self.write();
            let handle = state.allocate_handle();
            state.entries.push(TokenEntry {
                handle,
                label,
                secret,
            });
            let generation = state.touch();
            (handle, state.records(), generation)
        };

        tracing::info!(entry = %handle, "token added");
        Ok(Committed {
            value: handle,
            save_error: self.persist(&records, generation),
        })
    }

    /// Change an entry's label and/or secret.
    ///
    /// Both values are validated before anything changes, so either the
    /// whole edit applies or none of it does.
    ///
    /// # Errors
    ///
    /// - [`VaultError::EmptyLabel`] / [`VaultError::InvalidSecret`] for
    ///   rejected input (checked first)
    /// - [`VaultError::NotFound`] if `handle` is not live
    pub fn edit(&self, handle: EntryHandle, edit: EntryEdit) -> Result<Committed<()>, VaultError> {
        let unchanged = edit.is_empty();
        let label = edit.label.as_deref().map(clean_label).transpose()?;
        let secret = edit.secret.as_deref().map(codec::parse).transpose()?;

        let (records, generation) = {
            let mut state = self.write();
            let index = state.position(handle).ok_or(VaultError::NotFound(handle))?;
            if unchanged {
                return Ok(Committed {
                    value: (),
                    save_error: None,
                });
            }

            let entry = &mut state.entries[index];
            if let Some(label) = label {
                entry.label = label;
            }
            if let Some(secret) = secret {
                entry.secret = secret;
            }
            let generation = state.touch();
            (state.records(), generation)
        };

        tracing::info!(entry = %handle, "token edited");
        Ok(Committed {
            value: (),
            save_error: self.persist(&records, generation),
        })
    }

    /// Delete an entry.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if `handle` is not live (including
    /// when it was already removed).
    pub fn remove(&self, handle: EntryHandle) -> Result<Committed<()>, VaultError> {
        let (records, generation) = {
            let mut state = self.write();
            let index = state.position(handle).ok_or(VaultError::NotFound(handle))?;
            state.entries.remove(index);
            let generation = state.touch();
            (state.records(), generation)
        };

        tracing::info!(entry = %handle, "token removed");
        Ok(Committed {
            value: (),
            save_error: self.persist(&records, generation),
        })
    }

    /// Append persisted records, skipping any that would not pass `add`.
    ///
    /// Skipped records are counted but never reported as errors, so one
    /// corrupted entry does not block the rest. Nothing is saved.
    pub fn load(&self, records: &[TokenRecord]) -> LoadReport {
        let mut admitted = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match admit(record) {
                Ok(pair) => admitted.push(pair),
                Err(e) => tracing::debug!(index, error = %e, "skipping persisted token"),
            }
        }

        let report = LoadReport {
            loaded: admitted.len(),
            skipped: records.len().saturating_sub(admitted.len()),
        };

        if !admitted.is_empty() {
            let mut state = self.write();
            for (label, secret) in admitted {
                let handle = state.allocate_handle();
                state.entries.push(TokenEntry {
                    handle,
                    label,
                    secret,
                });
            }
            state.touch();
        }

        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped,
            "token records loaded"
        );
        report
    }

    /// Write the current list to storage again (e.g. after a failed save).
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the write fails.
    pub fn save(&self) -> Result<(), VaultError> {
        let (records, generation) = {
            let state = self.read();
            (state.records(), state.generation)
        };
        self.persist(&records, generation).map_or(Ok(()), Err)
    }

    /// Save `records` unless a newer generation already reached storage.
    fn persist(&self, records: &[TokenRecord], generation: u64) -> Option<VaultError> {
        let mut saved = self
            .saved_generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if saved.is_some_and(|g| g >= generation) {
            return None;
        }

        match self.persistence.save(records) {
            Ok(()) => {
                *saved = Some(generation);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "token list not saved; keeping in-memory state");
                Some(e)
            }
        }
    }

    // -- Reads --------------------------------------------------------------

    /// Ordered view of all entries, without secret material.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntrySummary> {
        self.read().entries.iter().map(TokenEntry::summary).collect()
    }

    /// Look up one entry.
    #[must_use]
    pub fn get(&self, handle: EntryHandle) -> Option<EntrySummary> {
        let state = self.read();
        state
            .position(handle)
            .map(|index| state.entries[index].summary())
    }

    /// Current ordinal position of `handle`.
    #[must_use]
    pub fn position(&self, handle: EntryHandle) -> Option<usize> {
        self.read().position(handle)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// `true` when the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// The list in its durable form.
    #[must_use]
    pub fn records(&self) -> Vec<TokenRecord> {
        self.read().records()
    }

    /// Consistent copy of every entry, secrets included.
    pub(crate) fn entries(&self) -> Vec<TokenEntry> {
        self.read().entries.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const GITHUB: &str = "JBSWY3DPEHPK3PXP";
    const RFC: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn store_with_backend() -> (TokenStore, Arc<MemoryPersistence>) {
        let backend = Arc::new(MemoryPersistence::default());
        (TokenStore::new(Arc::clone(&backend)), backend)
    }

    #[test]
    fn add_trims_label_and_normalizes_secret() {
        let (store, backend) = store_with_backend();
        let handle = store
            .add("  GitHub \n", "jbsw y3dp-ehpk 3pxp")
            .unwrap()
            .into_value();

        assert_eq!(
            store.get(handle),
            Some(EntrySummary {
                handle,
                label: "GitHub".into()
            })
        );
        assert_eq!(backend.records(), vec![TokenRecord::new("GitHub", GITHUB)]);
    }

    #[test]
    fn add_rejects_blank_label() {
        let (store, backend) = store_with_backend();
        let result = store.add("   ", GITHUB);
        assert!(matches!(result, Err(VaultError::EmptyLabel)));
        assert!(store.is_empty());
        assert_eq!(backend.save_count(), 0);
    }

    #[test]
    fn add_rejects_short_secret() {
        let store = TokenStore::in_memory();
        let result = store.add("GitHub", "JBSW Y3DP");
        assert!(matches!(result, Err(VaultError::InvalidSecret(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn add_rejects_undecodable_secret() {
        let store = TokenStore::in_memory();
        let result = store.add("GitHub", "JBSWY3DPEHPK3PXPA");
        assert!(matches!(result, Err(VaultError::InvalidSecret(_))));
    }

    #[test]
    fn labels_need_not_be_unique() {
        let store = TokenStore::in_memory();
        let a = store.add("Mail", GITHUB).unwrap().into_value();
        let b = store.add("Mail", RFC).unwrap().into_value();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn handles_are_never_reused() {
        let store = TokenStore::in_memory();
        let a = store.add("A", GITHUB).unwrap().into_value();
        store.remove(a).unwrap().into_value();
        let b = store.add("B", GITHUB).unwrap().into_value();
        assert_ne!(a, b);
    }

    #[test]
    fn handles_increase_in_allocation_order() {
        let store = TokenStore::in_memory();
        let a = store.add("A", GITHUB).unwrap().into_value();
        store.remove(a).unwrap().into_value();
        let b = store.add("B", GITHUB).unwrap().into_value();
        let c = store.add("C", RFC).unwrap().into_value();

        assert!(a.get() < b.get());
        assert!(b.get() < c.get());
        assert_eq!(c.to_string(), format!("#{}", c.get()));
    }

    #[test]
    fn edit_label_only_keeps_secret() {
        let (store, backend) = store_with_backend();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();

        store
            .edit(handle, EntryEdit::label("GitHub (work)"))
            .unwrap()
            .into_value();

        assert_eq!(
            backend.records(),
            vec![TokenRecord::new("GitHub (work)", GITHUB)]
        );
    }

    #[test]
    fn edit_secret_only_keeps_label() {
        let (store, backend) = store_with_backend();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();

        store
            .edit(handle, EntryEdit::secret(RFC.to_lowercase()))
            .unwrap()
            .into_value();

        assert_eq!(backend.records(), vec![TokenRecord::new("GitHub", RFC)]);
    }

    #[test]
    fn edit_is_atomic_when_secret_is_invalid() {
        let store = TokenStore::in_memory();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();

        let result = store.edit(handle, EntryEdit::label("Renamed").with_secret("too short"));
        assert!(matches!(result, Err(VaultError::InvalidSecret(_))));
        assert_eq!(store.get(handle).unwrap().label, "GitHub");
        assert_eq!(store.records()[0].token, GITHUB);
    }

    #[test]
    fn edit_is_atomic_when_label_is_blank() {
        let store = TokenStore::in_memory();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();

        let result = store.edit(handle, EntryEdit::label(" ").with_secret(RFC));
        assert!(matches!(result, Err(VaultError::EmptyLabel)));
        assert_eq!(store.records(), vec![TokenRecord::new("GitHub", GITHUB)]);
    }

    #[test]
    fn edit_unknown_handle_is_not_found() {
        let store = TokenStore::in_memory();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();
        store.remove(handle).unwrap().into_value();

        let result = store.edit(handle, EntryEdit::label("Ghost"));
        assert!(matches!(result, Err(VaultError::NotFound(h)) if h == handle));
    }

    #[test]
    fn empty_edit_does_not_save() {
        let (store, backend) = store_with_backend();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();
        assert_eq!(backend.save_count(), 1);

        store.edit(handle, EntryEdit::default()).unwrap().into_value();
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn empty_edit_of_removed_handle_is_not_found() {
        let store = TokenStore::in_memory();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();
        store.remove(handle).unwrap().into_value();

        let edit = EntryEdit::default();
        assert!(edit.is_empty());
        assert!(matches!(
            store.edit(handle, edit),
            Err(VaultError::NotFound(h)) if h == handle
        ));
    }

    #[test]
    fn edit_helpers_report_emptiness() {
        assert!(!EntryEdit::label("GitHub").is_empty());
        assert!(!EntryEdit::secret(GITHUB).is_empty());
        assert!(!EntryEdit::default().with_secret(RFC).is_empty());
    }

    #[test]
    fn remove_twice_is_not_found() {
        let store = TokenStore::in_memory();
        let handle = store.add("GitHub", GITHUB).unwrap().into_value();

        store.remove(handle).unwrap().into_value();
        let second = store.remove(handle);
        assert!(matches!(second, Err(VaultError::NotFound(_))));
        assert!(store.get(handle).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_preserves_order_of_the_rest() {
        let store = TokenStore::in_memory();
        let a = store.add("A", GITHUB).unwrap().into_value();
        let b = store.add("B", GITHUB).unwrap().into_value();
        let c = store.add("C", GITHUB).unwrap().into_value();

        store.remove(b).unwrap().into_value();
        let labels: Vec<_> = store.snapshot().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, ["A", "C"]);
        assert_eq!(store.position(a), Some(0));
        assert_eq!(store.position(c), Some(1));
    }

    #[test]
    fn load_skips_invalid_records() {
        let store = TokenStore::in_memory();
        let report = store.load(&[
            TokenRecord::new("Broken", "!!not a secret!!"),
            TokenRecord::new("GitHub", GITHUB),
        ]);

        assert_eq!(report, LoadReport { loaded: 1, skipped: 1 });
        assert_eq!(store.snapshot()[0].label, "GitHub");
    }

    #[test]
    fn load_skips_blank_service_and_renormalizes() {
        let store = TokenStore::in_memory();
        let report = store.load(&[
            TokenRecord::new("  ", GITHUB),
            TokenRecord::new(" Mail ", "gezd gnbv gy3t qojq"),
        ]);

        assert_eq!(report, LoadReport { loaded: 1, skipped: 1 });
        assert_eq!(store.records(), vec![TokenRecord::new("Mail", "GEZDGNBVGY3TQOJQ")]);
    }

    #[test]
    fn load_does_not_save() {
        let (store, backend) = store_with_backend();
        store.load(&[TokenRecord::new("GitHub", GITHUB)]);
        assert_eq!(backend.save_count(), 0);
    }

    #[test]
    fn open_loads_from_backend() {
        let backend = MemoryPersistence::with_records(vec![
            TokenRecord::new("GitHub", GITHUB),
            TokenRecord::new("Bad", "x"),
        ]);
        let (store, report) = TokenStore::open(backend);
        assert_eq!(report, LoadReport { loaded: 1, skipped: 1 });
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_save_keeps_memory_state_and_reports_error() {
        let (store, backend) = store_with_backend();
        backend.set_fail_saves(true);

        let committed = store.add("GitHub", GITHUB).unwrap();
        assert!(!committed.is_persisted());
        assert!(matches!(committed.save_error, Some(VaultError::Io(_))));
        assert_eq!(store.len(), 1);
        assert!(backend.records().is_empty());

        backend.set_fail_saves(false);
        store.save().unwrap();
        assert_eq!(backend.records(), vec![TokenRecord::new("GitHub", GITHUB)]);
    }

    #[test]
    fn save_of_current_state_is_skipped_when_already_persisted() {
        let (store, backend) = store_with_backend();
        store.add("GitHub", GITHUB).unwrap().into_value();
        assert_eq!(backend.save_count(), 1);

        store.save().unwrap();
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn save_of_empty_store_writes_once() {
        let (store, backend) = store_with_backend();
        store.save().unwrap();
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn debug_output_does_not_leak_secrets() {
        let store = TokenStore::in_memory();
        store.add("GitHub", GITHUB).unwrap().into_value();
        let rendered = format!("{store:?} {:?}", store.entries());
        assert!(!rendered.contains(GITHUB));
    }
}
