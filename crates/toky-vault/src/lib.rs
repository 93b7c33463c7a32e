//! `toky-vault` — Token store, JSON persistence and code refresh for Toky.
//!
//! [`TokenStore`] owns the ordered entry list and validates every change
//! through `toky-otp-core`. [`TokenFile`] keeps the list on disk as a
//! JSON array. [`RefreshScheduler`] recomputes every code once per second
//! and hands the result to a [`CodeObserver`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod config;
pub mod error;
pub mod persistence;
pub mod refresh;
pub mod store;

pub use config::{VaultConfig, CONFIG_FILE};
pub use error::VaultError;
pub use persistence::{MemoryPersistence, TokenFile, TokenPersistence, TokenRecord, TOKENS_FILE};
pub use refresh::{
    CodeObserver, CodeSnapshot, RefreshHandle, RefreshScheduler, DEFAULT_REFRESH_INTERVAL,
};
pub use store::{Committed, EntryEdit, EntryHandle, EntrySummary, LoadReport, TokenStore};
