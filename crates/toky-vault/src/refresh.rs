//! Periodic recomputation of every entry's code and countdown.
//!
//! The scheduler keeps no list of its own: each tick copies the live
//! entries out of the [`TokenStore`] (a short read lock), computes the
//! codes outside the lock, then publishes the resulting
//! [`CodeSnapshot`] sequence. Entries added or removed between ticks show
//! up on the next tick.
//!
//! [`RefreshScheduler::start`] runs the ticks on one background thread at
//! a fixed period (1 s by default). Deadlines are absolute, so the
//! cadence does not drift with the time spent computing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use toky_otp_core::totp;

use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::store::{EntryHandle, TokenEntry, TokenStore};

/// Default tick period.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

// ── Published data ─────────────────────────────────────────────────

/// Code and countdown for one entry at one tick. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnapshot {
    /// Entry identity.
    pub handle: EntryHandle,
    /// Ordinal position of the entry in the store at tick time.
    pub entry_index: usize,
    /// Label at tick time.
    pub label: String,
    /// 6-digit code, zero-padded.
    pub code: String,
    /// Seconds until the code rolls over, in `1..=30`.
    pub seconds_remaining: u32,
}

/// Receiver of each tick's snapshot sequence (e.g. a presentation layer).
pub trait CodeObserver: Send + Sync + 'static {
    /// Called once per tick with the codes of every live entry, in order.
    ///
    /// Returns `false` once the observer can no longer receive anything.
    fn publish(&self, codes: &[CodeSnapshot]) -> bool;
}

impl<F> CodeObserver for F
where
    F: Fn(&[CodeSnapshot]) + Send + Sync + 'static,
{
    fn publish(&self, codes: &[CodeSnapshot]) -> bool {
        self(codes);
        true
    }
}

impl CodeObserver for Sender<Vec<CodeSnapshot>> {
    fn publish(&self, codes: &[CodeSnapshot]) -> bool {
        self.send(codes.to_vec()).is_ok()
    }
}

/// Compute the snapshot for every entry at Unix time `now`.
///
/// An entry whose code cannot be computed is logged and left out; the
/// others are unaffected.
fn compute_codes(entries: &[TokenEntry], now: u64) -> Vec<CodeSnapshot> {
    let seconds_remaining = totp::seconds_remaining(now);
    entries
        .iter()
        .enumerate()
        .filter_map(|(entry_index, entry)| {
            match totp::current_code(entry.secret(), now) {
                Ok(code) => Some(CodeSnapshot {
                    handle: entry.handle(),
                    entry_index,
                    label: entry.label().to_owned(),
                    code,
                    seconds_remaining,
                }),
                Err(e) => {
                    tracing::error!(entry = %entry.handle(), error = %e, "skipping entry for this tick");
                    None
                }
            }
        })
        .collect()
}

// ── Scheduler ──────────────────────────────────────────────────────

/// Drives the per-second code refresh for a [`TokenStore`].
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    store: Arc<TokenStore>,
    interval: Duration,
    latest: Arc<RwLock<Arc<[CodeSnapshot]>>>,
}

impl RefreshScheduler {
    /// Scheduler ticking every [`DEFAULT_REFRESH_INTERVAL`].
    #[must_use]
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self::with_interval(store, DEFAULT_REFRESH_INTERVAL)
    }

    /// Scheduler with a custom period. A zero period falls back to the default.
    #[must_use]
    pub fn with_interval(store: Arc<TokenStore>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            interval
        };
        Self {
            store,
            interval,
            latest: Arc::new(RwLock::new(Arc::from(Vec::new()))),
        }
    }

    /// Scheduler using the period from `config`.
    #[must_use]
    pub fn from_config(store: Arc<TokenStore>, config: &VaultConfig) -> Self {
        Self::with_interval(store, config.refresh_interval())
    }

    /// Tick period.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Recompute every code at Unix time `now` and publish the result as
    /// [`RefreshScheduler::latest`].
    pub fn tick_at(&self, now: u64) -> Arc<[CodeSnapshot]> {
        let codes: Arc<[CodeSnapshot]> = compute_codes(&self.store.entries(), now).into();
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&codes);
        codes
    }

    /// [`RefreshScheduler::tick_at`] the current system time.
    pub fn tick(&self) -> Arc<[CodeSnapshot]> {
        self.tick_at(totp::unix_now())
    }

    /// Codes from the most recent tick (empty before the first one).
    #[must_use]
    pub fn latest(&self) -> Arc<[CodeSnapshot]> {
        Arc::clone(&self.latest.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Spawn the background thread: tick now, then once per period,
    /// handing every result to `observer`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the OS refuses to spawn the thread.
    pub fn start(&self, observer: impl CodeObserver) -> Result<RefreshHandle, VaultError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let scheduler = self.clone();

        let thread = thread::Builder::new()
            .name("toky-refresh".into())
            .spawn(move || scheduler.run(&observer, &flag))?;

        tracing::info!(interval_ms = self.interval.as_millis(), "code refresh started");
        Ok(RefreshHandle {
            cancel,
            thread: Some(thread),
        })
    }

    fn run(&self, observer: &impl CodeObserver, cancel: &AtomicBool) {
        let mut deadline = Instant::now();
        let mut observer_gone = false;
        while !cancel.load(Ordering::Relaxed) {
            let codes = self.tick();
            if !observer.publish(&codes) && !observer_gone {
                // Ticks continue so `latest()` stays fresh.
                tracing::debug!("code observer disconnected; keeping latest codes only");
                observer_gone = true;
            }

            deadline = deadline
                .checked_add(self.interval)
                .unwrap_or_else(Instant::now);
            let now = Instant::now();
            if deadline <= now {
                // Fell behind (suspend, overloaded host): resync instead of bursting.
                deadline = now;
                continue;
            }
            wait_until(deadline, cancel);
        }
    }
}

/// Park the current thread until `deadline` or until cancelled.
fn wait_until(deadline: Instant, cancel: &AtomicBool) {
    while !cancel.load(Ordering::Relaxed) {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        thread::park_timeout(remaining);
    }
}

/// Running refresh thread. Dropping the handle stops it.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// `true` while the background thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop ticking and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                tracing::error!("code refresh thread panicked");
            }
            tracing::info!("code refresh stopped");
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Tests ──────────────────────────────────────────────────────────
