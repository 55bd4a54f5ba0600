//! Debounced cache invalidation.
//!
//! Change callbacks call [`DebouncedInvalidator::notify`] with the key sets
//! an event affects. A worker task collects them and, once the debounce
//! window closes, issues a single `QueryCache::invalidate` for the union.
//! This bounds refetch storms during bulk writes (imports, mass updates).

mod worker;

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{CacheKey, QueryCache};
use crate::constants::DEFAULT_DEBOUNCE_WINDOW;
use crate::errors::{Error, Result};

/// When a pending batch is flushed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebounceMode {
    /// The window opens on the first notification after a flush and is not
    /// extended. Worst-case latency is one window, even under sustained
    /// writes.
    #[default]
    FixedWindow,
    /// Every notification restarts the window; flushes only after a full
    /// window of silence. Can postpone invalidation indefinitely under a
    /// continuous write load.
    Trailing,
}

impl FromStr for DebounceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "fixed-window" | "fixed_window" => Ok(DebounceMode::FixedWindow),
            "trailing" => Ok(DebounceMode::Trailing),
            other => Err(Error::InvalidConfigValue(format!(
                "unknown debounce mode '{}'",
                other
            ))),
        }
    }
}

/// Debounce tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebounceConfig {
    pub window: Duration,
    pub mode: DebounceMode,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_DEBOUNCE_WINDOW,
            mode: DebounceMode::FixedWindow,
        }
    }
}

/// Coalesces bursts of change notifications into one cache invalidation per
/// window.
///
/// At most one window is open per invalidator. Dropping the invalidator
/// disposes it.
pub struct DebouncedInvalidator {
    tx: mpsc::UnboundedSender<Vec<CacheKey>>,
    /// `true` once disposed. The worker flushes while holding this lock.
    disposed: Arc<Mutex<bool>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedInvalidator {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(cache: Arc<dyn QueryCache>, config: DebounceConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let disposed = Arc::new(Mutex::new(false));
        let worker = runtime.spawn(worker::run(rx, cache, disposed.clone(), config));

        Ok(Self {
            tx,
            disposed,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Adds `keys` to the pending batch, opening a window if none is open.
    ///
    /// Never blocks. Ignored after [`dispose`](Self::dispose).
    pub fn notify<I>(&self, keys: I)
    where
        I: IntoIterator<Item = CacheKey>,
    {
        if self.is_disposed() {
            return;
        }
        let keys: Vec<CacheKey> = keys.into_iter().collect();
        if keys.is_empty() {
            return;
        }
        if self.tx.send(keys).is_err() {
            log::warn!("Invalidation worker is gone; dropping notification");
        }
    }

    /// Cancels the pending window without flushing.
    ///
    /// Once this returns the invalidator will not call the cache again.
    /// Calling it more than once is harmless.
    pub fn dispose(&self) {
        {
            let mut disposed = lock(&self.disposed);
            if *disposed {
                return;
            }
            *disposed = true;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        *lock(&self.disposed)
    }
}

impl Drop for DebouncedInvalidator {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock(flag: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
