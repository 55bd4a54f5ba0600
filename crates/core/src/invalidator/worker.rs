//! Invalidation worker.
//!
//! Receives key sets from an mpsc channel, accumulates them while a window is
//! open and invalidates the union when the window closes.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::{DebounceConfig, DebounceMode};
use crate::cache::{CacheKey, QueryCache};

/// Key sets collected during the current window.
#[derive(Default)]
struct PendingBatch {
    keys: Vec<CacheKey>,
    deadline: Option<Instant>,
}

impl PendingBatch {
    /// Union, keeping first-seen order.
    fn add(&mut self, keys: Vec<CacheKey>) {
        for key in keys {
            if !self.keys.contains(&key) {
                self.keys.push(key);
            }
        }
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.deadline = None;
    }
}

/// Runs until the sender side is dropped or the task is aborted. Neither
/// path flushes the pending batch.
pub(super) async fn run(
    mut rx: mpsc::UnboundedReceiver<Vec<CacheKey>>,
    cache: Arc<dyn QueryCache>,
    disposed: Arc<Mutex<bool>>,
    config: DebounceConfig,
) {
    let mut pending = PendingBatch::default();

    loop {
        let Some(deadline) = pending.deadline else {
            // Quiet period: wait for the first notification.
            match rx.recv().await {
                Some(keys) => {
                    pending.add(keys);
                    pending.deadline = Some(Instant::now() + config.window);
                    continue;
                }
                None => return,
            }
        };

        tokio::select! {
            received = rx.recv() => match received {
                Some(keys) => {
                    pending.add(keys);
                    if config.mode == DebounceMode::Trailing {
                        pending.deadline = Some(Instant::now() + config.window);
                    }
                }
                None => {
                    log::debug!(
                        "Invalidator closed with {} pending key set(s); discarding",
                        pending.keys.len()
                    );
                    return;
                }
            },
            _ = sleep_until(deadline) => {
                flush(&mut pending, cache.as_ref(), &disposed);
            }
        }
    }
}

/// Invalidates the batch, then clears the keys, then the deadline. Anything
/// still queued in the channel starts a fresh window afterwards.
fn flush(pending: &mut PendingBatch, cache: &dyn QueryCache, disposed: &Mutex<bool>) {
    let disposed = disposed
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if *disposed {
        pending.clear();
        return;
    }

    log::debug!("Invalidating {} cache key set(s)", pending.keys.len());
    cache.invalidate(&pending.keys);
    pending.clear();
}
