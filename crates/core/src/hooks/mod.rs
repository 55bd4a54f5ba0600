//! Subscription hooks.
//!
//! A hook bundles change-stream subscriptions with the cache key sets each
//! one invalidates, scoped to the lifetime of whatever mounted it (a view,
//! a session, the bridge server). Mounting subscribes; unmounting
//! unsubscribes and disposes the hook's invalidator.

mod gamification;
mod leads;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::cache::{CacheKey, QueryCache};
use crate::events::ChangeEvent;
use crate::invalidator::{DebounceConfig, DebouncedInvalidator};
use crate::stream::{ChangeCallback, ChangeStream, SubscriptionHandle, SubscriptionSpec};

pub use gamification::{gamification_hook, GAMIFICATION_CHANNEL, GAMIFICATION_HOOK};
pub use leads::{leads_hook, LEADS_CHANNEL, LEADS_HOOK};

/// One subscription and the key sets its events invalidate.
#[derive(Clone, Debug)]
pub struct Binding {
    pub subscription: SubscriptionSpec,
    pub keys: Vec<CacheKey>,
}

/// Lifecycle of a mounted hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookState {
    Unmounted,
    Mounting,
    Subscribed,
}

/// Declarative hook definition; [`mount`](Self::mount) brings it to life.
#[derive(Clone, Debug)]
pub struct RealtimeHook {
    name: String,
    bindings: Vec<Binding>,
}

impl RealtimeHook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    /// Adds a subscription whose events invalidate `keys`.
    pub fn bind<I>(mut self, subscription: SubscriptionSpec, keys: I) -> Self
    where
        I: IntoIterator<Item = CacheKey>,
    {
        self.bindings.push(Binding {
            subscription,
            keys: keys.into_iter().collect(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Subscribes every binding and routes its events through a fresh
    /// debounced invalidator.
    ///
    /// Setup problems are logged and never fail the mount: the hook still
    /// reaches `Subscribed`, it just delivers nothing.
    pub fn mount(
        &self,
        stream: &dyn ChangeStream,
        cache: Arc<dyn QueryCache>,
        config: DebounceConfig,
    ) -> MountedHook {
        let mut mounted = MountedHook {
            name: self.name.clone(),
            tables: self
                .bindings
                .iter()
                .map(|b| b.subscription.table.clone())
                .collect(),
            state: Mutex::new(HookState::Mounting),
            handles: Mutex::new(Vec::new()),
            invalidator: None,
        };

        let invalidator = match DebouncedInvalidator::spawn(cache, config) {
            Ok(invalidator) => Arc::new(invalidator),
            Err(e) => {
                log::warn!("Hook '{}' mounted without invalidator: {}", self.name, e);
                *mounted.lock_state() = HookState::Subscribed;
                return mounted;
            }
        };

        let handles: Vec<SubscriptionHandle> = self
            .bindings
            .iter()
            .map(|binding| {
                let target = invalidator.clone();
                let keys = binding.keys.clone();
                let on_event: ChangeCallback = Arc::new(move |event: &ChangeEvent| {
                    log::trace!("{} on {} -> {} key set(s)", event.kind, event.table, keys.len());
                    target.notify(keys.iter().cloned());
                });
                stream.subscribe(binding.subscription.clone(), on_event)
            })
            .collect();

        log::debug!(
            "Hook '{}' subscribed to {} table(s)",
            self.name,
            handles.len()
        );

        mounted.invalidator = Some(invalidator);
        *mounted.lock_handles() = handles;
        *mounted.lock_state() = HookState::Subscribed;
        mounted
    }
}

/// Serializable view of a mounted hook.
#[derive(Clone, Debug, Serialize)]
pub struct HookSummary {
    pub name: String,
    pub state: HookState,
    pub tables: Vec<String>,
    pub active_subscriptions: usize,
}

/// A live hook. Dropping it unmounts.
pub struct MountedHook {
    name: String,
    tables: Vec<String>,
    state: Mutex<HookState>,
    handles: Mutex<Vec<SubscriptionHandle>>,
    invalidator: Option<Arc<DebouncedInvalidator>>,
}

impl MountedHook {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> HookState {
        *self.lock_state()
    }

    /// Unsubscribes everything and cancels any pending invalidation.
    ///
    /// Safe to call repeatedly, and safe when nothing was ever subscribed.
    pub fn unmount(&self) {
        let handles = std::mem::take(&mut *self.lock_handles());
        for handle in &handles {
            handle.unsubscribe();
        }
        if let Some(invalidator) = &self.invalidator {
            invalidator.dispose();
        }

        let mut state = self.lock_state();
        if *state != HookState::Unmounted {
            log::debug!("Hook '{}' unmounted", self.name);
            *state = HookState::Unmounted;
        }
    }

    pub fn summary(&self) -> HookSummary {
        HookSummary {
            name: self.name.clone(),
            state: self.state(),
            tables: self.tables.clone(),
            active_subscriptions: self
                .lock_handles()
                .iter()
                .filter(|handle| handle.is_active())
                .count(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<SubscriptionHandle>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for MountedHook {
    fn drop(&mut self) {
        self.unmount();
    }
}
