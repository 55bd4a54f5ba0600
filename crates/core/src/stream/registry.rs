//! Subscription bookkeeping shared by change stream implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::{ChangeCallback, ReleaseSubscription, SubscriptionId, SubscriptionSpec};
use crate::events::ChangeEvent;

/// Holds the callback of one subscription.
///
/// Delivery and close take the same lock, so after `close()` returns the
/// callback is neither running nor reachable.
pub struct DeliverySlot {
    callback: Mutex<Option<ChangeCallback>>,
}

impl DeliverySlot {
    pub fn new(callback: ChangeCallback) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Invokes the callback if the slot is still open.
    pub fn deliver(&self, event: &ChangeEvent) -> bool {
        match self.lock().as_ref() {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    /// Closes the slot. Returns true only for the call that closed it.
    pub fn close(&self) -> bool {
        self.lock().take().is_some()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ChangeCallback>> {
        self.callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Entry {
    spec: Arc<SubscriptionSpec>,
    slot: Arc<DeliverySlot>,
}

/// Live subscriptions of one change stream, keyed by id.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback and returns its id, spec and delivery slot.
    pub fn register(
        &self,
        spec: SubscriptionSpec,
        callback: ChangeCallback,
    ) -> (SubscriptionId, Arc<SubscriptionSpec>, Arc<DeliverySlot>) {
        let id = SubscriptionId::new();
        let spec = Arc::new(spec);
        let slot = Arc::new(DeliverySlot::new(callback));
        self.write().insert(
            id,
            Entry {
                spec: spec.clone(),
                slot: slot.clone(),
            },
        );
        (id, spec, slot)
    }

    /// Removes a subscription, closing its slot.
    pub fn remove(&self, id: SubscriptionId) -> Option<Arc<SubscriptionSpec>> {
        let entry = self.write().remove(&id)?;
        entry.slot.close();
        Some(entry.spec)
    }

    /// Delivers `event` to every matching subscription. Returns how many
    /// callbacks ran.
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        // Collect first so callbacks may subscribe or unsubscribe freely.
        let targets: Vec<Arc<DeliverySlot>> = self
            .read()
            .values()
            .filter(|entry| entry.spec.matches(event))
            .map(|entry| entry.slot.clone())
            .collect();

        targets.iter().filter(|slot| slot.deliver(event)).count()
    }

    /// Delivers `event` to one subscription if it matches its spec.
    pub fn deliver_to(&self, id: SubscriptionId, event: &ChangeEvent) -> bool {
        let slot = {
            let entries = self.read();
            match entries.get(&id) {
                Some(entry) if entry.spec.matches(event) => entry.slot.clone(),
                _ => return false,
            }
        };
        slot.deliver(event)
    }

    pub fn spec(&self, id: SubscriptionId) -> Option<Arc<SubscriptionSpec>> {
        self.read().get(&id).map(|entry| entry.spec.clone())
    }

    /// Snapshot of every live subscription.
    pub fn specs(&self) -> Vec<(SubscriptionId, Arc<SubscriptionSpec>)> {
        self.read()
            .iter()
            .map(|(id, entry)| (*id, entry.spec.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReleaseSubscription for SubscriptionRegistry {
    fn release(&self, id: SubscriptionId) {
        self.remove(id);
    }
}
