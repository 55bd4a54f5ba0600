//! In-process change stream.

use std::sync::Arc;

use super::{ChangeCallback, ChangeStream, SubscriptionHandle, SubscriptionRegistry, SubscriptionSpec};
use crate::events::ChangeEvent;

/// Change stream fed by [`publish`](Self::publish) instead of a backend.
///
/// Delivery is synchronous on the publishing thread, in publish order.
#[derive(Clone, Default)]
pub struct InMemoryChangeStream {
    registry: Arc<SubscriptionRegistry>,
}

impl InMemoryChangeStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every matching subscriber. Returns the number of
    /// subscribers reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.registry.dispatch(&event)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }
}

impl ChangeStream for InMemoryChangeStream {
    fn subscribe(&self, spec: SubscriptionSpec, on_event: ChangeCallback) -> SubscriptionHandle {
        let (id, spec, slot) = self.registry.register(spec, on_event);
        SubscriptionHandle::new(id, spec, slot, self.registry.clone())
    }
}
