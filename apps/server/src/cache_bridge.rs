//! Query cache that forwards invalidations to browser clients.

use salesflow_core::{CacheKey, QueryCache};
use serde_json::json;

use crate::events::{EventBus, ServerEvent, CACHE_INVALIDATE};

/// Publishes each invalidation batch as a `cache:invalidate` event whose
/// payload is the list of keys, e.g. `[["leads"],["lead-stats"]]`.
#[derive(Clone)]
pub struct EventBusQueryCache {
    bus: EventBus,
}

impl EventBusQueryCache {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl QueryCache for EventBusQueryCache {
    fn invalidate(&self, keys: &[CacheKey]) {
        tracing::debug!(
            keys = keys.len(),
            listeners = self.bus.listener_count(),
            "Forwarding cache invalidation"
        );
        self.bus
            .publish(ServerEvent::new(CACHE_INVALIDATE, json!(keys)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalidation_is_published_as_key_arrays() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let cache = EventBusQueryCache::new(bus);

        cache.invalidate(&[CacheKey::root("leads"), CacheKey::new(["leads", "team-7"])]);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, CACHE_INVALIDATE);
        assert_eq!(event.payload, json!([["leads"], ["leads", "team-7"]]));
    }

    #[test]
    fn test_invalidate_without_listeners_is_harmless() {
        let cache = EventBusQueryCache::new(EventBus::new(8));
        cache.invalidate(&[CacheKey::root("leaderboard")]);
    }
}
