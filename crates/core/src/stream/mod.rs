//! Change stream seam.
//!
//! A change stream delivers row-change events for subscribed tables. The
//! backend client is constructed explicitly and handed around as
//! `Arc<dyn ChangeStream>`, so hooks run the same against the realtime
//! transport and against [`InMemoryChangeStream`] in tests.

mod memory;
mod registry;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::constants::DEFAULT_SCHEMA;
use crate::events::{ChangeEvent, EventFilter};

pub use memory::InMemoryChangeStream;
pub use registry::{DeliverySlot, SubscriptionRegistry};

/// Callback invoked for each matching change event.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Identifier of one registration on a change stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What to subscribe to.
///
/// `channel` names the purpose of the subscription (e.g. `leads-changes`);
/// transports use it to label the upstream channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub channel: String,
    pub schema: String,
    pub table: String,
    pub filter: EventFilter,
}

impl SubscriptionSpec {
    /// All events on `table` in the default schema.
    pub fn new(channel: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            filter: EventFilter::all(),
        }
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.schema == event.schema && self.table == event.table && self.filter.matches(event)
    }
}

/// Releases the transport-side resources of a subscription.
pub trait ReleaseSubscription: Send + Sync {
    fn release(&self, id: SubscriptionId);
}

/// Registration with a change stream; cancelling it stops delivery.
///
/// Dropping the handle unsubscribes.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    spec: Arc<SubscriptionSpec>,
    slot: Arc<DeliverySlot>,
    releaser: Arc<dyn ReleaseSubscription>,
}

impl SubscriptionHandle {
    pub fn new(
        id: SubscriptionId,
        spec: Arc<SubscriptionSpec>,
        slot: Arc<DeliverySlot>,
        releaser: Arc<dyn ReleaseSubscription>,
    ) -> Self {
        Self {
            id,
            spec,
            slot,
            releaser,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_open()
    }

    /// Stops delivery and releases the upstream channel.
    ///
    /// Idempotent. Once this returns no callback for this subscription is
    /// running or will run. Must not be called from inside this
    /// subscription's own callback.
    pub fn unsubscribe(&self) {
        if self.slot.close() {
            log::debug!(
                "Unsubscribed {} from {}.{}",
                self.id,
                self.spec.schema,
                self.spec.table
            );
            self.releaser.release(self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Source of row-change events.
///
/// # Design Rules
///
/// - `subscribe()` must not block; connecting happens in the background
/// - Connection failures are logged, never returned: a dead stream only
///   means caches stay stale until the next refetch
/// - Events of one subscription are delivered in backend emission order
pub trait ChangeStream: Send + Sync {
    fn subscribe(&self, spec: SubscriptionSpec, on_event: ChangeCallback) -> SubscriptionHandle;
}
