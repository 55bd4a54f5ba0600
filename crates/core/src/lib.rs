//! SalesFlow Core - Realtime cache synchronization.
//!
//! This crate turns backend row-change notifications into query-cache
//! invalidations. It defines the change stream seam, the debounced
//! invalidator and the per-feature subscription hooks. Transports that talk
//! to a real backend live in `salesflow-realtime`.

pub mod cache;
pub mod constants;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod invalidator;
pub mod stream;

pub use cache::{CacheKey, QueryCache};
pub use events::{ChangeEvent, ChangeKind, EventFilter, RowFilter};
pub use hooks::{HookState, HookSummary, MountedHook, RealtimeHook};
pub use invalidator::{DebounceConfig, DebounceMode, DebouncedInvalidator};
pub use stream::{ChangeStream, SubscriptionHandle, SubscriptionSpec};

// Re-export error types
pub use errors::Error;
pub use errors::Result;
