//! Query cache seam.
//!
//! The query cache itself lives outside this crate (the frontend's query
//! client, or a bridge that forwards to it). This module defines the
//! hierarchical keys it understands and the single operation the realtime
//! layer is allowed to call on it.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Hierarchical cache key, e.g. `["leads"]` or `["leads", "123"]`.
///
/// A key covers every key it is a prefix of, so invalidating `["leads"]`
/// marks all lead queries stale.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Single-segment key.
    pub fn root(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Returns a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if invalidating `self` also invalidates `other`.
    pub fn covers(&self, other: &CacheKey) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Parses the `/`-separated form produced by `Display`.
impl FromStr for CacheKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.trim().split('/').map(str::trim).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::InvalidCacheKey(s.to_string()));
        }
        Ok(Self::new(segments))
    }
}

/// The invalidate side of an external query cache.
///
/// # Design Rules
///
/// - `invalidate()` only marks entries stale; it must not block on refetches
/// - It cannot fail; refetch errors belong to the cache and its consumers
/// - Implementations must tolerate overlapping keys from concurrent callers
pub trait QueryCache: Send + Sync {
    /// Marks every cached result under any of `keys` as stale.
    fn invalidate(&self, keys: &[CacheKey]);
}

/// No-op implementation for contexts without a cache.
#[derive(Clone, Default)]
pub struct NoOpQueryCache;

impl QueryCache for NoOpQueryCache {
    fn invalidate(&self, _keys: &[CacheKey]) {}
}

/// Test cache that records every invalidation call.
#[derive(Clone, Default)]
pub struct RecordingQueryCache {
    calls: Arc<Mutex<Vec<Vec<CacheKey>>>>,
}

impl RecordingQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every invalidation call, in order.
    pub fn calls(&self) -> Vec<Vec<CacheKey>> {
        self.lock().clone()
    }

    /// Returns the number of invalidation calls.
    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    /// True if some recorded call covers `key`.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.lock()
            .iter()
            .flatten()
            .any(|invalidated| invalidated.covers(key))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<CacheKey>>> {
        // A panicking test thread must not hide earlier calls from the others.
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueryCache for RecordingQueryCache {
    fn invalidate(&self, keys: &[CacheKey]) {
        self.lock().push(keys.to_vec());
    }
}
