//! Beacon identity resolution with a time-bounded cache.
//!
//! [`IdentityCache`] maps a beacon's canonical key to the anonymized
//! identifier returned by the lookup endpoint. Entries are served for
//! [`IDENTITY_TTL`] after the lookup that produced them. Concurrent misses
//! for the same beacon share one in-flight lookup, and failed lookups are
//! never cached.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tracer_core::identity::IdentityCache;
//! use tracer_core::mock::MockLookup;
//! use tracer_core::SystemClock;
//! use tracer_types::BeaconIdentity;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let beacon = BeaconIdentity::new("A", 1, 2).unwrap();
//! let lookup = Arc::new(MockLookup::new());
//! lookup.set_response(&beacon, "anon-1").await;
//!
//! let cache = IdentityCache::new(lookup.clone(), Arc::new(SystemClock));
//! assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-1"));
//! assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-1"));
//! assert_eq!(lookup.call_count(), 1);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tracer_types::BeaconIdentity;

use crate::traits::{Clock, IdentityLookup};

/// How long a resolved identifier is served without asking the endpoint again.
pub const IDENTITY_TTL: Duration = Duration::hours(24);

/// A lookup shared by every caller that missed on the same key.
type Flight = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    anonymous_id: String,
    last_update: OffsetDateTime,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, Flight>,
}

struct Inner {
    state: Mutex<CacheState>,
    lookup: Arc<dyn IdentityLookup>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    joined: AtomicU64,
    lookups: AtomicU64,
    failures: AtomicU64,
}

/// Counters describing cache behavior since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Resolutions answered from a fresh entry.
    pub hits: u64,
    /// Resolutions that waited on another caller's lookup.
    pub joined: u64,
    /// External lookups issued.
    pub lookups: u64,
    /// External lookups that produced no identifier.
    pub failures: u64,
}

/// Time-bounded, single-flight beacon identity cache.
///
/// Cloning the cache is cheap and clones share the same entries.
#[derive(Clone)]
pub struct IdentityCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl IdentityCache {
    /// Create an empty cache backed by `lookup`.
    pub fn new(lookup: Arc<dyn IdentityLookup>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::default()),
                lookup,
                clock,
                hits: AtomicU64::new(0),
                joined: AtomicU64::new(0),
                lookups: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Resolve a beacon to its anonymized identifier.
    ///
    /// Returns `None` when the lookup fails or yields no identifier; the
    /// next call for the same beacon will try again.
    pub async fn resolve(&self, beacon: &BeaconIdentity) -> Option<String> {
        let key = beacon.cache_key();
        let flight = {
            let mut state = self.inner.state.lock().await;
            let now = self.inner.clock.now();

            if let Some(entry) = state.entries.get(&key)
                && now - entry.last_update < IDENTITY_TTL
            {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.anonymous_id.clone());
            }

            match state.in_flight.get(&key).cloned() {
                Some(flight) => {
                    debug!("Joining in-flight lookup for {}", key);
                    self.inner.joined.fetch_add(1, Ordering::Relaxed);
                    flight
                }
                None => {
                    prune_stale(&mut state.entries, now);
                    let flight =
                        start_lookup(Arc::clone(&self.inner), key.clone(), beacon.clone(), now);
                    state.in_flight.insert(key, flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Number of entries currently stored, fresh or stale.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    /// Whether no entry is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            joined: self.inner.joined.load(Ordering::Relaxed),
            lookups: self.inner.lookups.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }
}

/// Drop entries that are no longer served.
fn prune_stale(entries: &mut HashMap<String, CacheEntry>, now: OffsetDateTime) {
    let before = entries.len();
    entries.retain(|_, entry| now - entry.last_update < IDENTITY_TTL);
    let pruned = before - entries.len();
    if pruned > 0 {
        debug!("Pruned {} stale identity entries", pruned);
    }
}

/// Build the shared lookup future for `key`.
///
/// The future stores its own outcome and removes itself from the in-flight
/// table, so the bookkeeping happens even if the caller that started it is
/// dropped while another caller keeps polling.
fn start_lookup(
    inner: Arc<Inner>,
    key: String,
    beacon: BeaconIdentity,
    requested_at: OffsetDateTime,
) -> Flight {
    async move {
        inner.lookups.fetch_add(1, Ordering::Relaxed);
        let outcome = inner.lookup.lookup(&beacon).await;

        let mut state = inner.state.lock().await;
        state.in_flight.remove(&key);

        match outcome {
            Ok(Some(anonymous_id)) if !anonymous_id.is_empty() => {
                debug!("Resolved {} to {}", key, anonymous_id);
                state.entries.insert(
                    key,
                    CacheEntry {
                        anonymous_id: anonymous_id.clone(),
                        last_update: requested_at,
                    },
                );
                Some(anonymous_id)
            }
            Ok(_) => {
                inner.failures.fetch_add(1, Ordering::Relaxed);
                debug!("Lookup for {} returned no identifier", key);
                None
            }
            Err(e) => {
                inner.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Lookup for {} failed: {}", key, e);
                None
            }
        }
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MockLookup};
    use futures::future::join_all;
    use time::macros::datetime;

    fn setup() -> (IdentityCache, Arc<MockLookup>, Arc<ManualClock>, BeaconIdentity) {
        let lookup = Arc::new(MockLookup::new());
        let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 08:00 UTC)));
        let cache = IdentityCache::new(lookup.clone(), clock.clone());
        let beacon = BeaconIdentity::new("A", 1, 2).unwrap();
        (cache, lookup, clock, beacon)
    }

    #[tokio::test]
    async fn test_resolve_hit_within_ttl() {
        let (cache, lookup, clock, beacon) = setup();
        lookup.set_response(&beacon, "anon-1").await;

        assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-1"));
        assert_eq!(lookup.call_count(), 1);

        clock.advance(Duration::hours(1));
        assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-1"));
        assert_eq!(lookup.call_count(), 1);

        clock.advance(Duration::hours(24));
        assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-1"));
        assert_eq!(lookup.call_count(), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.lookups, 2);
    }

    #[tokio::test]
    async fn test_stale_entry_is_overwritten() {
        let (cache, lookup, clock, beacon) = setup();
        lookup.set_response(&beacon, "anon-1").await;
        cache.resolve(&beacon).await;

        lookup.set_response(&beacon, "anon-2").await;
        clock.advance(Duration::hours(24));
        assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-2"));

        clock.advance(Duration::minutes(5));
        assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-2"));
        assert_eq!(lookup.call_count(), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_entries_pruned_on_miss() {
        let (cache, lookup, clock, beacon) = setup();
        let other = BeaconIdentity::new("A", 1, 3).unwrap();
        let fresh = BeaconIdentity::new("B", 7, 7).unwrap();
        lookup.set_response(&beacon, "anon-1").await;
        lookup.set_response(&other, "anon-2").await;
        lookup.set_response(&fresh, "anon-3").await;

        cache.resolve(&beacon).await;
        cache.resolve(&other).await;
        assert_eq!(cache.len().await, 2);

        clock.advance(Duration::hours(25));
        assert_eq!(cache.resolve(&fresh).await.as_deref(), Some("anon-3"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let (cache, lookup, _clock, beacon) = setup();
        lookup.set_response(&beacon, "anon-1").await;
        lookup.set_should_fail(true);

        assert_eq!(cache.resolve(&beacon).await, None);
        assert!(cache.is_empty().await);

        lookup.set_should_fail(false);
        assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-1"));
        assert_eq!(lookup.call_count(), 2);
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_not_cached() {
        let (cache, lookup, _clock, beacon) = setup();

        assert_eq!(cache.resolve(&beacon).await, None);
        assert_eq!(cache.resolve(&beacon).await, None);
        assert_eq!(lookup.call_count(), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_lookup() {
        let (cache, lookup, _clock, beacon) = setup();
        lookup.set_response(&beacon, "anon-1").await;
        lookup.set_latency(std::time::Duration::from_millis(50));

        let results = join_all((0..8).map(|_| cache.resolve(&beacon))).await;

        assert!(results.iter().all(|r| r.as_deref() == Some("anon-1")));
        assert_eq!(lookup.call_count(), 1);
        assert_eq!(cache.stats().joined, 7);
    }

    #[tokio::test]
    async fn test_concurrent_failure_is_shared_then_retried() {
        let (cache, lookup, _clock, beacon) = setup();
        lookup.set_response(&beacon, "anon-1").await;
        lookup.set_latency(std::time::Duration::from_millis(20));
        lookup.set_transient_failures(1);

        let results = join_all((0..3).map(|_| cache.resolve(&beacon))).await;
        assert!(results.iter().all(Option::is_none));
        assert_eq!(lookup.call_count(), 1);

        assert_eq!(cache.resolve(&beacon).await.as_deref(), Some("anon-1"));
        assert_eq!(lookup.call_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_beacons_do_not_share_flights() {
        let (cache, lookup, _clock, beacon) = setup();
        let other = BeaconIdentity::new("A", 1, 3).unwrap();
        lookup.set_response(&beacon, "anon-1").await;
        lookup.set_response(&other, "anon-2").await;
        lookup.set_latency(std::time::Duration::from_millis(10));

        let (a, b) = tokio::join!(cache.resolve(&beacon), cache.resolve(&other));
        assert_eq!(a.as_deref(), Some("anon-1"));
        assert_eq!(b.as_deref(), Some("anon-2"));
        assert_eq!(lookup.call_count(), 2);
    }
}
