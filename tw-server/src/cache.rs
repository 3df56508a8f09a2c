//! Request-coalescing track cache
//!
//! Concurrent requests for the same index range within the TTL share one
//! upstream fetch sequence. Entries are never refreshed in place: once stale
//! they are replaced by a new entry on the next access. Expiry is checked
//! lazily; there is no background sweep.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info};
use tw_common::api::RangeQuery;
use tw_common::EnrichedTrack;

use crate::services::{TrackEnricher, TrackFetchError};

/// A fetch every waiter can await; resolves once for all of them
pub type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct CacheEntry<V, E> {
    fetch: SharedFetch<V, E>,
    created_at: Instant,
}

/// Keyed cache of shared in-flight or completed fetches
pub struct CoalescingCache<K, V, E> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V, E>>>,
}

impl<K, V, E> CoalescingCache<K, V, E>
where
    K: Eq + Hash + Debug,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Attach to the live fetch for `key`, or register a new one built by
    /// `start`
    ///
    /// Lookup and registration share one critical section and `start` only
    /// builds the future, so the lock is never held across an await.
    pub fn get_or_create<F, Fut>(&self, key: K, start: F) -> SharedFetch<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get(&key) {
            if now.duration_since(entry.created_at) < self.ttl {
                debug!(?key, "Coalescing onto live fetch");
                return entry.fetch.clone();
            }
        }

        let ttl = self.ttl;
        entries.retain(|_, entry| now.duration_since(entry.created_at) < ttl);

        let fetch = start().boxed().shared();
        entries.insert(
            key,
            CacheEntry {
                fetch: fetch.clone(),
                created_at: now,
            },
        );
        fetch
    }

    /// Entries still inside their TTL
    pub fn live_entries(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| now.duration_since(entry.created_at) < self.ttl)
            .count()
    }
}

/// Tracks for one range, shared between coalesced callers
pub type TrackBatch = Arc<Vec<EnrichedTrack>>;

/// Range-keyed cache in front of the enricher
pub struct TrackSourceCache {
    enricher: Arc<TrackEnricher>,
    cache: CoalescingCache<RangeQuery, TrackBatch, TrackFetchError>,
    upstream_fetches: Arc<AtomicU64>,
}

impl TrackSourceCache {
    pub fn new(enricher: Arc<TrackEnricher>, ttl: Duration) -> Self {
        Self {
            enricher,
            cache: CoalescingCache::new(ttl),
            upstream_fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn enricher(&self) -> &Arc<TrackEnricher> {
        &self.enricher
    }

    /// Tracks for `range`, fetched at most once per key per TTL window
    ///
    /// A failed sequence is handed to every waiter and stays cached until
    /// its TTL lapses; the next caller after that retries.
    pub async fn tracks(&self, range: RangeQuery) -> Result<TrackBatch, TrackFetchError> {
        let enricher = Arc::clone(&self.enricher);
        let counter = Arc::clone(&self.upstream_fetches);

        self.cache
            .get_or_create(range, move || async move {
                counter.fetch_add(1, Ordering::Relaxed);
                info!(start = range.start, end = range.end, "Starting upstream fetch sequence");
                enricher.enrich_range(range.start, range.end).await.map(Arc::new)
            })
            .await
    }

    /// Number of upstream fetch sequences started so far
    pub fn upstream_fetches(&self) -> u64 {
        self.upstream_fetches.load(Ordering::Relaxed)
    }

    pub fn live_entries(&self) -> usize {
        self.cache.live_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    const TTL: Duration = Duration::from_millis(1000);

    type TestCache = CoalescingCache<&'static str, u32, String>;

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
        value: Result<u32, String>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, String>> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                value
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_fetch() {
        let cache = TestCache::new(TTL);
        let starts = Arc::new(AtomicUsize::new(0));

        let a = cache.get_or_create("0-5", counting_fetch(&starts, Ok(7)));
        let b = cache.get_or_create("0-5", counting_fetch(&starts, Ok(8)));
        let c = cache.get_or_create("0-5", counting_fetch(&starts, Ok(9)));

        let (a, b, c) = tokio::join!(a, b, c);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!((a, b, c), (Ok(7), Ok(7), Ok(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_fetch_reused_within_ttl() {
        let cache = TestCache::new(TTL);
        let starts = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_create("0-5", counting_fetch(&starts, Ok(1))).await, Ok(1));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.get_or_create("0-5", counting_fetch(&starts, Ok(2))).await, Ok(1));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_after_ttl_starts_new_fetch() {
        let cache = TestCache::new(TTL);
        let starts = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_create("0-5", counting_fetch(&starts, Ok(1))).await, Ok(1));
        tokio::time::advance(TTL).await;
        assert_eq!(cache.get_or_create("0-5", counting_fetch(&starts, Ok(2))).await, Ok(2));
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_literal() {
        let cache = TestCache::new(TTL);
        let starts = Arc::new(AtomicUsize::new(0));

        let a = cache.get_or_create("0-5", counting_fetch(&starts, Ok(1)));
        let b = cache.get_or_create("0-6", counting_fetch(&starts, Ok(2)));
        assert_eq!(tokio::join!(a, b), (Ok(1), Ok(2)));
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_shared_and_not_retried_until_expiry() {
        let cache = TestCache::new(TTL);
        let starts = Arc::new(AtomicUsize::new(0));

        let a = cache.get_or_create("0-5", counting_fetch(&starts, Err("down".to_string())));
        let b = cache.get_or_create("0-5", counting_fetch(&starts, Ok(1)));
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a, Err("down".to_string()));
        assert_eq!(b, Err("down".to_string()));

        let again = cache.get_or_create("0-5", counting_fetch(&starts, Ok(1))).await;
        assert_eq!(again, Err("down".to_string()));
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        tokio::time::advance(TTL).await;
        assert_eq!(cache.get_or_create("0-5", counting_fetch(&starts, Ok(1))).await, Ok(1));
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_waiter_attaches_to_pending_fetch() {
        let cache = TestCache::new(TTL);
        let (tx, rx) = oneshot::channel::<u32>();

        let first = cache.get_or_create("0-5", move || async move {
            rx.await.map_err(|e| e.to_string())
        });
        let second = cache.get_or_create("0-5", || async { Ok(99) });

        tx.send(42).unwrap();
        assert_eq!(tokio::join!(first, second), (Ok(42), Ok(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_dropped_on_access() {
        let cache = TestCache::new(TTL);
        let starts = Arc::new(AtomicUsize::new(0));

        cache.get_or_create("0-5", counting_fetch(&starts, Ok(1))).await.unwrap();
        cache.get_or_create("5-10", counting_fetch(&starts, Ok(2))).await.unwrap();
        assert_eq!(cache.live_entries(), 2);

        tokio::time::advance(TTL).await;
        assert_eq!(cache.live_entries(), 0);

        cache.get_or_create("10-15", counting_fetch(&starts, Ok(3))).await.unwrap();
        assert_eq!(cache.entries.lock().unwrap().len(), 1);
    }
}
