use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use model::{Document, HealthStatus, QueryResponse};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};
use transport::TransportError;

use crate::metrics::Metrics;
use crate::task::TaskHandle;

/// Logical resource names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Documents,
    Document(String),
    Health,
    Query(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Documents => f.write_str("documents"),
            Self::Document(id) => write!(f, "documents/{}", id),
            Self::Health => f.write_str("health"),
            Self::Query(id) => write!(f, "query/{}", id),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Documents(Arc<Vec<Document>>),
    Document(Arc<Document>),
    Health(HealthStatus),
    Query(Arc<QueryResponse>),
}

impl CachedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Documents(_) => "documents",
            Self::Document(_) => "document",
            Self::Health(_) => "health",
            Self::Query(_) => "query",
        }
    }

    pub fn into_documents(self) -> Option<Arc<Vec<Document>>> {
        match self {
            Self::Documents(documents) => Some(documents),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<Arc<Document>> {
        match self {
            Self::Document(document) => Some(document),
            _ => None,
        }
    }

    pub fn into_health(self) -> Option<HealthStatus> {
        match self {
            Self::Health(status) => Some(status),
            _ => None,
        }
    }

    pub fn into_query(self) -> Option<Arc<QueryResponse>> {
        match self {
            Self::Query(response) => Some(response),
            _ => None,
        }
    }
}

/// Last known value of one key. Replaced whole, never edited in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: CachedValue,
    pub fetched_at: Instant,
    pub stale_after: Duration,
    invalidated: bool,
    generation: u64,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// A zero window means the entry is stale as soon as it is written.
    pub fn is_stale(&self) -> bool {
        self.invalidated || self.stale_after.is_zero() || self.age() > self.stale_after
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

struct Slot {
    entry: Option<CacheEntry>,
    /// Responses from generations below this were issued before an
    /// invalidation, or before the slot existed, and are dropped.
    floor: u64,
    refreshing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub stale_entries: usize,
    pub invalidated_entries: usize,
}

/// Keyed stale-while-revalidate cache shared by every reader of server data.
///
/// Writes for a key are ordered by request generation rather than by
/// completion time: a response is kept only if no newer request for the
/// same key has already landed and the key has not been invalidated since
/// the request was issued. Generations come from one store-wide counter,
/// so a slot recreated after eviction still rejects responses to requests
/// issued before it.
pub struct CacheStore {
    slots: DashMap<CacheKey, Slot>,
    generation: AtomicU64,
    max_entries: usize,
    metrics: Arc<Metrics>,
}

impl CacheStore {
    pub fn new(max_entries: usize, metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            slots: DashMap::new(),
            generation: AtomicU64::new(0),
            max_entries: max_entries.max(1),
            metrics,
        })
    }

    fn slot(&self, key: &CacheKey) -> RefMut<'_, CacheKey, Slot> {
        self.slots.entry(key.clone()).or_insert_with(|| Slot {
            entry: None,
            floor: self.generation.load(Ordering::SeqCst) + 1,
            refreshing: false,
        })
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn read(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.slots.get(key).and_then(|slot| slot.entry.clone())
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.read(key).is_none_or(|entry| entry.is_stale())
    }

    /// Stores a server response unconditionally. Older in-flight requests
    /// for the key will be discarded when they complete.
    pub fn write(&self, key: CacheKey, value: CachedValue, stale_after: Duration) {
        self.evict_if_full(&key);
        let mut slot = self.slot(&key);
        let generation = self.next_generation();
        slot.entry = Some(CacheEntry {
            key,
            value,
            fetched_at: Instant::now(),
            stale_after,
            invalidated: false,
            generation,
        });
    }

    /// Forces the next read of `key` to fetch, and drops any response
    /// still in flight for it.
    pub fn invalidate(&self, key: &CacheKey) {
        let mut slot = self.slot(key);
        slot.floor = self.generation.load(Ordering::SeqCst) + 1;
        if let Some(entry) = slot.entry.as_mut() {
            entry.invalidated = true;
        }
        debug!(key = %key, "Invalidated cache key");
    }

    /// Hands out a generation token for a request about to be issued.
    pub fn begin_fetch(&self, key: &CacheKey) -> u64 {
        let _slot = self.slot(key);
        self.next_generation()
    }

    /// Applies a fetched value if its request has not been superseded.
    /// Returns whether the value was stored.
    pub fn complete_fetch(
        &self,
        key: &CacheKey,
        token: u64,
        value: CachedValue,
        stale_after: Duration,
    ) -> bool {
        self.evict_if_full(key);
        let mut slot = self.slot(key);

        let superseded = token < slot.floor
            || slot
                .entry
                .as_ref()
                .is_some_and(|entry| token <= entry.generation);
        if superseded {
            drop(slot);
            self.metrics.record_discarded_response();
            debug!(key = %key, token = token, "Discarding superseded response");
            return false;
        }

        slot.entry = Some(CacheEntry {
            key: key.clone(),
            value,
            fetched_at: Instant::now(),
            stale_after,
            invalidated: false,
            generation: token,
        });
        true
    }

    /// Returns the cached value for `key`, fetching when needed.
    ///
    /// Fresh entries are returned as is. Stale entries are returned
    /// immediately while a single background refetch runs. Missing or
    /// invalidated entries are fetched before returning.
    pub async fn fetch<F, Fut>(
        self: &Arc<Self>,
        key: CacheKey,
        stale_after: Duration,
        fetcher: F,
    ) -> Result<CachedValue, TransportError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CachedValue, TransportError>> + Send + 'static,
    {
        match self.read(&key) {
            Some(entry) if !entry.is_stale() => {
                self.metrics.record_cache_hit();
                return Ok(entry.value);
            }
            Some(entry) if !entry.is_invalidated() => {
                self.metrics.record_cache_hit();
                self.spawn_refetch(key, stale_after, fetcher);
                return Ok(entry.value);
            }
            _ => self.metrics.record_cache_miss(),
        }

        let token = self.begin_fetch(&key);
        let value = fetcher().await?;
        if self.complete_fetch(&key, token, value.clone(), stale_after) {
            return Ok(value);
        }

        // A newer response landed first; prefer it unless it was invalidated.
        match self.read(&key) {
            Some(entry) if !entry.is_invalidated() => Ok(entry.value),
            _ => Ok(value),
        }
    }

    fn spawn_refetch<F, Fut>(self: &Arc<Self>, key: CacheKey, stale_after: Duration, fetcher: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CachedValue, TransportError>> + Send + 'static,
    {
        let token = {
            let mut slot = self.slot(&key);
            if slot.refreshing {
                return;
            }
            slot.refreshing = true;
            self.next_generation()
        };
        self.metrics.record_background_refetch();
        debug!(key = %key, token = token, "Revalidating stale entry");

        let store = Arc::clone(self);
        tokio::spawn(async move {
            match fetcher().await {
                Ok(value) => {
                    store.complete_fetch(&key, token, value, stale_after);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Background refetch failed, keeping last value");
                }
            }
            if let Some(mut slot) = store.slots.get_mut(&key) {
                slot.refreshing = false;
            }
        });
    }

    /// Refetches `key` every `period`, starting immediately. The poller
    /// holds only a weak reference and stops when the handle is dropped.
    pub fn refetch_every<F, Fut>(
        self: &Arc<Self>,
        key: CacheKey,
        period: Duration,
        stale_after: Duration,
        fetcher: F,
    ) -> TaskHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CachedValue, TransportError>> + Send + 'static,
    {
        let store = Arc::downgrade(self);
        TaskHandle::spawn("cache_refetch_interval", async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let token = store.begin_fetch(&key);
                match fetcher().await {
                    Ok(value) => {
                        store.complete_fetch(&key, token, value, stale_after);
                    }
                    Err(e) => warn!(key = %key, error = %e, "Interval refetch failed"),
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            entries: 0,
            stale_entries: 0,
            invalidated_entries: 0,
        };
        for slot in self.slots.iter() {
            if let Some(entry) = &slot.entry {
                stats.entries += 1;
                if entry.is_stale() {
                    stats.stale_entries += 1;
                }
                if entry.is_invalidated() {
                    stats.invalidated_entries += 1;
                }
            }
        }
        stats
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Simple eviction: drop the oldest quarter of entries when full.
    fn evict_if_full(&self, incoming: &CacheKey) {
        if self.slots.len() < self.max_entries || self.slots.contains_key(incoming) {
            return;
        }

        let mut by_age: Vec<(CacheKey, Instant)> = self
            .slots
            .iter()
            .filter(|slot| !slot.refreshing)
            .filter_map(|slot| slot.entry.as_ref().map(|e| (slot.key().clone(), e.fetched_at)))
            .collect();
        by_age.sort_by_key(|(_, fetched_at)| *fetched_at);

        for (key, _) in by_age.into_iter().take((self.max_entries / 4).max(1)) {
            self.slots.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::SubsystemState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> Arc<CacheStore> {
        CacheStore::new(100, Metrics::new())
    }

    fn health(ollama: SubsystemState) -> CachedValue {
        CachedValue::Health(HealthStatus {
            ollama,
            ..HealthStatus::default()
        })
    }

    fn ollama_of(value: CachedValue) -> SubsystemState {
        value.into_health().unwrap().ollama
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_window() {
        let cache = store();
        assert!(cache.is_stale(&CacheKey::Health));

        cache.write(CacheKey::Health, health(SubsystemState::Available), Duration::from_secs(10));
        assert!(!cache.is_stale(&CacheKey::Health));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.is_stale(&CacheKey::Health));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_skips_fetcher() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.write(CacheKey::Health, health(SubsystemState::Available), Duration::from_secs(10));

        let counter = Arc::clone(&calls);
        let value = cache
            .fetch(CacheKey::Health, Duration::from_secs(10), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(health(SubsystemState::Error))
            })
            .await
            .unwrap();

        assert_eq!(ollama_of(value), SubsystemState::Available);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_is_served_while_revalidating() {
        let cache = store();
        cache.write(CacheKey::Health, health(SubsystemState::Available), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(11)).await;

        let value = cache
            .fetch(CacheKey::Health, Duration::from_secs(10), || async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(health(SubsystemState::Unavailable))
            })
            .await
            .unwrap();
        assert_eq!(ollama_of(value), SubsystemState::Available);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let entry = cache.read(&CacheKey::Health).unwrap();
        assert_eq!(ollama_of(entry.value.clone()), SubsystemState::Unavailable);
        assert!(!entry.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_background_refetch_per_key() {
        let metrics = Metrics::new();
        let cache = CacheStore::new(100, Arc::clone(&metrics));
        cache.write(CacheKey::Documents, CachedValue::Documents(Arc::new(vec![])), Duration::ZERO);

        for _ in 0..3 {
            cache
                .fetch(CacheKey::Documents, Duration::ZERO, || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(CachedValue::Documents(Arc::new(vec![])))
                })
                .await
                .unwrap();
        }

        assert_eq!(metrics.snapshot().background_refetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidated_entry_fetches_in_foreground() {
        let cache = store();
        cache.write(CacheKey::Health, health(SubsystemState::Available), Duration::from_secs(300));
        cache.invalidate(&CacheKey::Health);
        assert!(cache.is_stale(&CacheKey::Health));

        let value = cache
            .fetch(CacheKey::Health, Duration::from_secs(300), || async {
                Ok(health(SubsystemState::Error))
            })
            .await
            .unwrap();

        assert_eq!(ollama_of(value), SubsystemState::Error);
        assert!(!cache.read(&CacheKey::Health).unwrap().is_invalidated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_completion_keeps_newest() {
        let cache = store();
        let key = CacheKey::Health;

        let older = cache.begin_fetch(&key);
        let newer = cache.begin_fetch(&key);

        assert!(cache.complete_fetch(&key, newer, health(SubsystemState::Available), Duration::from_secs(10)));
        assert!(!cache.complete_fetch(&key, older, health(SubsystemState::Error), Duration::from_secs(10)));

        assert_eq!(ollama_of(cache.read(&key).unwrap().value), SubsystemState::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_drops_in_flight_response() {
        let cache = store();
        let key = CacheKey::Documents;
        cache.write(key.clone(), CachedValue::Documents(Arc::new(vec![])), Duration::from_secs(60));

        let in_flight = cache.begin_fetch(&key);
        cache.invalidate(&key);

        assert!(!cache.complete_fetch(&key, in_flight, CachedValue::Documents(Arc::new(vec![])), Duration::from_secs(60)));
        assert!(cache.read(&key).unwrap().is_invalidated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_key_rejects_older_in_flight_response() {
        let cache = CacheStore::new(4, Metrics::new());
        let key = CacheKey::Documents;
        let window = Duration::from_secs(60);
        cache.write(key.clone(), CachedValue::Documents(Arc::new(vec![])), window);
        let in_flight = cache.begin_fetch(&key);

        for id in 1..=4 {
            tokio::time::advance(Duration::from_secs(1)).await;
            cache.write(CacheKey::Document(id.to_string()), health(SubsystemState::Available), window);
        }
        assert!(cache.read(&key).is_none());

        assert!(!cache.complete_fetch(&key, in_flight, CachedValue::Documents(Arc::new(vec![])), window));
        assert!(cache.read(&key).is_none());

        let fresh = cache.begin_fetch(&key);
        assert!(cache.complete_fetch(&key, fresh, CachedValue::Documents(Arc::new(vec![])), window));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_every_until_dropped() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = cache.refetch_every(
            CacheKey::Health,
            Duration::from_secs(30),
            Duration::from_secs(10),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(health(SubsystemState::Available))
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(cache.read(&CacheKey::Health).is_some());

        drop(handle);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_drops_oldest() {
        let cache = CacheStore::new(4, Metrics::new());
        for i in 0..4 {
            cache.write(
                CacheKey::Query(format!("q{}", i)),
                health(SubsystemState::Available),
                Duration::from_secs(60),
            );
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        cache.write(CacheKey::Query("q4".into()), health(SubsystemState::Available), Duration::from_secs(60));

        assert!(cache.read(&CacheKey::Query("q0".into())).is_none());
        assert!(cache.read(&CacheKey::Query("q4".into())).is_some());
        assert_eq!(cache.stats().entries, 4);
    }
}
