//! The cache itself.

use super::{CacheConfig, CacheEntry, Clock, EvictionPolicy, SystemClock};
use crate::error::{CoreResult, Failure};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};
use tessera_storage::{EncryptedStore, Keyspaces, KvStore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Key prefix for persisted entries.
const PERSIST_PREFIX: &str = "cache/";

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that returned nothing.
    pub misses: u64,
    /// Entries dropped to stay under capacity.
    pub evictions: u64,
    /// Entries dropped because they expired.
    pub expirations: u64,
    /// Entries currently in memory.
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

struct Slot<T> {
    entry: CacheEntry<T>,
    rank: Rank,
}

/// Eviction order: when the entry was last written (or read, under LRU),
/// then a sequence number for ties.
type Rank = (SystemTime, u64);

/// Entries plus their eviction order. The smallest rank is evicted first.
struct Slots<T> {
    entries: HashMap<String, Slot<T>>,
    order: BTreeMap<Rank, String>,
    next_seq: u64,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn rank(&mut self, at: SystemTime) -> Rank {
        self.next_seq += 1;
        (at, self.next_seq)
    }

    fn insert(&mut self, entry: CacheEntry<T>, at: SystemTime) {
        let rank = self.rank(at);
        let key = entry.key.clone();
        if let Some(old) = self.entries.insert(key.clone(), Slot { entry, rank }) {
            self.order.remove(&old.rank);
        }
        self.order.insert(rank, key);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.rank);
        Some(slot.entry)
    }

    fn touch(&mut self, key: &str, at: SystemTime) {
        let rank = self.rank(at);
        if let Some(slot) = self.entries.get_mut(key) {
            self.order.remove(&slot.rank);
            slot.rank = rank;
            self.order.insert(rank, key.to_string());
        }
    }

    fn pop_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// A size-bounded TTL cache with optional write-through persistence.
///
/// # Behavior
///
/// - Lookups never return expired entries; an expired entry found on
///   lookup is purged
/// - Writes overwrite, and stamp the entry with a fresh TTL
/// - Past `max_entries`, the oldest entries (by write, or by access under
///   [`EvictionPolicy::LeastRecentlyUsed`]) are evicted first
///
/// # Persistence
///
/// With [`with_store`](Self::with_store), every write also lands in the
/// store under `cache/<key>` and memory misses are hydrated from it. A
/// hydrated entry keeps its original write time for eviction.
/// When the config carries [`CacheEncryption`](super::CacheEncryption),
/// entries in the sensitive keyspaces are encrypted before they reach
/// the store.
///
/// # Concurrency
///
/// Readers proceed in parallel under a read lock. Anything that changes
/// memory or the store holds the write lock for both, so the two never
/// disagree and the last write wins.
pub struct Cache<T> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    slots: RwLock<Slots<T>>,
    store: Option<Arc<dyn KvStore>>,
    counters: Counters,
}

impl<T> Cache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates an in-memory cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an in-memory cache on `clock`.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let config = CacheConfig {
            max_entries: config.max_entries.max(1),
            ..config
        };
        Self {
            config,
            clock,
            slots: RwLock::new(Slots::new()),
            store: None,
            counters: Counters::default(),
        }
    }

    /// Persists entries to `store`, encrypting sensitive keyspaces if the
    /// config asks for it.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        let store: Arc<dyn KvStore> = match &self.config.encryption {
            Some(encryption) => Arc::new(EncryptedStore::new(
                store,
                encryption.key.clone(),
                Keyspaces::prefixes(
                    encryption
                        .keyspaces
                        .iter()
                        .map(|prefix| persisted_key(prefix)),
                ),
            )),
            None => store,
        };
        self.store = Some(store);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of entries in memory, expired or not.
    pub fn len(&self) -> usize {
        self.slots.read().entries.len()
    }

    /// Returns true if memory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `key`.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the persistent store can't be read.
    pub fn get(&self, key: &str) -> CoreResult<Option<T>> {
        let now = self.clock.now();
        let lru = self.config.eviction == EvictionPolicy::LeastRecentlyUsed;

        {
            let slots = self.slots.read();
            match slots.entries.get(key) {
                Some(slot) if !slot.entry.is_expired_at(now) && !lru => {
                    Counters::bump(&self.counters.hits, 1);
                    return Ok(Some(slot.entry.value.clone()));
                }
                None if self.store.is_none() => {
                    Counters::bump(&self.counters.misses, 1);
                    return Ok(None);
                }
                _ => {}
            }
        }

        let mut slots = self.slots.write();
        let found = slots
            .entries
            .get(key)
            .map(|slot| (!slot.entry.is_expired_at(now)).then(|| slot.entry.value.clone()));
        match found {
            Some(Some(value)) => {
                if lru {
                    slots.touch(key, now);
                }
                Counters::bump(&self.counters.hits, 1);
                return Ok(Some(value));
            }
            Some(None) => {
                slots.remove(key);
                Counters::bump(&self.counters.expirations, 1);
                self.unpersist(key)?;
                Counters::bump(&self.counters.misses, 1);
                return Ok(None);
            }
            None => {}
        }

        match self.hydrate(&mut slots, key, now)? {
            Some(value) => {
                Counters::bump(&self.counters.hits, 1);
                Ok(Some(value))
            }
            None => {
                Counters::bump(&self.counters.misses, 1);
                Ok(None)
            }
        }
    }

    /// Loads `key` from the store into memory if it is there and fresh.
    fn hydrate(&self, slots: &mut Slots<T>, key: &str, now: SystemTime) -> CoreResult<Option<T>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(bytes) = store.get(&persisted_key(key))? else {
            return Ok(None);
        };
        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "dropping unreadable persisted cache entry");
                store.delete(&persisted_key(key))?;
                return Ok(None);
            }
        };
        if entry.is_expired_at(now) {
            Counters::bump(&self.counters.expirations, 1);
            store.delete(&persisted_key(key))?;
            return Ok(None);
        }
        debug!(key, "hydrated cache entry from store");
        let value = entry.value.clone();
        let at = match self.config.eviction {
            EvictionPolicy::LeastRecentlyUsed => now,
            EvictionPolicy::LeastRecentlyWritten => entry.created_at,
        };
        slots.insert(entry, at);
        self.evict_over_capacity(slots)?;
        Ok(Some(value))
    }

    /// Stores `value` under `key` for `ttl`, or the default TTL.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the entry can't be persisted.
    pub fn set(&self, key: &str, value: T, ttl: Option<Duration>) -> CoreResult<()> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let now = self.clock.now();
        let entry = CacheEntry::new(key, value, now, ttl);

        let mut slots = self.slots.write();
        if let Some(store) = &self.store {
            let bytes = serde_json::to_vec(&entry)
                .map_err(|e| Failure::cache(format!("cannot serialize entry {key}: {e}")))?;
            store.put(&persisted_key(key), &bytes)?;
        }
        slots.insert(entry, now);
        self.evict_over_capacity(&mut slots)
    }

    fn evict_over_capacity(&self, slots: &mut Slots<T>) -> CoreResult<()> {
        let mut evicted = 0;
        while slots.entries.len() > self.config.max_entries {
            let Some(key) = slots.pop_oldest() else {
                break;
            };
            self.unpersist(&key)?;
            evicted += 1;
        }
        if evicted > 0 {
            Counters::bump(&self.counters.evictions, evicted);
            debug!(count = evicted, "evicted cache entries over capacity");
        }
        Ok(())
    }

    fn unpersist(&self, key: &str) -> CoreResult<()> {
        if let Some(store) = &self.store {
            store.delete(&persisted_key(key))?;
        }
        Ok(())
    }

    /// Removes `key`. Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store can't be written.
    pub fn invalidate(&self, key: &str) -> CoreResult<bool> {
        let mut slots = self.slots.write();
        let in_memory = slots.remove(key).is_some();
        let persisted = match &self.store {
            Some(store) => store.delete(&persisted_key(key))?,
            None => false,
        };
        Ok(in_memory || persisted)
    }

    /// Removes every entry whose key starts with `prefix`. Returns the
    /// number of distinct keys removed.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store can't be written.
    pub fn invalidate_prefix(&self, prefix: &str) -> CoreResult<usize> {
        let mut slots = self.slots.write();
        let mut removed: Vec<String> = slots
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &removed {
            slots.remove(key);
        }
        if let Some(store) = &self.store {
            for (row, _) in store.scan_prefix(&persisted_key(prefix))? {
                store.delete(&row)?;
                let key = row[PERSIST_PREFIX.len()..].to_string();
                if !removed.contains(&key) {
                    removed.push(key);
                }
            }
        }
        Ok(removed.len())
    }

    /// Removes everything.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store can't be written.
    pub fn clear(&self) -> CoreResult<()> {
        let mut slots = self.slots.write();
        slots.clear();
        if let Some(store) = &self.store {
            for (row, _) in store.scan_prefix(PERSIST_PREFIX)? {
                store.delete(&row)?;
            }
        }
        Ok(())
    }

    /// Drops every expired entry from memory and the store. Returns how
    /// many were dropped.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store can't be read or written.
    pub fn purge_expired(&self) -> CoreResult<usize> {
        let now = self.clock.now();
        let mut slots = self.slots.write();
        let expired: Vec<String> = slots
            .entries
            .values()
            .filter(|slot| slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.key.clone())
            .collect();
        for key in &expired {
            slots.remove(key);
            self.unpersist(key)?;
        }
        let mut purged = expired.len();

        if let Some(store) = &self.store {
            for (row, bytes) in store.scan_prefix(PERSIST_PREFIX)? {
                let stale = match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
                    Ok(entry) => entry.is_expired_at(now),
                    Err(_) => true,
                };
                if stale {
                    store.delete(&row)?;
                    purged += 1;
                }
            }
        }

        if purged > 0 {
            Counters::bump(&self.counters.expirations, purged as u64);
            debug!(purged, "purged expired cache entries");
        }
        Ok(purged)
    }

    /// Returns the cached value, or fetches, stores and returns a new one.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure unchanged; nothing is cached in that case.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> CoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(key, value.clone(), ttl)?;
        Ok(value)
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `period` on the
    /// current Tokio runtime.
    ///
    /// The task holds a weak reference and stops once the cache is
    /// dropped. Abort the returned handle to stop it earlier.
    pub fn spawn_janitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if let Err(e) = cache.purge_expired() {
                    warn!(error = %e, "cache janitor failed");
                }
            }
            debug!("cache janitor stopped");
        })
    }
}

fn persisted_key(key: &str) -> String {
    format!("{PERSIST_PREFIX}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::FailureKind;
    use tessera_storage::{EncryptionKey, InMemoryStore};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        ))
    }

    fn cache(config: CacheConfig, clock: &Arc<ManualClock>) -> Cache<String> {
        Cache::with_clock(config, clock.clone())
    }

    #[test]
    fn entry_expires_after_ttl() {
        let clock = clock();
        let cache = cache(CacheConfig::development(), &clock);
        cache
            .set("k", "v".into(), Some(Duration::from_secs(60)))
            .unwrap();

        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
        clock.advance(Duration::from_secs(59));
        assert!(cache.get("k").unwrap().is_some());
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k").unwrap(), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn default_ttl_applies() {
        let clock = clock();
        let config = CacheConfig::development().with_default_ttl(Duration::from_secs(10));
        let cache = cache(config, &clock);
        cache.set("k", "v".into(), None).unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn overwrite_resets_ttl() {
        let clock = clock();
        let cache = cache(CacheConfig::development(), &clock);
        cache.set("k", "a".into(), Some(Duration::from_secs(10))).unwrap();
        clock.advance(Duration::from_secs(8));
        cache.set("k", "b".into(), Some(Duration::from_secs(10))).unwrap();
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn evicts_oldest_write_first() {
        let clock = clock();
        let cache = cache(CacheConfig::development().with_max_entries(3), &clock);
        for key in ["a", "b", "c"] {
            cache.set(key, key.into(), None).unwrap();
        }
        // Reads don't protect under the default policy.
        cache.get("a").unwrap();
        cache.set("d", "d".into(), None).unwrap();

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a").unwrap(), None);
        assert!(cache.get("d").unwrap().is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn lru_reads_refresh_recency() {
        let clock = clock();
        let config = CacheConfig::development()
            .with_max_entries(3)
            .with_eviction(EvictionPolicy::LeastRecentlyUsed);
        let cache = cache(config, &clock);
        for key in ["a", "b", "c"] {
            cache.set(key, key.into(), None).unwrap();
        }
        cache.get("a").unwrap();
        cache.set("d", "d".into(), None).unwrap();

        assert!(cache.get("a").unwrap().is_some());
        assert_eq!(cache.get("b").unwrap(), None);
    }

    #[test]
    fn invalidate_and_prefix() {
        let clock = clock();
        let cache = cache(CacheConfig::development(), &clock);
        for key in ["user/1", "user/2", "feed/1"] {
            cache.set(key, key.into(), None).unwrap();
        }
        assert!(cache.invalidate("feed/1").unwrap());
        assert!(!cache.invalidate("feed/1").unwrap());
        assert_eq!(cache.invalidate_prefix("user/").unwrap(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_expired_drops_only_expired() {
        let clock = clock();
        let cache = cache(CacheConfig::development(), &clock);
        cache.set("short", "s".into(), Some(Duration::from_secs(1))).unwrap();
        cache.set("long", "l".into(), Some(Duration::from_secs(100))).unwrap();
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn write_through_survives_a_new_cache() {
        let clock = clock();
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let first = cache(CacheConfig::development(), &clock).with_store(store.clone());
        first.set("feed/1", "hello".into(), None).unwrap();

        let second = cache(CacheConfig::development(), &clock).with_store(store.clone());
        assert!(second.is_empty());
        assert_eq!(second.get("feed/1").unwrap().as_deref(), Some("hello"));
        assert_eq!(second.len(), 1);

        second.clear().unwrap();
        assert!(store.scan_prefix("cache/").unwrap().is_empty());
    }

    #[test]
    fn expired_persisted_entry_is_purged_on_lookup() {
        let clock = clock();
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let first = cache(CacheConfig::development(), &clock).with_store(store.clone());
        first.set("k", "v".into(), Some(Duration::from_secs(5))).unwrap();

        clock.advance(Duration::from_secs(6));
        let second = cache(CacheConfig::development(), &clock).with_store(store.clone());
        assert_eq!(second.get("k").unwrap(), None);
        assert!(store.get("cache/k").unwrap().is_none());
    }

    #[test]
    fn hydrated_entry_keeps_its_write_time_for_eviction() {
        let clock = clock();
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let ttl = Some(Duration::from_secs(600));
        let first = cache(CacheConfig::development(), &clock).with_store(store.clone());
        first.set("old", "o".into(), ttl).unwrap();

        clock.advance(Duration::from_secs(10));
        let second = cache(CacheConfig::development().with_max_entries(2), &clock)
            .with_store(store.clone());
        second.set("newer", "n".into(), ttl).unwrap();
        assert_eq!(second.get("old").unwrap().as_deref(), Some("o"));

        clock.advance(Duration::from_secs(10));
        second.set("newest", "n2".into(), ttl).unwrap();

        assert_eq!(second.len(), 2);
        assert!(second.get("newer").unwrap().is_some());
        assert!(second.get("old").unwrap().is_none());
        assert!(store.get("cache/old").unwrap().is_none());
    }

    #[test]
    fn concurrent_readers_and_writer_keep_memory_and_store_in_step() {
        use std::sync::atomic::AtomicBool;

        let clock = clock();
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let cache = Arc::new(cache(CacheConfig::development(), &clock).with_store(store.clone()));
        let keys = ["a", "b", "c", "d"];
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        for key in keys {
                            cache.get(key).unwrap();
                        }
                    }
                })
            })
            .collect();

        for i in 0..400 {
            // Everything written before this point is now expired.
            clock.advance(Duration::from_secs(2));
            let key = keys[i % keys.len()];
            cache.set(key, format!("v{i}"), Some(Duration::from_secs(1))).unwrap();
        }
        done.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }

        let slots = cache.slots.read();
        for key in keys {
            let in_memory = slots.entries.get(key).map(|slot| slot.entry.value.clone());
            let persisted = store.get(&persisted_key(key)).unwrap().map(|bytes| {
                serde_json::from_slice::<CacheEntry<String>>(&bytes)
                    .unwrap()
                    .value
            });
            assert_eq!(in_memory, persisted, "key {key}");
        }
        let last = keys[399 % keys.len()];
        assert!(store.get(&persisted_key(last)).unwrap().is_some());
    }

    #[test]
    fn sensitive_keyspaces_are_encrypted_at_rest() {
        let clock = clock();
        let raw = Arc::new(InMemoryStore::new());
        let config = CacheConfig::production(EncryptionKey::generate());
        let cache = cache(config, &clock).with_store(raw.clone());

        cache.set("auth/token", "s3cret-token".into(), None).unwrap();
        cache.set("feed/1", "public-post".into(), None).unwrap();

        let sealed = raw.raw("cache/auth/token").unwrap();
        assert!(!String::from_utf8_lossy(&sealed).contains("s3cret-token"));
        let plain = raw.raw("cache/feed/1").unwrap();
        assert!(String::from_utf8_lossy(&plain).contains("public-post"));

        cache.invalidate("auth/token").ok();
        assert!(raw.raw("cache/auth/token").is_none());
    }

    #[tokio::test]
    async fn get_or_fetch_reads_through() {
        let clock = clock();
        let cache = cache(CacheConfig::development(), &clock);

        let value = cache
            .get_or_fetch("k", None, || async { Ok("fetched".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "fetched");

        let value = cache
            .get_or_fetch("k", None, || async { Err(Failure::network("offline")) })
            .await
            .unwrap();
        assert_eq!(value, "fetched");

        let err = cache
            .get_or_fetch("other", None, || async { Err(Failure::network("offline")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Network);
        assert_eq!(cache.get("other").unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_purges_in_background() {
        let clock = clock();
        let cache = Arc::new(cache(CacheConfig::development(), &clock));
        cache.set("k", "v".into(), Some(Duration::from_secs(1))).unwrap();
        let janitor = cache.spawn_janitor(Duration::from_secs(30));

        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(cache.is_empty());
        janitor.abort();
    }
}
