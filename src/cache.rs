//! Bounded query cache with time-to-live expiry
//!
//! Memoizes expensive handler lookups keyed by caller-defined strings. When a
//! brand-new key arrives at capacity, the entry with the fewest hits is evicted,
//! ties going to the earliest insertion. Access recency is not tracked beyond
//! the hit counter.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use regex::Regex;
use serde::Serialize;
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub hit_count: u64,
    sequence: u64,
}

/// Invoked with every entry removed from the cache, after the cache lock is
/// released and before the entry is dropped.
pub type EvictionCallback<V> = Box<dyn Fn(&str, &CacheEntry<V>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
    pub total_hits: u64,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_sequence: u64,
}

pub struct QueryCache<V> {
    state: Mutex<CacheState<V>>,
    max_size: usize,
    ttl: Duration,
    on_evict: Option<EvictionCallback<V>>,
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl<V> QueryCache<V> {
    /// Creates a cache holding at most `max_size` entries (at least one).
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_sequence: 0,
            }),
            max_size: max_size.max(1),
            ttl,
            on_evict: None,
        }
    }

    pub fn with_eviction_callback(mut self, callback: EvictionCallback<V>) -> Self {
        self.on_evict = Some(callback);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` while the entry is live; expired entries are removed.
    pub fn has(&self, key: &str) -> bool {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => return false,
            Some(entry) => self.is_expired(entry, Instant::now()),
        };
        if !expired {
            return true;
        }

        let removed = state.entries.remove_entry(key);
        drop(state);
        self.notify_removed(removed);
        false
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut state = self.lock();

        let mut evicted = None;
        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_size {
            let victim = select_victim(&state.entries).map(str::to_owned);
            evicted = victim.and_then(|victim| state.entries.remove_entry(&victim));
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                hit_count: 0,
                sequence,
            },
        );
        drop(state);

        if let Some((victim, _)) = &evicted {
            debug!(key = %victim, "evicted cache entry at capacity");
        }
        self.notify_removed(evicted);
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock().entries.remove_entry(key);
        let found = removed.is_some();
        self.notify_removed(removed);
        found
    }

    pub fn clear(&self) {
        let drained = self.lock().entries.drain().collect::<Vec<_>>();
        for (key, entry) in drained {
            self.notify_removed(Some((key, entry)));
        }
    }

    /// Deletes every entry whose key matches `pattern`.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        self.remove_where(|key, _| pattern.is_match(key))
    }

    /// Deletes every entry that has outlived the time-to-live.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        self.remove_where(|_, entry| self.is_expired(entry, now))
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let size = state.entries.len();
        let total_hits = state.entries.values().map(|entry| entry.hit_count).sum::<u64>();
        let hit_rate = if size == 0 {
            0.0
        } else {
            total_hits as f64 / size as f64
        };

        CacheStats {
            size,
            max_size: self.max_size,
            hit_rate,
            total_hits,
        }
    }

    fn remove_where(&self, predicate: impl Fn(&str, &CacheEntry<V>) -> bool) -> usize {
        let mut state = self.lock();
        let doomed = state
            .entries
            .iter()
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        let removed = doomed
            .iter()
            .filter_map(|key| state.entries.remove_entry(key))
            .collect::<Vec<_>>();
        drop(state);

        let count = removed.len();
        for pair in removed {
            self.notify_removed(Some(pair));
        }
        count
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) > self.ttl
    }

    fn notify_removed(&self, removed: Option<(String, CacheEntry<V>)>) {
        if let (Some(callback), Some((key, entry))) = (self.on_evict.as_ref(), removed.as_ref()) {
            callback(key, entry);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> QueryCache<V> {
    /// Returns the live value for `key` and counts the hit.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.lock();
        let now = Instant::now();
        match state.entries.get_mut(key) {
            None => return None,
            Some(entry) if !self.is_expired(entry, now) => {
                entry.hit_count += 1;
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        let removed = state.entries.remove_entry(key);
        drop(state);
        self.notify_removed(removed);
        None
    }

    /// Returns the cached value or stores the result of `compute`.
    ///
    /// Concurrent misses on the same key are not coalesced: each caller runs
    /// `compute` and the last `set` wins.
    pub async fn get_or_set<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }

        let value = compute().await;
        self.set(key, value.clone());
        value
    }

    /// Like [`QueryCache::get_or_set`] for fallible lookups. Errors are
    /// returned to the caller and nothing is cached.
    pub async fn try_get_or_set<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone());
        Ok(value)
    }
}

/// Fewest hits first, then earliest insertion.
fn select_victim<V>(entries: &HashMap<String, CacheEntry<V>>) -> Option<&str> {
    entries
        .iter()
        .min_by(|(_, left), (_, right)| {
            left.hit_count
                .cmp(&right.hit_count)
                .then(left.inserted_at.cmp(&right.inserted_at))
                .then(left.sequence.cmp(&right.sequence))
        })
        .map(|(key, _)| key.as_str())
}

/// Periodically drops expired entries until the returned task is aborted.
pub fn spawn_prune_task<V>(cache: Arc<QueryCache<V>>, every: Duration) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = cache.prune();
            if pruned > 0 {
                debug!(pruned, remaining = cache.len(), "pruned expired cache entries");
            }
        }
    })
}
