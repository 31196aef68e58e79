// src/cache.rs
//! In-memory cache with single-flight loading and stale-while-revalidate.
//!
//! Entries live in an LRU bounded by entry count, split into shards by key
//! hash so that reads of unrelated keys rarely meet on the same lock. Small
//! caches keep a single shard; in larger ones recency is tracked per shard,
//! so an eviction removes the least recently used entry of that key's shard.
//!
//! Loads are coordinated per key: the first caller for a cold or expired key spawns the load, and every
//! concurrent caller for that key awaits the same shared result. The load
//! runs as its own task, so a caller that gives up does not cancel it for the
//! others.
//!
//! A shard mutex only guards short, synchronous map operations; it is never
//! held across an await. Per-key ownership of a load lives in a sharded
//! `DashMap`, so loads for unrelated keys never wait on each other.

use crate::error::QueryError;
use crate::types::ValidationError;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::fmt::Display;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How a read treats an entry past its freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Serve a stale entry immediately and refresh it in the background.
    #[default]
    AllowStale,
    /// Wait for a fresh value when the entry is stale or missing.
    RequireFresh,
    /// Ignore the cached entry and wait for a new load.
    Bypass,
}

/// A cached value and when it was loaded.
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    loaded_at: Instant,
    pub fetched_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value: Arc::new(value),
            loaded_at: Instant::now(),
            fetched_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }

    pub fn is_stale(&self, freshness: Duration) -> bool {
        self.age() > freshness
    }
}

// Manual impl: cloning an entry clones the Arc, not the value.
impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            loaded_at: self.loaded_at,
            fetched_at: self.fetched_at,
        }
    }
}

/// What a read returns.
#[derive(Debug)]
pub struct Cached<V> {
    pub value: Arc<V>,
    pub fetched_at: DateTime<Utc>,
    /// True when served past the freshness window with a refresh under way.
    pub stale: bool,
}

impl<V> Cached<V> {
    fn from_entry(entry: CacheEntry<V>, stale: bool) -> Self {
        Self {
            value: entry.value,
            fetched_at: entry.fetched_at,
            stale,
        }
    }
}

/// Minimum capacity per LRU shard; smaller caches are not split.
const ENTRIES_PER_SHARD: usize = 32;
const MAX_SHARDS: usize = 16;

type Shard<K, V> = Mutex<LruCache<K, CacheEntry<V>>>;

type SharedLoad<V> = Shared<BoxFuture<'static, Result<CacheEntry<V>, QueryError>>>;

struct Inner<K, V> {
    name: &'static str,
    freshness: Duration,
    shards: Box<[Shard<K, V>]>,
    hasher: RandomState,
    in_flight: DashMap<K, SharedLoad<V>>,
}

impl<K: Hash + Eq + Display, V> Inner<K, V> {
    fn shard(&self, key: &K) -> &Shard<K, V> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    fn store(&self, key: K, entry: CacheEntry<V>) {
        let evicted = self.shard(&key).lock().push(key, entry);
        if let Some((old_key, _)) = evicted {
            debug!("[{}] evicted least recently used {}", self.name, old_key);
        }
    }

    fn lookup(&self, key: &K) -> Option<CacheEntry<V>> {
        self.shard(key).lock().get(key).cloned()
    }
}

/// Bounded cache whose loads are shared between concurrent readers.
pub struct SingleFlightCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for SingleFlightCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// `name` tags this cache's log lines.
    pub fn new(
        name: &'static str,
        max_entries: usize,
        freshness: Duration,
    ) -> Result<Self, ValidationError> {
        let shard_count = (max_entries / ENTRIES_PER_SHARD).clamp(1, MAX_SHARDS);
        // The remainder goes to the first shards so capacities sum to `max_entries`.
        let shards = (0..shard_count)
            .map(|i| {
                let share = max_entries / shard_count + usize::from(i < max_entries % shard_count);
                NonZeroUsize::new(share).map(|capacity| Mutex::new(LruCache::new(capacity)))
            })
            .collect::<Option<Box<[_]>>>()
            .ok_or_else(|| {
                ValidationError::InvalidConfig(format!("{} cache needs at least one entry", name))
            })?;
        debug!("[{}] {} entries in {} shard(s)", name, max_entries, shard_count);
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                freshness,
                shards,
                hasher: RandomState::new(),
                in_flight: DashMap::new(),
            }),
        })
    }

    /// Returns the value for `key`, loading it with `loader` when needed.
    ///
    /// `loader` runs at most once per key at a time, however many callers
    /// ask concurrently; callers that arrive during a load share its result
    /// (or its error). Failed loads are not cached.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: K,
        policy: CachePolicy,
        loader: F,
    ) -> Result<Cached<V>, QueryError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, QueryError>> + Send + 'static,
    {
        if policy != CachePolicy::Bypass {
            if let Some(entry) = self.inner.lookup(&key) {
                if !entry.is_stale(self.inner.freshness) {
                    debug!("[{}] hit {}", self.inner.name, key);
                    return Ok(Cached::from_entry(entry, false));
                }
                if policy == CachePolicy::AllowStale {
                    debug!(
                        "[{}] stale {} ({:?} old), refreshing in background",
                        self.inner.name,
                        key,
                        entry.age()
                    );
                    // The spawned task drives the load; nobody needs to await it here.
                    drop(self.join_or_start(key, loader, false));
                    return Ok(Cached::from_entry(entry, true));
                }
            }
        }

        debug!("[{}] miss {} ({:?})", self.inner.name, key, policy);
        let entry = self
            .join_or_start(key, loader, policy == CachePolicy::Bypass)
            .await?;
        Ok(Cached::from_entry(entry, false))
    }

    /// Attaches to the in-flight load for `key` or becomes its owner.
    fn join_or_start<F, Fut>(&self, key: K, loader: F, bypass: bool) -> SharedLoad<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, QueryError>> + Send + 'static,
    {
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(in_flight) => {
                debug!("[{}] joining in-flight load of {}", self.inner.name, key);
                in_flight.get().clone()
            }
            Entry::Vacant(slot) => {
                // A load may have finished between the caller's read and now.
                if !bypass {
                    if let Some(entry) = self.inner.lookup(&key) {
                        if !entry.is_stale(self.inner.freshness) {
                            return futures::future::ready(Ok(entry)).boxed().shared();
                        }
                    }
                }

                let inner = Arc::clone(&self.inner);
                let task_key = key.clone();
                let task = tokio::spawn(async move {
                    let result = loader().await.map(CacheEntry::new);
                    match &result {
                        Ok(entry) => inner.store(task_key.clone(), entry.clone()),
                        Err(e) => warn!("[{}] loading {} failed: {}", inner.name, task_key, e),
                    }
                    inner.in_flight.remove(&task_key);
                    result
                });

                let load = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(QueryError::Internal {
                            message: format!("cache load task failed: {}", e),
                        })
                    })
                }
                .boxed()
                .shared();

                debug!("[{}] started load of {}", self.inner.name, key);
                slot.insert(load.clone());
                load
            }
        }
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.shard(key).lock().pop(key).is_some()
    }

    /// Whether `key` has an entry, fresh or stale. Does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.shard(key).lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }
}
