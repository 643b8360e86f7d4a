use std::collections::HashMap;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use crate::config::LazyCacheConfig;
use crate::utils::futures::CallOnDrop;

use super::{FetchError, FetchResult, Fetcher, Loader, deadline_after};

/// An item saved in the in-memory mapping.
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    /// The cached value, or `None` if the provider explicitly found nothing.
    value: Option<V>,
    /// When this entry turns stale.
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: Option<V>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline_after(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type Entries<V> = HashMap<String, CacheEntry<V>>;

/// The state shared between all handles of one cache and its background refreshes.
struct Shared<F: Fetcher> {
    fetcher: F,
    ttl: Duration,
    entries: RwLock<Entries<F::Value>>,
    /// Remaining budget of concurrent background refreshes, if limited.
    max_lazy_refreshes: Option<Arc<AtomicIsize>>,
}

impl<F: Fetcher> Shared<F> {
    // The mapping is only ever changed by single, complete operations, so a panic while holding
    // the lock cannot leave it in an inconsistent state.
    fn read(&self) -> RwLockReadGuard<'_, Entries<F::Value>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries<F::Value>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry<F::Value>> {
        self.read().get(key).cloned()
    }

    /// Invokes the provider and applies its result to the mapping.
    ///
    /// Errors leave the mapping untouched and are handed back to the caller.
    async fn fetch(&self, key: &str) -> FetchResult<F::Value> {
        let result = self.fetcher.fetch(key).await;
        if let Ok(value) = &result {
            self.store(key, value.clone());
        }
        result
    }

    fn store(&self, key: &str, value: Option<F::Value>) {
        let mut entries = self.write();

        if value.is_none() {
            let had_value = entries.get(key).is_some_and(|entry| entry.value.is_some());
            if had_value {
                // the key disappeared from the source
                tracing::debug!(key, "Provider found nothing, removing cached value");
                entries.remove(key);
                return;
            }
        }

        entries.insert(key.to_owned(), CacheEntry::new(value, self.ttl));
    }

    async fn reload<L>(&self, loader: &L) -> Result<(), FetchError>
    where
        L: Loader<Value = F::Value>,
    {
        let items = loader.load().await?;
        let expires_at = deadline_after(self.ttl);
        let reloaded: Entries<F::Value> = items
            .into_iter()
            .map(|(key, value)| {
                let entry = CacheEntry {
                    value: Some(value),
                    expires_at,
                };
                (key, entry)
            })
            .collect();

        tracing::debug!(entries = reloaded.len(), "Replacing all cache entries");
        *self.write() = reloaded;
        Ok(())
    }

    /// Takes one permit out of the lazy refresh budget.
    ///
    /// Returns `None` if the budget is exhausted, otherwise a token that returns the permit when
    /// dropped.
    fn acquire_refresh(&self) -> Option<CallOnDrop> {
        let Some(max_lazy_refreshes) = &self.max_lazy_refreshes else {
            return Some(CallOnDrop::new(|| {}));
        };

        // We count down towards zero, and if we reach or surpass it, we will stop here.
        if max_lazy_refreshes.fetch_sub(1, Ordering::Relaxed) <= 0 {
            max_lazy_refreshes.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let max_lazy_refreshes = Arc::clone(max_lazy_refreshes);
        Some(CallOnDrop::new(move || {
            max_lazy_refreshes.fetch_add(1, Ordering::Relaxed);
        }))
    }
}

/// A concurrent lookaside cache that prefers serving stale data over blocking its callers.
///
/// Values are requested from a [`Fetcher`] on demand:
///
/// - A key that was never seen is fetched synchronously, the caller waits for the result.
/// - A fresh entry is served right away, without consulting the provider.
/// - An expired entry with a value is served right away as well, and a refresh is spawned in the
///   background which updates the entry once it completes.
/// - An expired entry for which the provider found nothing is fetched synchronously again.
///
/// Provider errors never modify the cached state. A key whose refreshes keep failing continues to
/// serve its last known value.
///
/// Cloning a `LazyCache` is cheap, all clones share the same entries.
pub struct LazyCache<F: Fetcher> {
    shared: Arc<Shared<F>>,
}

impl<F: Fetcher> Clone for LazyCache<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: Fetcher> std::fmt::Debug for LazyCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self
            .shared
            .entries
            .try_read()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("LazyCache")
            .field("ttl", &self.shared.ttl)
            .field("entries", &entries)
            .field("max_lazy_refreshes", &self.shared.max_lazy_refreshes)
            .finish()
    }
}

impl<F: Fetcher> LazyCache<F> {
    pub fn new(fetcher: F, config: LazyCacheConfig) -> Self {
        // A limit below one would disable lazy refreshes entirely, and entries would never be
        // refreshed once they expired.
        let max_lazy_refreshes = config
            .max_lazy_refreshes
            .map(|max| Arc::new(AtomicIsize::new(max.max(1))));

        let shared = Shared {
            fetcher,
            ttl: config.ttl,
            entries: RwLock::new(HashMap::with_capacity(config.initial_capacity)),
            max_lazy_refreshes,
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Looks up the value for `key`.
    ///
    /// Returns `Ok(Some(value))` if a value is known, and `Ok(None)` if the provider explicitly
    /// found nothing for this key.
    ///
    /// # Errors
    ///
    /// Only a synchronous fetch, one that this call is actually waiting on, surfaces its error.
    /// Errors of background refreshes are logged and dropped.
    pub async fn get(&self, key: &str) -> FetchResult<F::Value> {
        let Some(entry) = self.shared.lookup(key) else {
            tracing::trace!(key, "Cache miss, fetching synchronously");
            return self.shared.fetch(key).await;
        };

        if !entry.is_expired(Instant::now()) {
            tracing::trace!(key, "Cache hit");
            return Ok(entry.value);
        }

        match entry.value {
            // serving a stale "nothing" is of no use to anyone
            None => {
                tracing::trace!(key, "Expired empty entry, fetching synchronously");
                self.shared.fetch(key).await
            }
            Some(value) => {
                self.spawn_refresh(key);
                Ok(Some(value))
            }
        }
    }

    /// Inserts or overwrites the value for `key` with a fresh expiration time.
    pub fn set(&self, key: &str, value: F::Value) {
        let entry = CacheEntry::new(Some(value), self.shared.ttl);
        self.shared.write().insert(key.to_owned(), entry);
    }

    /// Removes the entry for `key`, returning whether there was one.
    pub fn remove(&self, key: &str) -> bool {
        self.shared.write().remove(key).is_some()
    }

    /// The number of entries, including entries for which the provider found nothing.
    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.read().is_empty()
    }

    /// Replaces all entries with the contents produced by `loader`.
    ///
    /// Every loaded entry gets a fresh expiration time, and keys not produced by the loader are
    /// dropped. If the loader fails, the existing entries are kept and the error is returned.
    pub async fn reload<L>(&self, loader: &L) -> Result<(), FetchError>
    where
        L: Loader<Value = F::Value>,
    {
        self.shared.reload(loader).await
    }

    pub(super) fn downgrade(&self) -> WeakLazyCache<F> {
        WeakLazyCache {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Spawns a fire-and-forget refresh of `key`.
    ///
    /// The task owns a handle to the shared state, so it stays valid even if every
    /// [`LazyCache`] handle is dropped in the meantime.
    fn spawn_refresh(&self, key: &str) {
        let Some(done_token) = self.shared.acquire_refresh() else {
            tracing::trace!(key, "Lazy refresh limit hit, serving stale value");
            return;
        };

        tracing::trace!(key, "Serving stale value, spawning background refresh");

        let shared = Arc::clone(&self.shared);
        let key = key.to_owned();
        let span = tracing::debug_span!("lazy_refresh", key = %key);

        let task = async move {
            let _done_token = done_token; // move into the future

            if let Err(error) = shared.fetch(&key).await {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "Background refresh failed, keeping the stale value",
                );
            }
        };
        tokio::spawn(task.instrument(span));
    }
}

/// A handle to a [`LazyCache`] that does not keep it alive.
pub(super) struct WeakLazyCache<F: Fetcher> {
    shared: Weak<Shared<F>>,
}

impl<F: Fetcher> WeakLazyCache<F> {
    pub(super) fn upgrade(&self) -> Option<LazyCache<F>> {
        self.shared.upgrade().map(|shared| LazyCache { shared })
    }
}
