use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use tokio::time::Instant;

use crate::config::{MissGuardConfig, SuppressionStrategy};

use super::{FetchResult, Fetcher, deadline_after};

/// Number of records after which an unbounded table first drops its expired records.
const MIN_PRUNE_AT: usize = 1024;

/// Keeps track of keys that are currently suppressed.
#[derive(Debug)]
enum SuppressionTable {
    /// An exact deadline per key.
    Unbounded {
        deadlines: HashMap<String, Instant>,
        /// Table size at which expired records are pruned next.
        prune_at: usize,
    },
    /// A fixed number of slots, each owned by the key that was last assigned to it.
    ///
    /// `lookup` only holds keys that currently own a slot, so it never grows past `slots.len()`.
    Slots {
        slots: Vec<Option<(String, Instant)>>,
        lookup: HashMap<String, usize>,
    },
}

impl SuppressionTable {
    fn new(strategy: SuppressionStrategy) -> Self {
        match strategy {
            SuppressionStrategy::Unbounded => Self::Unbounded {
                deadlines: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            },
            SuppressionStrategy::Slots { size } => {
                let size = size.max(1);
                Self::Slots {
                    slots: vec![None; size],
                    lookup: HashMap::with_capacity(size),
                }
            }
        }
    }

    fn suppressed_until(&self, key: &str) -> Option<Instant> {
        match self {
            Self::Unbounded { deadlines, .. } => deadlines.get(key).copied(),
            Self::Slots { slots, lookup } => {
                let index = *lookup.get(key)?;
                slots[index].as_ref().map(|(_, until)| *until)
            }
        }
    }

    fn record(&mut self, key: &str, until: Instant, now: Instant) {
        match self {
            Self::Unbounded {
                deadlines,
                prune_at,
            } => {
                if deadlines.len() >= *prune_at && !deadlines.contains_key(key) {
                    deadlines.retain(|_, deadline| *deadline > now);
                    *prune_at = (deadlines.len() * 2).max(MIN_PRUNE_AT);
                    tracing::trace!(remaining = deadlines.len(), "Pruned expired suppressions");
                }
                deadlines.insert(key.to_owned(), until);
            }
            Self::Slots { slots, lookup } => {
                let index = match lookup.get(key) {
                    Some(index) => *index,
                    None => rand::rng().random_range(0..slots.len()),
                };

                // The previous owner of the slot loses its suppression.
                if let Some((previous, _)) = slots[index].replace((key.to_owned(), until)) {
                    if previous != key {
                        lookup.remove(&previous);
                    }
                }
                lookup.insert(key.to_owned(), index);
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Unbounded { deadlines, .. } => deadlines.len(),
            Self::Slots { lookup, .. } => lookup.len(),
        }
    }
}

struct GuardInner<F> {
    fetcher: F,
    ttl: Duration,
    table: RwLock<SuppressionTable>,
}

/// Suppresses repeated lookups of keys for which the wrapped [`Fetcher`] recently found nothing.
///
/// Once the wrapped fetcher answers "nothing" (`Ok(None)`) for a key, the key is suppressed for
/// the configured time-to-live: further calls return `Ok(None)` right away, without asking the
/// fetcher. Values and errors are passed through unchanged and never suppress anything.
///
/// A `MissGuard` is a [`Fetcher`] itself, so it can be used as the provider of a
/// [`LazyCache`](super::LazyCache). Cloning it is cheap, all clones share the suppression records.
pub struct MissGuard<F> {
    inner: Arc<GuardInner<F>>,
}

impl<F> Clone for MissGuard<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> std::fmt::Debug for MissGuard<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suppressed = self
            .inner
            .table
            .try_read()
            .map(|table| table.len())
            .unwrap_or_default();
        f.debug_struct("MissGuard")
            .field("ttl", &self.inner.ttl)
            .field("suppressed", &suppressed)
            .finish()
    }
}

impl<F: Fetcher> MissGuard<F> {
    pub fn new(fetcher: F, config: MissGuardConfig) -> Self {
        let inner = GuardInner {
            fetcher,
            ttl: config.ttl,
            table: RwLock::new(SuppressionTable::new(config.strategy)),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Fetches `key` from the wrapped fetcher, unless it is currently suppressed.
    pub async fn fetch(&self, key: &str) -> FetchResult<F::Value> {
        if self.is_suppressed(key, Instant::now()) {
            tracing::trace!(key, "Key is suppressed, not asking the provider");
            return Ok(None);
        }

        let result = self.inner.fetcher.fetch(key).await;
        if let Ok(None) = result {
            self.suppress(key);
        }
        result
    }

    fn is_suppressed(&self, key: &str, now: Instant) -> bool {
        let table = self
            .inner
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        table.suppressed_until(key).is_some_and(|until| until > now)
    }

    fn suppress(&self, key: &str) {
        let until = deadline_after(self.inner.ttl);
        tracing::debug!(key, ttl = ?self.inner.ttl, "Provider found nothing, suppressing key");

        self.inner
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record(key, until, Instant::now());
    }
}

impl<F: Fetcher> Fetcher for MissGuard<F> {
    type Value = F::Value;

    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, FetchResult<Self::Value>> {
        Box::pin(MissGuard::fetch(self, key))
    }
}
