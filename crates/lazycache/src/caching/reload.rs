use std::time::Duration;

use tokio_util::task::AbortOnDropHandle;
use tracing::Instrument;

use crate::config::ReloadConfig;

use super::{Fetcher, LazyCache, Loader};

/// The shortest supported time between two bulk reloads.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodically replaces the complete contents of a [`LazyCache`].
///
/// Every `interval`, the [`Loader`] is asked for the full set of entries, which then atomically
/// replaces whatever the cache held before. A failing load is logged and skipped, keeping the
/// previous contents.
///
/// The background task stops when the `Reloader` is dropped, or when the last handle to the cache
/// goes away.
pub struct Reloader {
    handle: AbortOnDropHandle<()>,
}

impl std::fmt::Debug for Reloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reloader")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Reloader {
    /// Spawns a reload task for `cache`.
    ///
    /// The first reload happens after one `interval` has passed.
    pub fn spawn<F, L>(cache: &LazyCache<F>, loader: L, interval: Duration) -> Self
    where
        F: Fetcher,
        L: Loader<Value = F::Value>,
    {
        let interval = interval.max(MIN_INTERVAL);
        let cache = cache.downgrade();

        let task = async move {
            loop {
                tokio::time::sleep(interval).await;

                let Some(cache) = cache.upgrade() else {
                    tracing::debug!("Cache is gone, stopping reloads");
                    return;
                };

                match cache.reload(&loader).await {
                    Ok(()) => tracing::trace!("Reloaded cache"),
                    Err(error) => tracing::warn!(
                        error = &error as &dyn std::error::Error,
                        "Failed to reload cache, keeping the previous entries",
                    ),
                }
            }
        };

        let span = tracing::debug_span!("reloader", ?interval);
        let handle = AbortOnDropHandle::new(tokio::spawn(task.instrument(span)));
        Self { handle }
    }

    /// Spawns a reload task if [`ReloadConfig::interval`] is configured.
    pub fn from_config<F, L>(cache: &LazyCache<F>, loader: L, config: &ReloadConfig) -> Option<Self>
    where
        F: Fetcher,
        L: Loader<Value = F::Value>,
    {
        let interval = config.interval?;
        Some(Self::spawn(cache, loader, interval))
    }

    /// Whether the reload task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
