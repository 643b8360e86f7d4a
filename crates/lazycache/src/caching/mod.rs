//! # Lazy caching infrastructure
//!
//! This module contains an in-memory lookaside cache that would rather return stale data than
//! block its callers, and a negative cache that protects expensive sources from being asked
//! about keys that recently turned out not to exist.
//!
//! ## [`LazyCache`]
//!
//! The [`LazyCache`] owns a mapping from key to value and expiration time. Values come from a
//! [`Fetcher`], the external source of truth, which is treated as an opaque and potentially slow
//! or flaky operation. Every read decides what to do based on the state of the entry:
//!
//! - No entry: the value is fetched synchronously and the caller waits for it.
//! - Fresh entry: served as is.
//! - Expired entry with a value: the stale value is served immediately, and a refresh is spawned
//!   in the background. Concurrent refreshes of the same key are not deduplicated, the last one
//!   to finish wins. Optionally, the number of concurrently running refreshes can be bounded with
//!   [`LazyCacheConfig::max_lazy_refreshes`](crate::config::LazyCacheConfig::max_lazy_refreshes).
//! - Expired entry for which the source found nothing: fetched synchronously again.
//!
//! Fetch results are applied as follows:
//!
//! - A value replaces the entry, with a fresh expiration time.
//! - "Nothing" removes an entry that previously held a value, as the key disappeared from the
//!   source. Otherwise it is remembered as an empty entry.
//! - An error leaves the entry untouched, so the last good value is served for as long as
//!   refreshes keep failing. Errors are only ever returned to callers that wait on a synchronous
//!   fetch.
//!
//! A single reader/writer lock guards the whole mapping. It is never held across a call to the
//! provider.
//!
//! ## [`MissGuard`]
//!
//! A [`MissGuard`] wraps a [`Fetcher`] and remembers keys for which it returned "nothing". For
//! the configured time-to-live, these keys are answered with "nothing" without consulting the
//! wrapped source. Errors are never remembered. A [`MissGuard`] is itself a [`Fetcher`], so it
//! can sit between a [`LazyCache`] and its source.
//!
//! The suppression records are either kept exactly per key, or in a fixed size table of randomly
//! assigned slots, see [`SuppressionStrategy`](crate::config::SuppressionStrategy).
//!
//! ## [`Reloader`]
//!
//! Independently of the per-key refreshes, a [`Reloader`] can periodically replace the complete
//! contents of a [`LazyCache`] with the output of a [`Loader`]. Failed loads keep the previous
//! contents.

use std::time::Duration;

use tokio::time::Instant;

mod fetch_error;
mod fetcher;
mod memory;
mod miss_guard;
mod reload;

pub use fetch_error::{FetchError, FetchResult};
pub use fetcher::{FnFetcher, FnLoader, Fetcher, Loader, fetcher_fn, loader_fn};
pub use memory::LazyCache;
pub use miss_guard::MissGuard;
pub use reload::Reloader;

/// Roughly 30 years, used in place of deadlines that would overflow [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Returns the point in time `ttl` from now.
fn deadline_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}
