use std::collections::HashMap;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

use super::{FetchError, FetchResult};

/// A source of values for individual keys.
///
/// This is the external collaborator of both [`LazyCache`](super::LazyCache) and
/// [`MissGuard`](super::MissGuard). Implementations may be arbitrarily slow or flaky, and they
/// must tolerate being called concurrently, also for the same key.
pub trait Fetcher: 'static + Send + Sync {
    type Value: 'static + Send + Sync + Clone;

    /// Asks the source for the value of `key`.
    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, FetchResult<Self::Value>>;
}

/// A source that produces the full contents of a cache at once.
///
/// Used by [`LazyCache::reload`](super::LazyCache::reload) and the [`Reloader`](super::Reloader).
pub trait Loader: 'static + Send + Sync {
    type Value: 'static + Send + Sync + Clone;

    /// Loads every key and value that should be in the cache.
    fn load(&self) -> BoxFuture<'_, Result<HashMap<String, Self::Value>, FetchError>>;
}

/// A [`Fetcher`] backed by an async closure, created with [`fetcher_fn`].
#[derive(Clone)]
pub struct FnFetcher<F> {
    f: F,
}

/// Turns an async closure into a [`Fetcher`].
///
/// The closure receives an owned copy of the key.
///
/// ```
/// use lazycache::caching::{fetcher_fn, FetchError};
///
/// let fetcher = fetcher_fn(|key: String| async move {
///     Ok::<_, FetchError>(Some(format!("fetch:{key}")))
/// });
/// # let _ = fetcher;
/// ```
pub fn fetcher_fn<F, Fut, V>(f: F) -> FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<V>> + Send + 'static,
    V: 'static + Send + Sync + Clone,
{
    FnFetcher { f }
}

impl<F, Fut, V> Fetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<V>> + Send + 'static,
    V: 'static + Send + Sync + Clone,
{
    type Value = V;

    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, FetchResult<V>> {
        (self.f)(key.to_owned()).boxed()
    }
}

/// A [`Loader`] backed by an async closure, created with [`loader_fn`].
#[derive(Clone)]
pub struct FnLoader<F> {
    f: F,
}

/// Turns an async closure into a [`Loader`].
pub fn loader_fn<F, Fut, V>(f: F) -> FnLoader<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<String, V>, FetchError>> + Send + 'static,
    V: 'static + Send + Sync + Clone,
{
    FnLoader { f }
}

impl<F, Fut, V> Loader for FnLoader<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<String, V>, FetchError>> + Send + 'static,
    V: 'static + Send + Sync + Clone,
{
    type Value = V;

    fn load(&self) -> BoxFuture<'_, Result<HashMap<String, V>, FetchError>> {
        (self.f)().boxed()
    }
}
