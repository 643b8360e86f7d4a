//! A concurrent in-memory cache that serves stale data while it refreshes in the background,
//! together with a negative cache for keys that are known not to exist.
//!
//! See the [`caching`] module for how the pieces fit together.

pub mod caching;
pub mod config;
pub mod logging;
pub mod utils;

pub use caching::{
    FetchError, FetchResult, Fetcher, LazyCache, Loader, MissGuard, Reloader, fetcher_fn,
    loader_fn,
};
