//! Helpers for testing the caches.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - A [`CountingSource`] stands in for an external provider. Wrap its
//!    [`respond`](CountingSource::respond) method in whatever provider trait the code under test
//!    expects, and keep a clone around to inspect how often each key was requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `lazycache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("lazycache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

type Fallback<V, E> = Arc<dyn Fn(&str) -> Result<Option<V>, E> + Send + Sync>;

/// A scripted provider that counts how often each key is requested.
///
/// Keys without a scripted response are answered by the fallback, which by default finds nothing
/// (`Ok(None)`). Clones share their script and counters.
pub struct CountingSource<V, E> {
    responses: Arc<Mutex<HashMap<String, Result<Option<V>, E>>>>,
    fallback: Fallback<V, E>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    delay: Option<Duration>,
}

impl<V, E> Clone for CountingSource<V, E> {
    fn clone(&self) -> Self {
        Self {
            responses: Arc::clone(&self.responses),
            fallback: Arc::clone(&self.fallback),
            calls: Arc::clone(&self.calls),
            delay: self.delay,
        }
    }
}

impl<V, E> Default for CountingSource<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> CountingSource<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a source that finds nothing for any key.
    pub fn new() -> Self {
        Self {
            responses: Default::default(),
            fallback: Arc::new(|_| Ok(None)),
            calls: Default::default(),
            delay: None,
        }
    }

    /// Answers keys without a scripted response with `fallback`.
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&str) -> Result<Option<V>, E> + Send + Sync + 'static,
    {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Scripts `key` to produce `value`.
    pub fn with_value(self, key: &str, value: V) -> Self {
        self.set(key, Ok(Some(value)));
        self
    }

    /// Makes every response take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Changes the scripted response for `key`, also for all clones.
    pub fn set(&self, key: &str, response: Result<Option<V>, E>) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_owned(), response);
    }

    /// Answers a request for `key`, after counting it and waiting for the configured delay.
    ///
    /// The response is picked when the request comes in, not after the delay.
    pub async fn respond(&self, key: &str) -> Result<Option<V>, E> {
        *self.calls.lock().unwrap().entry(key.to_owned()).or_default() += 1;

        let scripted = self.responses.lock().unwrap().get(key).cloned();
        let response = scripted.unwrap_or_else(|| (self.fallback)(key));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    /// The number of requests for `key` so far.
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or_default()
    }

    /// The number of requests for all keys so far.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}
