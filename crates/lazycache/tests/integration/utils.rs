use lazycache::{FetchError, Fetcher, fetcher_fn};
use lazycache_test::CountingSource;

/// Turns a [`CountingSource`] into a [`Fetcher`] that shares its counters.
pub fn counting_fetcher(
    source: &CountingSource<String, FetchError>,
) -> impl Fetcher<Value = String> + use<> {
    let source = source.clone();
    fetcher_fn(move |key: String| {
        let source = source.clone();
        async move { source.respond(&key).await }
    })
}
