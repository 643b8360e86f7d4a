use std::time::Duration;

use lazycache::config::{LazyCacheConfig, MissGuardConfig, SuppressionStrategy};
use lazycache::{FetchError, LazyCache, MissGuard};
use lazycache_test::CountingSource;

use crate::counting_fetcher;

#[tokio::test]
async fn test_read_policy_walkthrough() {
    lazycache_test::setup();

    let source = CountingSource::new().with_fallback(|key| Ok(Some(format!("fetch:{key}"))));
    let cache = LazyCache::new(
        counting_fetcher(&source),
        LazyCacheConfig {
            ttl: Duration::from_secs(1),
            ..Default::default()
        },
    );
    assert_eq!(cache.get("spice").await, Ok(Some("fetch:spice".into())));
    assert_eq!(source.calls("spice"), 1);

    cache.set("leto", "ghanima".into());
    assert_eq!(cache.get("leto").await, Ok(Some("ghanima".into())));
    assert_eq!(source.calls("leto"), 0);

    let source = CountingSource::new();
    let guard = MissGuard::new(
        counting_fetcher(&source),
        MissGuardConfig {
            ttl: Duration::from_secs(60),
            ..Default::default()
        },
    );
    assert_eq!(guard.fetch("dune").await, Ok(None));
    assert_eq!(guard.fetch("dune").await, Ok(None));
    assert_eq!(source.calls("dune"), 1);
}

/// A miss guard sitting between the cache and its source keeps expired empty entries from
/// reaching the source again within the suppression window.
#[tokio::test(start_paused = true)]
async fn test_miss_guard_as_cache_provider() {
    lazycache_test::setup();

    let source = CountingSource::new().with_value("arrakis", "spice".to_owned());
    let guard = MissGuard::new(
        counting_fetcher(&source),
        MissGuardConfig {
            ttl: Duration::from_secs(60),
            strategy: SuppressionStrategy::Unbounded,
        },
    );
    let cache = LazyCache::new(
        guard.clone(),
        LazyCacheConfig {
            ttl: Duration::from_secs(1),
            ..Default::default()
        },
    );

    assert_eq!(cache.get("dune").await, Ok(None));
    assert_eq!(cache.get("arrakis").await, Ok(Some("spice".into())));

    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(2)).await;
        // the cache entry expired, but the guard answers on behalf of the source
        assert_eq!(cache.get("dune").await, Ok(None));
    }
    assert_eq!(source.calls("dune"), 1);

    // once the suppression window ran out, the source gets asked again
    source.set("dune", Ok(Some("sandworm".into())));
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(cache.get("dune").await, Ok(Some("sandworm".into())));
    assert_eq!(source.calls("dune"), 2);
}

#[tokio::test]
async fn test_guarded_cache_propagates_errors() {
    lazycache_test::setup();

    let source = CountingSource::new();
    source.set("dune", Err(FetchError::Unavailable("sandstorm".into())));
    let cache = LazyCache::new(
        MissGuard::new(counting_fetcher(&source), MissGuardConfig::default()),
        LazyCacheConfig::default(),
    );

    for _ in 0..3 {
        assert_eq!(
            cache.get("dune").await,
            Err(FetchError::Unavailable("sandstorm".into()))
        );
    }
    assert_eq!(source.calls("dune"), 3);
    assert!(cache.is_empty());
}
