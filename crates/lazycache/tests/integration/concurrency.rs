use std::time::Duration;

use futures::future::join_all;
use lazycache::config::{LazyCacheConfig, MissGuardConfig, SuppressionStrategy};
use lazycache::{LazyCache, MissGuard};
use lazycache_test::CountingSource;

use crate::counting_fetcher;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_and_writes() {
    lazycache_test::setup();

    let source = CountingSource::new()
        .with_fallback(|key| Ok(Some(format!("fetch:{key}"))))
        .with_delay(Duration::from_millis(5));
    let cache = LazyCache::new(
        counting_fetcher(&source),
        LazyCacheConfig {
            ttl: Duration::from_millis(20),
            initial_capacity: 16,
            ..Default::default()
        },
    );

    let tasks = (0..32).map(|i| {
        let cache = cache.clone();
        tokio::spawn(async move {
            let key = format!("key{}", i % 8);
            for round in 0..20 {
                if round % 5 == 0 {
                    cache.set(&key, format!("set:{key}"));
                }
                let value = cache.get(&key).await.unwrap().unwrap();
                assert!(value == format!("fetch:{key}") || value == format!("set:{key}"));
                tokio::time::sleep(Duration::from_millis(3)).await;
            }
        })
    });

    for result in join_all(tasks).await {
        result.unwrap();
    }
    assert_eq!(cache.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_are_not_deduplicated() {
    lazycache_test::setup();

    let source = CountingSource::new()
        .with_fallback(|key| Ok(Some(format!("fetch:{key}"))))
        .with_delay(Duration::from_millis(50));
    let cache = LazyCache::new(counting_fetcher(&source), LazyCacheConfig::default());

    let reads = (0..4).map(|_| cache.get("spice"));
    for result in join_all(reads).await {
        assert_eq!(result, Ok(Some("fetch:spice".into())));
    }

    // every caller that saw the miss went to the source, the results agree anyway
    assert_eq!(source.calls("spice"), 4);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_guarded_misses() {
    lazycache_test::setup();

    for strategy in [
        SuppressionStrategy::Unbounded,
        SuppressionStrategy::Slots { size: 64 },
    ] {
        let source = CountingSource::new();
        let guard = MissGuard::new(
            counting_fetcher(&source),
            MissGuardConfig {
                ttl: Duration::from_secs(60),
                strategy,
            },
        );

        let keys: Vec<_> = (0..16).map(|i| format!("missing{i}")).collect();
        for key in &keys {
            assert_eq!(guard.fetch(key).await, Ok(None));
        }

        let tasks = (0..8).map(|_| {
            let guard = guard.clone();
            let keys = keys.clone();
            tokio::spawn(async move {
                for key in &keys {
                    assert_eq!(guard.fetch(key).await, Ok(None));
                }
            })
        });
        for result in join_all(tasks).await {
            result.unwrap();
        }

        match strategy {
            SuppressionStrategy::Unbounded => assert_eq!(source.total_calls(), 16),
            // keys colliding on a slot evict each other and may be fetched again
            SuppressionStrategy::Slots { .. } => assert!(source.total_calls() >= 16),
        }
    }
}
