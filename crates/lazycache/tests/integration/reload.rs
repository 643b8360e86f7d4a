use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lazycache::config::{LazyCacheConfig, ReloadConfig};
use lazycache::{FetchError, LazyCache, Reloader, loader_fn};
use lazycache_test::CountingSource;

use crate::counting_fetcher;

#[tokio::test(start_paused = true)]
async fn test_reloader_replaces_entries() {
    lazycache_test::setup();

    let source = CountingSource::new();
    let cache = LazyCache::new(counting_fetcher(&source), LazyCacheConfig::default());
    cache.set("stale", "gone soon".into());

    let loads = Arc::new(AtomicUsize::new(0));
    let loader = {
        let loads = Arc::clone(&loads);
        loader_fn(move || {
            let generation = loads.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                Ok::<_, FetchError>(HashMap::from([(
                    "generation".to_owned(),
                    generation.to_string(),
                )]))
            }
        })
    };
    let reloader = Reloader::spawn(&cache, loader, Duration::from_secs(10));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("generation").await, Ok(Some("1".into())));
    assert_eq!(cache.get("stale").await, Ok(None));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get("generation").await, Ok(Some("2".into())));

    drop(reloader);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reloader_keeps_entries_on_error() {
    lazycache_test::setup();

    let source = CountingSource::new();
    let cache = LazyCache::new(counting_fetcher(&source), LazyCacheConfig::default());
    cache.set("a", "32".into());

    let loader = loader_fn(|| async {
        Err::<HashMap<String, String>, _>(FetchError::Unavailable("abc".into()))
    });
    let reloader = Reloader::spawn(&cache, loader, Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(!reloader.is_finished());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("a").await, Ok(Some("32".into())));
}

#[tokio::test(start_paused = true)]
async fn test_reloader_stops_with_the_cache() {
    lazycache_test::setup();

    let source = CountingSource::new();
    let cache = LazyCache::new(counting_fetcher(&source), LazyCacheConfig::default());

    let loader = loader_fn(|| async { Ok::<_, FetchError>(HashMap::<String, String>::new()) });
    let reloader = Reloader::spawn(&cache, loader, Duration::from_secs(1));

    drop(cache);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(reloader.is_finished());
}

#[tokio::test]
async fn test_reloader_from_config() {
    lazycache_test::setup();

    let source = CountingSource::new();
    let cache = LazyCache::new(counting_fetcher(&source), LazyCacheConfig::default());
    let loader = loader_fn(|| async { Ok::<_, FetchError>(HashMap::<String, String>::new()) });

    let disabled = Reloader::from_config(&cache, loader.clone(), &ReloadConfig::default());
    assert!(disabled.is_none());

    let config = ReloadConfig {
        interval: Some(Duration::from_secs(60)),
    };
    let enabled = Reloader::from_config(&cache, loader, &config);
    assert!(enabled.is_some_and(|reloader| !reloader.is_finished()));
}
