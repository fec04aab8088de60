use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use lote_trust_provision::memo_cache::{AsyncMemoCache, CacheError};

fn cache(ttl: Duration) -> Arc<AsyncMemoCache<String, u32>> {
    Arc::new(AsyncMemoCache::new(ttl, NonZeroUsize::new(16).unwrap()))
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_supplier_run() {
    let cache = cache(Duration::from_secs(10));
    let calls = Arc::new(AtomicU32::new(0));
    let started = tokio::time::Instant::now();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get("k".to_owned(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(42u32)
                    })
                    .await
            })
        })
        .collect();

    let results = join_all(handles).await;
    for result in results {
        assert_eq!(result.unwrap().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // One 200ms supplier run, not one hundred of them back to back.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(1), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn live_entry_is_shared_across_sequential_gets() {
    let cache = cache(Duration::from_secs(10));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
        let calls = Arc::clone(&calls);
        let value = cache
            .get("k".to_owned(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_keys_do_not_share_entries() {
    let cache = cache(Duration::from_secs(10));
    let calls = Arc::new(AtomicU32::new(0));

    for key in ["a", "b"] {
        let calls = Arc::clone(&calls);
        cache
            .get(key.to_owned(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1u32)
            })
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_supplier_is_evicted_so_the_next_call_retries() {
    let cache = cache(Duration::from_secs(10));

    let error = cache
        .get("k".to_owned(), || async { Err::<u32, _>(anyhow::anyhow!("backend down")) })
        .await
        .unwrap_err();
    assert!(matches!(error, CacheError::Supplier(_)));
    assert!(error.to_string().contains("backend down"));

    let value = cache.get("k".to_owned(), || async { Ok(3u32) }).await.unwrap();
    assert_eq!(value, 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_of_a_failing_supplier_all_see_the_failure() {
    let cache = cache(Duration::from_secs(10));
    let calls = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get("k".to_owned(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err::<u32, _>(anyhow::anyhow!("still down"))
                    })
                    .await
            })
        })
        .collect();

    for result in join_all(handles).await {
        assert!(matches!(result.unwrap(), Err(CacheError::Supplier(_))));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn an_older_failure_does_not_evict_a_newer_entry() {
    let cache = cache(Duration::from_millis(150));
    let second_calls = Arc::new(AtomicU32::new(0));
    let third_calls = Arc::new(AtomicU32::new(0));

    let slow_failure = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get("k".to_owned(), || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Err::<u32, _>(anyhow::anyhow!("too late"))
                })
                .await
        })
    };

    // Let the first entry expire, then install a fresh one.
    tokio::time::sleep(Duration::from_millis(160)).await;
    let second = {
        let second_calls = Arc::clone(&second_calls);
        cache
            .get("k".to_owned(), move || async move {
                second_calls.fetch_add(1, Ordering::SeqCst);
                Ok(2u32)
            })
            .await
            .unwrap()
    };
    assert_eq!(second, 2);

    // The old run fails after the new entry went in; it must not evict it.
    assert!(matches!(
        slow_failure.await.unwrap(),
        Err(CacheError::Supplier(_))
    ));

    let third = {
        let third_calls = Arc::clone(&third_calls);
        cache
            .get("k".to_owned(), move || async move {
                third_calls.fetch_add(1, Ordering::SeqCst);
                Ok(3u32)
            })
            .await
            .unwrap()
    };
    assert_eq!(third, 2, "the fresh entry must still be served");
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    assert_eq!(third_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn entries_older_than_ttl_force_reinvocation() {
    let cache = cache(Duration::from_millis(100));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        cache
            .get("k".to_owned(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1u32)
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn closed_cache_rejects_gets() {
    let cache = cache(Duration::from_secs(10));
    cache.close();
    let error = cache
        .get("k".to_owned(), || async { Ok(1u32) })
        .await
        .unwrap_err();
    assert!(matches!(error, CacheError::Closed));
    // Idempotent.
    cache.close();
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_computations() {
    let cache = cache(Duration::from_secs(10));

    let pending = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get("k".to_owned(), || async {
                    tokio::time::sleep(Duration::from_secs(100)).await;
                    Ok(1u32)
                })
                .await
        })
    };

    // Let the pending computation install itself before closing.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    cache.close();

    assert!(matches!(
        pending.await.unwrap(),
        Err(CacheError::Cancelled)
    ));
}
