//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 本地缓存引擎集成测试

#[path = "../common/mod.rs"]
mod common;

use replicache::metrics::GLOBAL_METRICS;
use replicache::{CacheExt, CacheOps};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 测试未命中时调用生成函数，命中时不再调用
#[tokio::test]
async fn test_get_or_create_runs_producer_once() {
    common::setup_logging();
    let service = common::generate_unique_service_name("local_memo");
    let cache = common::local_cache(&service, Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = calls.clone();
        let value: Result<String, String> = cache
            .get_or_create("user:1", None, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("alice".to_string())
            })
            .await;
        assert_eq!(value.unwrap(), "alice");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        GLOBAL_METRICS.get_count(&service, "local", "get_or_create", "miss"),
        1
    );
    assert_eq!(
        GLOBAL_METRICS.get_count(&service, "local", "get_or_create", "hit"),
        2
    );
}

/// 测试条目过期后重新生成
#[tokio::test]
async fn test_entry_expires_after_ttl() {
    common::setup_logging();
    let cache = common::local_cache("local_expiry", Duration::from_secs(60));

    let first: Result<u32, String> = cache
        .get_or_create("k", Some(Duration::from_millis(50)), || async { Ok(1) })
        .await;
    assert_eq!(first, Ok(1));

    tokio::time::sleep(Duration::from_millis(120)).await;

    let second: Result<u32, String> = cache
        .get_or_create("k", Some(Duration::from_millis(50)), || async { Ok(2) })
        .await;
    assert_eq!(second, Ok(2));
}

/// 测试 `Duration::ZERO` 表示永不过期
#[tokio::test]
async fn test_zero_ttl_never_expires() {
    let cache = common::local_cache("local_zero_ttl", Duration::from_millis(10));
    cache.set("pinned", &42u64, Some(Duration::ZERO)).await.unwrap();
    cache.set("default", &1u64, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.get::<u64>("pinned").await.unwrap(), Some(42));
    assert_eq!(cache.get::<u64>("default").await.unwrap(), None);
}

/// 测试调用方传入极大的TTL不会溢出
#[tokio::test]
async fn test_huge_ttl_is_accepted() {
    let cache = common::local_cache("local_huge_ttl", Duration::from_secs(60));
    let value: Result<u32, String> = cache
        .get_or_create("k", Some(Duration::from_secs(u64::MAX)), || async { Ok(1) })
        .await;
    assert_eq!(value, Ok(1));

    cache.set("m", &2u32, Some(Duration::MAX)).await.unwrap();
    assert_eq!(cache.get::<u32>("m").await.unwrap(), Some(2));
}

/// 测试删除是幂等的
#[tokio::test]
async fn test_remove_is_idempotent() {
    let cache = common::local_cache("local_remove", Duration::from_secs(60));
    cache.set("a", &1u8, None).await.unwrap();

    cache.remove("a").await;
    cache.remove("a").await;
    cache.remove("never-existed").await;

    assert_eq!(cache.get::<u8>("a").await.unwrap(), None);
}

/// 测试按前缀删除只影响匹配的键，且忽略大小写
#[tokio::test]
async fn test_remove_by_prefix_scope() {
    let cache = common::local_cache("local_prefix", Duration::from_secs(60));
    for key in ["products:1", "Products:2", "orders:1"] {
        cache.set(key, &key.to_string(), None).await.unwrap();
    }

    cache.remove_by_prefix("PRODUCTS:").await;

    assert_eq!(cache.get::<String>("products:1").await.unwrap(), None);
    assert_eq!(cache.get::<String>("Products:2").await.unwrap(), None);
    assert_eq!(
        cache.get::<String>("orders:1").await.unwrap(),
        Some("orders:1".to_string())
    );
}

/// 测试空前缀匹配所有键
#[tokio::test]
async fn test_empty_prefix_removes_everything() {
    let cache = common::local_cache("local_empty_prefix", Duration::from_secs(60));
    cache.set("a", &1u8, None).await.unwrap();
    cache.set("b", &2u8, None).await.unwrap();

    cache.remove_by_prefix("").await;

    assert_eq!(cache.get::<u8>("a").await.unwrap(), None);
    assert_eq!(cache.get::<u8>("b").await.unwrap(), None);
}

/// 测试清空后旧条目不可见，新写入的条目可见
#[tokio::test]
async fn test_clear_all_hides_previous_entries() {
    let cache = common::local_cache("local_clear", Duration::from_secs(60));
    cache.set("a", &1u8, None).await.unwrap();
    cache.set("b", &2u8, None).await.unwrap();

    cache.clear_all().await;
    assert_eq!(cache.get::<u8>("a").await.unwrap(), None);
    assert_eq!(cache.get::<u8>("b").await.unwrap(), None);

    cache.set("a", &3u8, None).await.unwrap();
    assert_eq!(cache.get::<u8>("a").await.unwrap(), Some(3));
    assert_eq!(cache.store().live_keys(), vec!["a".to_string()]);
}

/// 测试生成函数失败时错误原样返回且不缓存
#[tokio::test]
async fn test_producer_failure_is_not_cached() {
    let service = common::generate_unique_service_name("local_failure");
    let cache = common::local_cache(&service, Duration::from_secs(60));

    let failed: Result<u32, String> = cache
        .get_or_create("k", None, || async { Err("database down".to_string()) })
        .await;
    assert_eq!(failed, Err("database down".to_string()));
    assert_eq!(cache.get::<u32>("k").await.unwrap(), None);
    assert_eq!(
        GLOBAL_METRICS.get_count(&service, "local", "produce", "failure"),
        1
    );

    let recovered: Result<u32, String> =
        cache.get_or_create("k", None, || async { Ok(9) }).await;
    assert_eq!(recovered, Ok(9));
}

/// 测试并发未命中：每个调用方都得到合法的值，缓存中保留其中之一
#[tokio::test]
async fn test_concurrent_misses_settle_on_one_value() {
    let cache = common::local_cache("local_concurrent", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let value: Result<u32, String> = cache
                .get_or_create("shared", None, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(i)
                })
                .await;
            value
        }));
    }

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert!(value < 8);
    }

    let calls = calls.load(Ordering::SeqCst);
    assert!((1..=8).contains(&calls));
    let cached = cache.get::<u32>("shared").await.unwrap();
    assert!(matches!(cached, Some(v) if v < 8));
}

/// 测试后台清理回收过期条目
#[tokio::test]
async fn test_sweeper_reclaims_expired_entries() {
    let service = common::generate_unique_service_name("local_sweeper");
    let cache = common::local_cache(&service, Duration::from_millis(30));
    let _handle = cache.start_sweeper(Duration::from_millis(50));

    cache.set("a", &1u8, None).await.unwrap();
    cache.set("b", &2u8, None).await.unwrap();

    let store = cache.store().clone();
    let reclaimed = common::eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.entry_count().await == 0 }
    })
    .await;
    assert!(reclaimed);

    cache.shutdown().await.unwrap();
}
