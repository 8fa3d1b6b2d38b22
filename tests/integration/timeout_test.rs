//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 软锁超时自愈集成测试

use rwcache::{AccessStrategy, CacheKey, Version};
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

use common::{lock_of, memory_region, versioned_entity_access};

#[tokio::test]
async fn test_abandoned_lock_expires() {
    common::setup_logging();
    let region = memory_region("timeout_abandoned", Duration::from_millis(1));
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Invoice", 1);

    // 写入者加锁后消失，从不释放
    let _abandoned = access.lock_item(&key, None).await.unwrap();
    assert!(lock_of(region.as_ref(), &key).await.multiplicity() > 0);

    tokio::time::sleep(Duration::from_millis(5)).await;

    let tx = access.next_timestamp();
    assert!(access
        .put_from_load(&key, b"late".to_vec(), tx, None)
        .await
        .unwrap());
    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), Some(b"late".to_vec()));
}

#[tokio::test]
async fn test_after_insert_replaces_expired_lock() {
    common::setup_logging();
    let region = memory_region("timeout_insert", Duration::from_millis(1));
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Invoice", 2);

    let _abandoned = access.lock_item(&key, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(access
        .after_insert(&key, b"inserted".to_vec(), Some(Version::Int(0)))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_expired_token_is_reported_and_evicted() {
    common::setup_logging();
    let region = memory_region("timeout_token", Duration::from_millis(1));
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Invoice", 3);

    let stale = access.lock_item(&key, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    // 超时后被新加载覆盖，原令牌失效
    let tx = access.next_timestamp();
    access
        .put_from_load(&key, b"reloaded".to_vec(), tx, None)
        .await
        .unwrap();

    let expired_before = rwcache::metrics::GLOBAL_METRICS.count("timeout_token", "unlock", "expired");
    assert!(!access
        .after_update(&key, b"stale".to_vec(), None, stale)
        .await
        .unwrap());
    assert!(!access.contains(&key).await.unwrap());
    assert_eq!(
        rwcache::metrics::GLOBAL_METRICS.count("timeout_token", "unlock", "expired"),
        expired_before + 1
    );
}

#[tokio::test]
async fn test_relock_extends_timeout() {
    common::setup_logging();
    let region = memory_region("timeout_relock", Duration::from_millis(20));
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Invoice", 4);

    let _first = access.lock_item(&key, None).await.unwrap();
    let first_timeout = lock_of(region.as_ref(), &key).await.timeout;

    tokio::time::sleep(Duration::from_millis(2)).await;
    let _second = access.lock_item(&key, None).await.unwrap();
    let lock = lock_of(region.as_ref(), &key).await;

    assert!(lock.timeout > first_timeout);
    assert_eq!(lock.multiplicity(), 2);
}
