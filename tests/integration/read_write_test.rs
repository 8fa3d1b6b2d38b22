//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 读写协议基本流程集成测试

use rwcache::access::AccessExt;
use rwcache::{AccessStrategy, CacheEntry, CacheError, CacheKey, Region, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

use common::{lock_of, memory_region, unversioned_entity_access, versioned_entity_access};

const TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_get_on_empty_region_misses() {
    common::setup_logging();
    let access = versioned_entity_access(memory_region("rw_empty", TIMEOUT));
    let key = CacheKey::entity("Order", 1);

    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), None);
    assert!(!access.contains(&key).await.unwrap());
}

#[tokio::test]
async fn test_put_from_load_visible_only_to_later_transactions() {
    common::setup_logging();
    let access = versioned_entity_access(memory_region("rw_visibility", TIMEOUT));
    let key = CacheKey::entity("Order", 1);

    let early_tx = access.next_timestamp();
    assert!(access
        .put_from_load(&key, b"order-1".to_vec(), early_tx, Some(Version::Int(1)))
        .await
        .unwrap());

    // 在写入之前开始的事务看不到该条目
    assert_eq!(access.get(&key, early_tx).await.unwrap(), None);

    let late_tx = access.next_timestamp();
    assert_eq!(
        access.get(&key, late_tx).await.unwrap(),
        Some(b"order-1".to_vec())
    );
}

#[tokio::test]
async fn test_lock_then_update_on_empty_key_caches_value() {
    common::setup_logging();
    let access = versioned_entity_access(memory_region("rw_lock_update", TIMEOUT));
    let key = CacheKey::entity("Order", 7);

    let token = access
        .lock_item(&key, Some(Version::Int(1)))
        .await
        .unwrap();
    assert!(!access
        .update(&key, b"A", Some(&Version::Int(2)), Some(&Version::Int(1)))
        .await
        .unwrap());
    assert!(access
        .after_update(&key, b"A".to_vec(), Some(Version::Int(2)), token)
        .await
        .unwrap());

    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), Some(b"A".to_vec()));
}

#[tokio::test]
async fn test_committed_write_hidden_from_transactions_started_before() {
    common::setup_logging();
    let access = versioned_entity_access(memory_region("rw_before_commit", TIMEOUT));
    let key = CacheKey::entity("Order", 3);

    let reader_tx = access.next_timestamp();
    let token = access.lock_item(&key, None).await.unwrap();
    assert_eq!(access.get(&key, reader_tx).await.unwrap(), None);

    access
        .after_update(&key, b"new".to_vec(), Some(Version::Int(1)), token)
        .await
        .unwrap();

    assert_eq!(access.get(&key, reader_tx).await.unwrap(), None);
    let later_tx = access.next_timestamp();
    assert_eq!(
        access.get(&key, later_tx).await.unwrap(),
        Some(b"new".to_vec())
    );
}

#[tokio::test]
async fn test_insert_is_deferred_until_after_insert() {
    common::setup_logging();
    let region = memory_region("rw_insert", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Order", 10);

    assert!(!access
        .insert(&key, b"fresh", Some(&Version::Int(0)))
        .await
        .unwrap());
    assert!(region.get(&key).await.unwrap().is_none());

    assert!(access
        .after_insert(&key, b"fresh".to_vec(), Some(Version::Int(0)))
        .await
        .unwrap());

    // 已有条目时不覆盖
    assert!(!access
        .after_insert(&key, b"other".to_vec(), Some(Version::Int(5)))
        .await
        .unwrap());
    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), Some(b"fresh".to_vec()));
}

#[tokio::test]
async fn test_after_insert_does_not_replace_held_lock() {
    common::setup_logging();
    let region = memory_region("rw_insert_locked", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Order", 11);

    let _token = access.lock_item(&key, None).await.unwrap();
    assert!(!access
        .after_insert(&key, b"racy".to_vec(), None)
        .await
        .unwrap());
    assert!(region.get(&key).await.unwrap().unwrap().is_lock());
}

#[tokio::test]
async fn test_version_monotonicity() {
    common::setup_logging();
    let access = versioned_entity_access(memory_region("rw_versions", TIMEOUT));
    let key = CacheKey::entity("Order", 2);

    let tx = access.next_timestamp();
    assert!(access
        .put_from_load(&key, b"v5".to_vec(), tx, Some(Version::Int(5)))
        .await
        .unwrap());

    let tx = access.next_timestamp();
    assert!(!access
        .put_from_load(&key, b"v4".to_vec(), tx, Some(Version::Int(4)))
        .await
        .unwrap());
    assert!(!access
        .put_from_load(&key, b"v5-again".to_vec(), tx, Some(Version::Int(5)))
        .await
        .unwrap());
    assert!(!access
        .put_from_load(&key, b"none".to_vec(), tx, None)
        .await
        .unwrap());

    let read_tx = access.next_timestamp();
    assert_eq!(access.get(&key, read_tx).await.unwrap(), Some(b"v5".to_vec()));

    assert!(access
        .put_from_load(&key, b"v6".to_vec(), tx, Some(Version::Int(6)))
        .await
        .unwrap());
    let read_tx = access.next_timestamp();
    assert_eq!(access.get(&key, read_tx).await.unwrap(), Some(b"v6".to_vec()));
}

#[tokio::test]
async fn test_unversioned_items_are_never_overwritten_by_loads() {
    common::setup_logging();
    let region = memory_region("rw_unversioned", TIMEOUT);
    let access = unversioned_entity_access(region.clone());
    let key = CacheKey::entity("Setting", "theme");

    let tx = access.next_timestamp();
    assert!(access
        .put_from_load(&key, b"dark".to_vec(), tx, Some(Version::Int(1)))
        .await
        .unwrap());

    // 未配置比较器时版本被丢弃
    let entry = region.get(&key).await.unwrap().unwrap();
    assert_eq!(entry.version(), None);

    let tx = access.next_timestamp();
    assert!(!access
        .put_from_load(&key, b"light".to_vec(), tx, Some(Version::Int(2)))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rollback_leaves_drained_lock() {
    common::setup_logging();
    let region = memory_region("rw_rollback", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Order", 4);

    let tx = access.next_timestamp();
    access
        .put_from_load(&key, b"old".to_vec(), tx, None)
        .await
        .unwrap();

    let token = access.lock_item(&key, None).await.unwrap();
    let before_unlock = access.next_timestamp();
    access.unlock_item(&key, token).await.unwrap();

    let lock = lock_of(region.as_ref(), &key).await;
    assert_eq!(lock.multiplicity(), 0);
    let unlocked_at = lock.unlock_timestamp.expect("unlock timestamp must be set");
    assert!(unlocked_at > before_unlock);

    // 排空的锁不可读
    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), None);

    // 解锁之前开始的加载不能回填，之后开始的可以
    assert!(!access
        .put_from_load(&key, b"stale".to_vec(), before_unlock, None)
        .await
        .unwrap());
    let after_unlock = access.next_timestamp();
    assert!(access
        .put_from_load(&key, b"reloaded".to_vec(), after_unlock, None)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_drained_lock_is_replaced_by_newer_version() {
    common::setup_logging();
    let region = memory_region("rw_drained_versioned", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Order", 12);

    let tx = access.next_timestamp();
    access
        .put_from_load(&key, b"v3".to_vec(), tx, Some(Version::Int(3)))
        .await
        .unwrap();
    let token = access.lock_item(&key, Some(Version::Int(3))).await.unwrap();
    let old_tx = access.next_timestamp();
    access.unlock_item(&key, token).await.unwrap();

    assert_eq!(lock_of(region.as_ref(), &key).await.version, Some(Version::Int(3)));
    assert!(!access
        .put_from_load(&key, b"v3".to_vec(), old_tx, Some(Version::Int(3)))
        .await
        .unwrap());
    assert!(access
        .put_from_load(&key, b"v4".to_vec(), old_tx, Some(Version::Int(4)))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_foreign_token_evicts_key() {
    common::setup_logging();
    let region = memory_region("rw_foreign", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let other = versioned_entity_access(memory_region("rw_foreign_other", TIMEOUT));
    let key = CacheKey::entity("Order", 5);

    let _held = access.lock_item(&key, None).await.unwrap();
    let foreign = other.lock_item(&key, None).await.unwrap();

    access.unlock_item(&key, foreign).await.unwrap();
    assert!(region.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_double_unlock_evicts_instead_of_underflowing() {
    common::setup_logging();
    let region = memory_region("rw_double_unlock", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Order", 6);

    let token = access.lock_item(&key, None).await.unwrap();
    access.unlock_item(&key, token).await.unwrap();
    assert_eq!(lock_of(region.as_ref(), &key).await.multiplicity(), 0);

    access.unlock_item(&key, token).await.unwrap();
    assert!(region.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_unlock_after_relock_evicts_instead_of_releasing_new_holder() {
    common::setup_logging();
    let region = memory_region("rw_stale_relock", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Order", 16);

    let first = access.lock_item(&key, None).await.unwrap();
    access.unlock_item(&key, first).await.unwrap();

    // 已释放的锁上再次加锁，新持有者得到不同的令牌
    let second = access.lock_item(&key, None).await.unwrap();
    assert_ne!(first, second);
    let lock = lock_of(region.as_ref(), &key).await;
    assert_eq!(lock.multiplicity(), 1);
    assert!(!lock.is_unlockable(&first));
    assert!(lock.is_unlockable(&second));

    // 重复释放旧令牌不能抵消新持有者的份额
    access.unlock_item(&key, first).await.unwrap();
    assert!(region.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_after_update_with_stale_token_evicts() {
    common::setup_logging();
    let region = memory_region("rw_stale_update", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Order", 8);

    let token = access.lock_item(&key, None).await.unwrap();
    access.evict(&key).await.unwrap();
    let tx = access.next_timestamp();
    access
        .put_from_load(&key, b"reloaded".to_vec(), tx, None)
        .await
        .unwrap();

    assert!(!access
        .after_update(&key, b"mine".to_vec(), Some(Version::Int(2)), token)
        .await
        .unwrap());
    assert!(region.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_minimal_puts_skip_existing_entries() {
    common::setup_logging();
    let region = memory_region("rw_minimal", TIMEOUT);
    let access = rwcache::EntityReadWriteAccess::new(
        rwcache::ReadWriteAccess::new(region.clone())
            .with_comparator(Arc::new(rwcache::NaturalVersionComparator))
            .with_minimal_puts(true),
    );
    let key = CacheKey::entity("Order", 9);

    let tx = access.next_timestamp();
    assert!(access
        .put_from_load_minimal(&key, b"v1".to_vec(), tx, Some(Version::Int(1)), true)
        .await
        .unwrap());

    let tx = access.next_timestamp();
    assert!(!access
        .put_from_load_minimal(&key, b"v2".to_vec(), tx, Some(Version::Int(2)), true)
        .await
        .unwrap());
    // 调用方不要求最小写入时按正常规则写入
    assert!(access
        .put_from_load_minimal(&key, b"v2".to_vec(), tx, Some(Version::Int(2)), false)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_evict_and_evict_all() {
    common::setup_logging();
    let region = memory_region("rw_evict", TIMEOUT);
    let access = versioned_entity_access(region.clone());

    let tx = access.next_timestamp();
    for id in 0..5 {
        access
            .put_from_load(&CacheKey::entity("Order", id), vec![id as u8], tx, None)
            .await
            .unwrap();
    }
    let _token = access
        .lock_item(&CacheKey::entity("Order", 99), None)
        .await
        .unwrap();
    assert_eq!(region.len(), 6);

    access.evict(&CacheKey::entity("Order", 0)).await.unwrap();
    assert_eq!(region.len(), 5);

    access.evict_all().await.unwrap();
    assert!(region.is_empty());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    total_cents: i64,
    lines: Vec<String>,
}

#[tokio::test]
async fn test_typed_round_trip_through_serializer() {
    common::setup_logging();
    let access = versioned_entity_access(memory_region("rw_typed", TIMEOUT));
    let order = Order {
        id: 1,
        total_cents: 1999,
        lines: vec!["book".to_string()],
    };
    let key = access.generate_cache_key(order.id, "Order", Some("acme"));

    let tx = access.next_timestamp();
    assert!(access
        .put_from_load_as(&key, &order, tx, Some(Version::Int(1)))
        .await
        .unwrap());

    let token = access.lock_item(&key, Some(Version::Int(1))).await.unwrap();
    let updated = Order {
        total_cents: 2999,
        ..order.clone()
    };
    assert!(access
        .after_update_as(&key, &updated, Some(Version::Int(2)), token)
        .await
        .unwrap());

    let tx = access.next_timestamp();
    let cached: Option<Order> = access.get_as(&key, tx).await.unwrap();
    assert_eq!(cached, Some(updated));
}

#[tokio::test]
async fn test_region_failure_propagates() {
    common::setup_logging();
    let region = Arc::new(common::FlakyRegion::new("rw_flaky"));
    let access = rwcache::EntityReadWriteAccess::new(rwcache::ReadWriteAccess::new(region.clone()));
    let key = CacheKey::entity("Order", 1);

    region.set_down(true);
    let tx = access.next_timestamp();
    assert!(matches!(
        access.get(&key, tx).await,
        Err(CacheError::RegionError(_))
    ));
    assert!(matches!(
        access.lock_item(&key, None).await,
        Err(CacheError::RegionError(_))
    ));

    region.set_down(false);
    let token = access.lock_item(&key, None).await.unwrap();
    region.set_down(true);
    assert!(access.unlock_item(&key, token).await.is_err());

    // 区域恢复后锁仍在，令牌依然有效
    region.set_down(false);
    access.unlock_item(&key, token).await.unwrap();
    match region.get(&key).await.unwrap() {
        Some(CacheEntry::Lock(lock)) => assert_eq!(lock.multiplicity(), 0),
        other => panic!("expected drained lock, got {:?}", other),
    }
}
