//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 并发写入者场景集成测试

use rwcache::{AccessStrategy, CacheKey, Region};
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

use common::{lock_of, memory_region, versioned_entity_access};

const TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_two_concurrent_writers_leave_drained_lock() {
    common::setup_logging();
    let region = memory_region("conc_two_writers", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Account", 1);

    let first = access.lock_item(&key, None).await.unwrap();
    let second = access.lock_item(&key, None).await.unwrap();

    let lock = lock_of(region.as_ref(), &key).await;
    assert_eq!(lock.multiplicity(), 2);
    assert!(lock.concurrent);

    // 两个写入者都不能写入值，只能释放各自的份额
    assert!(!access
        .after_update(&key, b"A".to_vec(), None, first)
        .await
        .unwrap());
    assert_eq!(lock_of(region.as_ref(), &key).await.multiplicity(), 1);

    let before_drain = access.next_timestamp();
    assert!(!access
        .after_update(&key, b"B".to_vec(), None, second)
        .await
        .unwrap());

    let lock = lock_of(region.as_ref(), &key).await;
    assert_eq!(lock.multiplicity(), 0);
    assert!(lock.unlock_timestamp.is_some());

    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), None);

    // 在锁排空之前开始的加载可能读到任一写入者的值
    assert!(!access
        .put_from_load(&key, b"A".to_vec(), before_drain, None)
        .await
        .unwrap());

    let after_drain = access.next_timestamp();
    assert!(access
        .put_from_load(&key, b"B".to_vec(), after_drain, None)
        .await
        .unwrap());
    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), Some(b"B".to_vec()));
}

#[tokio::test]
async fn test_rollback_and_commit_interleaved() {
    common::setup_logging();
    let region = memory_region("conc_rollback_commit", TIMEOUT);
    let access = versioned_entity_access(region.clone());
    let key = CacheKey::entity("Account", 2);

    let committer = access.lock_item(&key, None).await.unwrap();
    let rollbacker = access.lock_item(&key, None).await.unwrap();

    access.unlock_item(&key, rollbacker).await.unwrap();
    assert!(!access
        .after_update(&key, b"committed".to_vec(), None, committer)
        .await
        .unwrap());

    let lock = lock_of(region.as_ref(), &key).await;
    assert!(lock.is_drained());
    assert!(lock.concurrent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_lockers_never_publish_a_value() {
    common::setup_logging();
    let region = memory_region("conc_many", TIMEOUT);
    let access = Arc::new(versioned_entity_access(region.clone()));
    let key = CacheKey::entity("Account", 3);

    // 先持有一把锁，保证其余写入者都与之并发
    let anchor = access.lock_item(&key, None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..32u8 {
        let access = access.clone();
        let key = key.clone();
        let rollback = rand::random::<bool>();
        handles.push(tokio::spawn(async move {
            let token = access.lock_item(&key, None).await.unwrap();
            tokio::task::yield_now().await;
            if rollback {
                access.unlock_item(&key, token).await.unwrap();
                false
            } else {
                access
                    .after_update(&key, vec![i], None, token)
                    .await
                    .unwrap()
            }
        }));
    }

    for handle in handles {
        assert!(!handle.await.unwrap(), "concurrent writer must not cache");
    }

    assert_eq!(lock_of(region.as_ref(), &key).await.multiplicity(), 1);
    access.unlock_item(&key, anchor).await.unwrap();

    let lock = lock_of(region.as_ref(), &key).await;
    assert_eq!(lock.multiplicity(), 0);
    let tx = access.next_timestamp();
    assert_eq!(access.get(&key, tx).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_keep_highest_version() {
    common::setup_logging();
    let region = memory_region("conc_loads", TIMEOUT);
    let access = Arc::new(versioned_entity_access(region.clone()));
    let key = CacheKey::entity("Account", 4);
    let tx = access.next_timestamp();

    let mut handles = Vec::new();
    for version in 1..=50i64 {
        let access = access.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            access
                .put_from_load(
                    &key,
                    version.to_string().into_bytes(),
                    tx,
                    Some(rwcache::Version::Int(version)),
                )
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let entry = region.get(&key).await.unwrap().unwrap();
    assert_eq!(entry.version(), Some(&rwcache::Version::Int(50)));
    assert_eq!(entry.value(), Some(b"50".as_slice()));
}
