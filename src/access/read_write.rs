//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现读写缓存一致性协议的核心操作。
//!
//! 读取方只信任事务开始前写入的 Item；写入方在修改数据库前加软锁，
//! 提交后用新值替换锁，回滚时只释放锁。任何操作都不会阻塞等待其他操作。

use crate::entry::{CacheEntry, Item, LockToken, SoftLock};
use crate::error::Result;
use crate::key::CacheKey;
use crate::metrics::GLOBAL_METRICS;
use crate::region::{Mutation, Region};
use crate::serialization::SerializerEnum;
use crate::version::{Version, VersionComparator};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// 释放软锁的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    /// 释放了一个持有者；`drained` 表示已无持有者
    Released { drained: bool },
    /// 键已被显式移除，无需处理
    Removed,
    /// 令牌不再被识别，键已被驱逐
    Expired,
}

/// 提交后写入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finalize {
    Cached,
    /// 并发写入者存在，只释放了本持有者的份额
    Released { drained: bool },
    Expired,
}

/// 读写访问策略的核心
///
/// 每个实例拥有随机的所有者标识和递增的锁序号，用于构造锁令牌
pub struct ReadWriteAccess<R: Region> {
    region: Arc<R>,
    owner: Uuid,
    next_lock_id: AtomicU64,
    comparator: Option<Arc<dyn VersionComparator>>,
    minimal_puts: bool,
    metrics_enabled: bool,
    serializer: SerializerEnum,
}

impl<R: Region> ReadWriteAccess<R> {
    pub fn new(region: Arc<R>) -> Self {
        Self {
            region,
            owner: Uuid::new_v4(),
            next_lock_id: AtomicU64::new(0),
            comparator: None,
            minimal_puts: false,
            metrics_enabled: true,
            serializer: SerializerEnum::default(),
        }
    }

    /// 设置版本比较器；未设置时该类型视为无版本
    pub fn with_comparator(mut self, comparator: Arc<dyn VersionComparator>) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// 去掉比较器，用于无版本的集合和自然键
    pub fn without_comparator(mut self) -> Self {
        self.comparator = None;
        self
    }

    pub fn with_minimal_puts(mut self, minimal_puts: bool) -> Self {
        self.minimal_puts = minimal_puts;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerEnum) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn region(&self) -> &Arc<R> {
        &self.region
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    pub fn is_versioned(&self) -> bool {
        self.comparator.is_some()
    }

    /// 区域时钟的下一个时间戳，通常作为事务开始时间
    pub fn next_timestamp(&self) -> u64 {
        self.region.next_timestamp()
    }

    /// 没有比较器时丢弃版本，避免无序覆盖
    fn effective_version(&self, version: Option<Version>) -> Option<Version> {
        self.comparator.as_ref().and(version)
    }

    fn record(&self, op: &str, result: &str) {
        if self.metrics_enabled {
            GLOBAL_METRICS.record(self.region.name(), op, result);
        }
    }

    /// 读取缓存值
    ///
    /// 只有 Item 存在且 `tx_timestamp` 严格大于其写入时间时才命中
    #[instrument(skip(self), level = "debug", fields(region = %self.region.name()))]
    pub async fn get(&self, key: &CacheKey, tx_timestamp: u64) -> Result<Option<Vec<u8>>> {
        let entry = self.region.get(key).await?;
        match entry {
            Some(entry) if entry.is_readable(tx_timestamp) => {
                debug!("Cache hit: key={}", key);
                self.record("get", "hit");
                Ok(entry.value().map(|v| v.to_vec()))
            }
            Some(entry) => {
                debug!(
                    "Cache miss: key={}, locked={}, unreadable at {}",
                    key,
                    entry.is_lock(),
                    tx_timestamp
                );
                self.record("get", "miss");
                Ok(None)
            }
            None => {
                debug!("Cache miss: key={}, absent", key);
                self.record("get", "miss");
                Ok(None)
            }
        }
    }

    pub async fn contains(&self, key: &CacheKey) -> Result<bool> {
        self.region.contains(key).await
    }

    /// 数据库加载后推测性地填充缓存
    ///
    /// 键不存在，或现有条目对该版本可写时写入新的 Item
    #[instrument(skip(self, value), level = "debug", fields(region = %self.region.name()))]
    pub async fn put_from_load(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        tx_timestamp: u64,
        version: Option<Version>,
        minimal_put_override: bool,
    ) -> Result<bool> {
        if self.minimal_puts && minimal_put_override && self.region.contains(key).await? {
            debug!("Minimal put: key={} already cached, skipping", key);
            self.record("put_from_load", "skipped");
            return Ok(false);
        }

        let version = self.effective_version(version);
        let timestamp = self.region.next_timestamp();
        let comparator = self.comparator.as_deref();
        let written = self
            .region
            .invoke(key, |current| match current {
                Some(entry) if !entry.is_writeable(tx_timestamp, version.as_ref(), comparator) => {
                    (Mutation::Keep, false)
                }
                _ => {
                    let item = Item::new(value.clone(), version.clone(), timestamp);
                    (Mutation::Put(CacheEntry::Item(item)), true)
                }
            })
            .await?;

        if written {
            debug!("put_from_load: key={} cached", key);
            self.record("put_from_load", "put");
        } else {
            debug!("put_from_load: key={} not writeable, skipped", key);
            self.record("put_from_load", "skipped");
        }
        Ok(written)
    }

    /// 在写数据库之前加软锁
    ///
    /// 从不阻塞：已有锁时增加持有者数量并标记为并发
    #[instrument(skip(self), level = "debug", fields(region = %self.region.name()))]
    pub async fn lock_item(&self, key: &CacheKey, version: Option<Version>) -> Result<LockToken> {
        let version = self.effective_version(version);
        let timeout = self.region.next_timestamp() + self.region.lock_timeout();
        let lock_id = self.next_lock_id.fetch_add(1, Ordering::Relaxed);
        let owner = self.owner;

        let (lock, token) = self
            .region
            .invoke(key, |current| {
                let (lock, token) = match current {
                    Some(entry) => entry.clone().lock(timeout, owner, lock_id),
                    None => SoftLock::acquire(timeout, owner, lock_id, version.clone()),
                };
                (Mutation::Put(CacheEntry::Lock(lock.clone())), (lock, token))
            })
            .await?;

        debug!(
            "lock_item: key={}, lock_id={}, acquisition={}, multiplicity={}, concurrent={}",
            key,
            lock.lock_id,
            token.acquisition,
            lock.multiplicity(),
            lock.concurrent
        );
        self.record("lock", if lock.concurrent { "concurrent" } else { "acquired" });
        Ok(token)
    }

    /// 回滚时释放软锁
    ///
    /// 令牌不被识别时直接驱逐该键
    #[instrument(skip(self), level = "debug", fields(region = %self.region.name()))]
    pub async fn unlock_item(&self, key: &CacheKey, token: LockToken) -> Result<()> {
        let timestamp = self.region.next_timestamp();
        let release = self
            .region
            .invoke(key, |current| match current {
                Some(CacheEntry::Lock(lock)) if lock.is_unlockable(&token) => {
                    let next = lock.clone().unlock(&token, timestamp);
                    let drained = next.is_drained();
                    (Mutation::Put(CacheEntry::Lock(next)), Release::Released { drained })
                }
                _ => (Mutation::Remove, Release::Expired),
            })
            .await?;

        match release {
            Release::Released { drained } => {
                debug!("unlock_item: key={}, drained={}", key, drained);
                self.record("unlock", "released");
            }
            Release::Removed | Release::Expired => self.lock_expired(key, &token),
        }
        Ok(())
    }

    /// 释放一个在持锁期间已被显式移除的键上的锁
    ///
    /// 键不存在说明移除仍然有效，保持缺失；其他情况与 `unlock_item` 相同
    #[instrument(skip(self), level = "debug", fields(region = %self.region.name()))]
    pub(crate) async fn release_removed(&self, key: &CacheKey, token: LockToken) -> Result<()> {
        let timestamp = self.region.next_timestamp();
        let release = self
            .region
            .invoke(key, |current| match current {
                None => (Mutation::Keep, Release::Removed),
                Some(CacheEntry::Lock(lock)) if lock.is_unlockable(&token) => {
                    let next = lock.clone().unlock(&token, timestamp);
                    let drained = next.is_drained();
                    (Mutation::Put(CacheEntry::Lock(next)), Release::Released { drained })
                }
                _ => (Mutation::Remove, Release::Expired),
            })
            .await?;

        match release {
            Release::Removed => {
                debug!("release_removed: key={} already removed", key);
                self.record("unlock", "removed");
            }
            Release::Released { drained } => {
                debug!("release_removed: key={}, drained={}", key, drained);
                self.record("unlock", "released");
            }
            Release::Expired => self.lock_expired(key, &token),
        }
        Ok(())
    }

    /// 提交后写入新插入的值
    ///
    /// 只在键不存在（或残留的锁已超时）时写入，避免覆盖并发读写者的结果
    #[instrument(skip(self, value), level = "debug", fields(region = %self.region.name()))]
    pub(crate) async fn finalize_insert(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        version: Option<Version>,
    ) -> Result<bool> {
        let version = self.effective_version(version);
        let timestamp = self.region.next_timestamp();
        let written = self
            .region
            .invoke(key, |current| {
                let vacant = match current {
                    None => true,
                    Some(CacheEntry::Lock(lock)) => timestamp > lock.timeout,
                    Some(CacheEntry::Item(_)) => false,
                };
                if vacant {
                    let item = Item::new(value.clone(), version.clone(), timestamp);
                    (Mutation::Put(CacheEntry::Item(item)), true)
                } else {
                    (Mutation::Keep, false)
                }
            })
            .await?;

        debug!("after_insert: key={}, cached={}", key, written);
        self.record("after_insert", if written { "put" } else { "skipped" });
        Ok(written)
    }

    /// 提交后用新值替换本次写入持有的锁
    ///
    /// 锁曾被并发持有时只释放本持有者的份额，不写入值
    #[instrument(skip(self, value), level = "debug", fields(region = %self.region.name()))]
    pub(crate) async fn finalize_update(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        version: Option<Version>,
        token: LockToken,
    ) -> Result<bool> {
        let version = self.effective_version(version);
        let timestamp = self.region.next_timestamp();
        let outcome = self
            .region
            .invoke(key, |current| match current {
                Some(CacheEntry::Lock(lock)) if lock.is_unlockable(&token) => {
                    if lock.concurrent {
                        let next = lock.clone().unlock(&token, timestamp);
                        let drained = next.is_drained();
                        (Mutation::Put(CacheEntry::Lock(next)), Finalize::Released { drained })
                    } else {
                        let item = Item::new(value.clone(), version.clone(), timestamp);
                        (Mutation::Put(CacheEntry::Item(item)), Finalize::Cached)
                    }
                }
                _ => (Mutation::Remove, Finalize::Expired),
            })
            .await?;

        match outcome {
            Finalize::Cached => {
                debug!("after_update: key={} cached", key);
                self.record("after_update", "put");
                Ok(true)
            }
            Finalize::Released { drained } => {
                debug!(
                    "after_update: key={} locked concurrently, released only (drained={})",
                    key, drained
                );
                self.record("after_update", "concurrent");
                Ok(false)
            }
            Finalize::Expired => {
                self.lock_expired(key, &token);
                Ok(false)
            }
        }
    }

    fn lock_expired(&self, key: &CacheKey, token: &LockToken) {
        warn!(
            "Soft-locked cache entry expired or was replaced: region={}, key={}, lock_id={}",
            self.region.name(),
            key,
            token.lock_id
        );
        self.record("unlock", "expired");
    }

    /// 无条件删除条目
    #[instrument(skip(self), level = "debug", fields(region = %self.region.name()))]
    pub async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.region.remove(key).await?;
        self.record("evict", "key");
        Ok(())
    }

    /// 驱逐单个键
    pub async fn evict(&self, key: &CacheKey) -> Result<()> {
        self.remove(key).await
    }

    /// 驱逐区域内全部条目
    #[instrument(skip(self), level = "debug", fields(region = %self.region.name()))]
    pub async fn evict_all(&self) -> Result<()> {
        self.region.clear().await?;
        self.record("evict", "all");
        Ok(())
    }
}
