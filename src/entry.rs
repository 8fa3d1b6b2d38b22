//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了区域中每个键对应的缓存条目。
//!
//! 条目要么是可读的缓存值 [`Item`]，要么是写入进行中的软锁 [`SoftLock`]。
//! 条目是值而不是共享对象：所有操作都返回新的条目，由区域原子地整体替换。

use crate::version::{Version, VersionComparator};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheEntry {
    Item(Item),
    Lock(SoftLock),
}

/// 可读的缓存值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub value: Vec<u8>,
    pub version: Option<Version>,
    /// 写入时的区域时间戳
    pub timestamp: u64,
}

/// 软锁
///
/// 一个或多个进行中的写入者在该键上持有的非阻塞锁标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftLock {
    pub owner: Uuid,
    pub lock_id: u64,
    pub version: Option<Version>,
    pub timeout: u64,
    /// 尚未释放的持有者序号
    holders: Vec<u64>,
    /// 下一个持有者序号，只增不减
    next_holder: u64,
    /// 第二个持有者加锁后置为 true，之后不再复位
    pub concurrent: bool,
    /// 最后一个持有者释放时的时间戳
    pub unlock_timestamp: Option<u64>,
}

/// 锁令牌
///
/// `lock_item` 返回的能力凭证，释放或完成写入时回传。
/// `owner` 与 `lock_id` 标识条目上的锁，`acquisition` 标识该锁上的一个持有者；
/// 同一把锁上每次加锁得到的序号互不相同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken {
    pub owner: Uuid,
    pub lock_id: u64,
    pub acquisition: u64,
}

impl Item {
    pub fn new(value: Vec<u8>, version: Option<Version>, timestamp: u64) -> Self {
        Self {
            value,
            version,
            timestamp,
        }
    }
}

impl SoftLock {
    pub fn new(timeout: u64, owner: Uuid, lock_id: u64, version: Option<Version>) -> Self {
        Self {
            owner,
            lock_id,
            version,
            timeout,
            holders: vec![0],
            next_holder: 1,
            concurrent: false,
            unlock_timestamp: None,
        }
    }

    /// 创建新锁并返回首个持有者的令牌
    pub fn acquire(
        timeout: u64,
        owner: Uuid,
        lock_id: u64,
        version: Option<Version>,
    ) -> (Self, LockToken) {
        let lock = Self::new(timeout, owner, lock_id, version);
        let token = lock.token(0);
        (lock, token)
    }

    /// 令牌是否仍能释放此锁
    ///
    /// 只有尚未释放的持有者序号被识别，已释放的令牌即使锁被再次获取也不再有效
    pub fn is_unlockable(&self, token: &LockToken) -> bool {
        self.owner == token.owner
            && self.lock_id == token.lock_id
            && self.holders.contains(&token.acquisition)
    }

    /// 追加一个持有者，返回其令牌
    pub fn relock(mut self, timeout: u64) -> (Self, LockToken) {
        let holder = self.next_holder;
        self.next_holder += 1;
        self.holders.push(holder);
        self.concurrent = true;
        self.timeout = self.timeout.max(timeout);
        let token = self.token(holder);
        (self, token)
    }

    /// 释放令牌对应的持有者，最后一个持有者释放时记录释放时间
    pub fn unlock(mut self, token: &LockToken, timestamp: u64) -> Self {
        self.holders.retain(|holder| *holder != token.acquisition);
        if self.holders.is_empty() {
            self.unlock_timestamp = Some(timestamp);
        }
        self
    }

    /// 尚未释放的持有者数量
    pub fn multiplicity(&self) -> usize {
        self.holders.len()
    }

    pub fn is_drained(&self) -> bool {
        self.holders.is_empty()
    }

    fn token(&self, acquisition: u64) -> LockToken {
        LockToken {
            owner: self.owner,
            lock_id: self.lock_id,
            acquisition,
        }
    }
}

impl CacheEntry {
    /// 读取时间戳为 `tx_timestamp` 的事务能否看到该条目
    ///
    /// 只有在事务开始之前写入的 Item 可读；锁永远不可读
    pub fn is_readable(&self, tx_timestamp: u64) -> bool {
        match self {
            CacheEntry::Item(item) => tx_timestamp > item.timestamp,
            CacheEntry::Lock(_) => false,
        }
    }

    /// 带有 `new_version` 的写入能否替换该条目
    pub fn is_writeable(
        &self,
        tx_timestamp: u64,
        new_version: Option<&Version>,
        comparator: Option<&dyn VersionComparator>,
    ) -> bool {
        match self {
            CacheEntry::Item(item) => {
                version_precedes(item.version.as_ref(), new_version, comparator)
            }
            CacheEntry::Lock(lock) => {
                if tx_timestamp > lock.timeout {
                    return true;
                }
                if !lock.is_drained() {
                    return false;
                }
                match (&lock.version, comparator) {
                    (Some(_), Some(_)) => {
                        version_precedes(lock.version.as_ref(), new_version, comparator)
                    }
                    _ => lock
                        .unlock_timestamp
                        .map(|unlocked| tx_timestamp > unlocked)
                        .unwrap_or(false),
                }
            }
        }
    }

    /// 在该条目上加锁，返回新的锁条目和本次加锁的令牌
    pub fn lock(self, timeout: u64, owner: Uuid, lock_id: u64) -> (SoftLock, LockToken) {
        match self {
            CacheEntry::Item(item) => SoftLock::acquire(timeout, owner, lock_id, item.version),
            CacheEntry::Lock(lock) => lock.relock(timeout),
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        match self {
            CacheEntry::Item(item) => Some(&item.value),
            CacheEntry::Lock(_) => None,
        }
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            CacheEntry::Item(item) => item.version.as_ref(),
            CacheEntry::Lock(lock) => lock.version.as_ref(),
        }
    }

    pub fn as_lock(&self) -> Option<&SoftLock> {
        match self {
            CacheEntry::Lock(lock) => Some(lock),
            CacheEntry::Item(_) => None,
        }
    }

    pub fn is_lock(&self) -> bool {
        matches!(self, CacheEntry::Lock(_))
    }
}

/// 当前版本是否严格早于新版本
///
/// 任何一方缺失版本或缺少比较器时都视为无法排序，返回 false
fn version_precedes(
    current: Option<&Version>,
    incoming: Option<&Version>,
    comparator: Option<&dyn VersionComparator>,
) -> bool {
    match (current, incoming, comparator) {
        (Some(current), Some(incoming), Some(cmp)) => {
            cmp.compare(current, incoming) == Ordering::Less
        }
        _ => false,
    }
}
