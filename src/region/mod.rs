//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存区域（Region）的接口及其后端实现。
//!
//! 区域只需提供单键原子读-改-写（[`Region::invoke`]）；协议从不需要多键原子性。

pub mod memory;
pub mod moka;
pub mod redis;

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::CacheKey;
use crate::timestamp::{duration_to_ticks, Timestamper};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryRegion;
pub use self::moka::MokaRegion;
pub use self::redis::RedisRegion;

/// 原子修改函数对当前条目做出的决定
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// 保持不变
    Keep,
    /// 整体替换为新条目
    Put(CacheEntry),
    /// 删除该键
    Remove,
}

/// 缓存区域接口
///
/// `invoke` 的闭包必须是当前条目的纯函数：基于乐观并发的后端可能重复调用它
#[async_trait]
pub trait Region: Send + Sync {
    /// 区域名称
    fn name(&self) -> &str;

    /// 读取条目
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// 是否存在条目
    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// 无条件写入条目
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()>;

    /// 删除条目
    async fn remove(&self, key: &CacheKey) -> Result<()>;

    /// 清空区域
    async fn clear(&self) -> Result<()>;

    /// 单键原子读-改-写
    ///
    /// 读取当前条目、计算下一个条目和结果、写入下一个条目，三步对该键不可分割
    async fn invoke<F, R>(&self, key: &CacheKey, f: F) -> Result<R>
    where
        F: Fn(Option<&CacheEntry>) -> (Mutation, R) + Send + Sync,
        R: Send;

    /// 下一个逻辑时间戳
    fn next_timestamp(&self) -> u64;

    /// 软锁超时（时间戳刻度）
    fn lock_timeout(&self) -> u64;
}

/// 区域的公共设置：名称、时钟和软锁超时
#[derive(Debug, Clone)]
pub struct RegionSettings {
    pub name: String,
    pub timestamper: Arc<Timestamper>,
    pub lock_timeout: Duration,
}

impl RegionSettings {
    pub fn new(name: impl Into<String>, lock_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timestamper: Arc::new(Timestamper::new()),
            lock_timeout,
        }
    }

    /// 与其他区域共享时钟
    pub fn with_timestamper(mut self, timestamper: Arc<Timestamper>) -> Self {
        self.timestamper = timestamper;
        self
    }

    pub fn lock_timeout_ticks(&self) -> u64 {
        duration_to_ticks(self.lock_timeout)
    }
}

/// 区域后端枚举
///
/// 按配置选择的具体后端，静态分发到各实现
pub enum RegionBackend {
    Memory(MemoryRegion),
    Moka(MokaRegion),
    Redis(RedisRegion),
}

impl std::fmt::Debug for RegionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(r) => write!(f, "RegionBackend::Memory({})", r.name()),
            Self::Moka(r) => write!(f, "RegionBackend::Moka({})", r.name()),
            Self::Redis(r) => write!(f, "RegionBackend::Redis({})", r.name()),
        }
    }
}

#[async_trait]
impl Region for RegionBackend {
    fn name(&self) -> &str {
        match self {
            Self::Memory(r) => r.name(),
            Self::Moka(r) => r.name(),
            Self::Redis(r) => r.name(),
        }
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        match self {
            Self::Memory(r) => r.get(key).await,
            Self::Moka(r) => r.get(key).await,
            Self::Redis(r) => r.get(key).await,
        }
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        match self {
            Self::Memory(r) => r.contains(key).await,
            Self::Moka(r) => r.contains(key).await,
            Self::Redis(r) => r.contains(key).await,
        }
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        match self {
            Self::Memory(r) => r.put(key, entry).await,
            Self::Moka(r) => r.put(key, entry).await,
            Self::Redis(r) => r.put(key, entry).await,
        }
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        match self {
            Self::Memory(r) => r.remove(key).await,
            Self::Moka(r) => r.remove(key).await,
            Self::Redis(r) => r.remove(key).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Self::Memory(r) => r.clear().await,
            Self::Moka(r) => r.clear().await,
            Self::Redis(r) => r.clear().await,
        }
    }

    async fn invoke<F, R>(&self, key: &CacheKey, f: F) -> Result<R>
    where
        F: Fn(Option<&CacheEntry>) -> (Mutation, R) + Send + Sync,
        R: Send,
    {
        match self {
            Self::Memory(r) => r.invoke(key, f).await,
            Self::Moka(r) => r.invoke(key, f).await,
            Self::Redis(r) => r.invoke(key, f).await,
        }
    }

    fn next_timestamp(&self) -> u64 {
        match self {
            Self::Memory(r) => r.next_timestamp(),
            Self::Moka(r) => r.next_timestamp(),
            Self::Redis(r) => r.next_timestamp(),
        }
    }

    fn lock_timeout(&self) -> u64 {
        match self {
            Self::Memory(r) => r.lock_timeout(),
            Self::Moka(r) => r.lock_timeout(),
            Self::Redis(r) => r.lock_timeout(),
        }
    }
}
