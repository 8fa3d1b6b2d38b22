//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了实体、集合和自然键的读写访问策略。

pub mod collection;
pub mod entity;
pub mod natural_id;
pub mod read_write;

use crate::entry::LockToken;
use crate::error::Result;
use crate::key::CacheKey;
use crate::region::Region;
use crate::serialization::Serializer;
use crate::version::Version;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::instrument;

pub use collection::CollectionReadWriteAccess;
pub use entity::EntityReadWriteAccess;
pub use natural_id::NaturalIdReadWriteAccess;
pub use read_write::ReadWriteAccess;

/// 访问策略特征
///
/// 所有读写策略共享的操作，委托给 [`ReadWriteAccess`]
#[async_trait]
pub trait AccessStrategy: Send + Sync {
    type Region: Region;

    /// 协议核心
    fn access(&self) -> &ReadWriteAccess<Self::Region>;

    /// 区域名称
    fn region_name(&self) -> &str {
        self.access().region().name()
    }

    fn next_timestamp(&self) -> u64 {
        self.access().next_timestamp()
    }

    async fn get(&self, key: &CacheKey, tx_timestamp: u64) -> Result<Option<Vec<u8>>> {
        self.access().get(key, tx_timestamp).await
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        self.access().contains(key).await
    }

    async fn put_from_load(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        tx_timestamp: u64,
        version: Option<Version>,
    ) -> Result<bool> {
        self.access()
            .put_from_load(key, value, tx_timestamp, version, false)
            .await
    }

    /// 带最小写入标志的推测性填充
    async fn put_from_load_minimal(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        tx_timestamp: u64,
        version: Option<Version>,
        minimal_put_override: bool,
    ) -> Result<bool> {
        self.access()
            .put_from_load(key, value, tx_timestamp, version, minimal_put_override)
            .await
    }

    async fn lock_item(&self, key: &CacheKey, version: Option<Version>) -> Result<LockToken> {
        self.access().lock_item(key, version).await
    }

    async fn unlock_item(&self, key: &CacheKey, token: LockToken) -> Result<()> {
        self.access().unlock_item(key, token).await
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.access().remove(key).await
    }

    async fn evict(&self, key: &CacheKey) -> Result<()> {
        self.access().evict(key).await
    }

    async fn evict_all(&self) -> Result<()> {
        self.access().evict_all().await
    }
}

/// 访问策略扩展特征
///
/// 通过策略配置的序列化器提供类型安全的读取和填充
#[async_trait]
pub trait AccessExt: AccessStrategy {
    /// 读取并反序列化缓存值
    #[instrument(skip(self), level = "debug")]
    async fn get_as<T: DeserializeOwned + Send>(
        &self,
        key: &CacheKey,
        tx_timestamp: u64,
    ) -> Result<Option<T>> {
        match self.get(key, tx_timestamp).await? {
            Some(bytes) => Ok(Some(self.access().serializer().deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 序列化后推测性填充
    #[instrument(skip(self, value), level = "debug")]
    async fn put_from_load_as<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        tx_timestamp: u64,
        version: Option<Version>,
    ) -> Result<bool> {
        let bytes = self.access().serializer().serialize(value)?;
        self.put_from_load(key, bytes, tx_timestamp, version).await
    }
}

impl<T: AccessStrategy + ?Sized> AccessExt for T {}
