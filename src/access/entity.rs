//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了实体的读写访问策略。

use super::{AccessStrategy, ReadWriteAccess};
use crate::entry::LockToken;
use crate::error::Result;
use crate::key::CacheKey;
use crate::region::Region;
use crate::serialization::Serializer;
use crate::version::Version;
use serde::Serialize;
use tracing::debug;

/// 实体读写访问策略
///
/// 版本由比较器排序；未配置比较器的实体类型不记录版本
pub struct EntityReadWriteAccess<R: Region> {
    inner: ReadWriteAccess<R>,
}

impl<R: Region> EntityReadWriteAccess<R> {
    pub fn new(inner: ReadWriteAccess<R>) -> Self {
        Self { inner }
    }

    /// 生成实体缓存键
    pub fn generate_cache_key(
        &self,
        id: impl ToString,
        entity_name: &str,
        tenant: Option<&str>,
    ) -> CacheKey {
        let key = CacheKey::entity(entity_name, id);
        match tenant {
            Some(tenant) => key.with_tenant(tenant),
            None => key,
        }
    }

    /// 插入前回调
    ///
    /// 事务提交前从不写入缓存，总是返回 false
    pub async fn insert(
        &self,
        key: &CacheKey,
        _value: &[u8],
        _version: Option<&Version>,
    ) -> Result<bool> {
        debug!("insert: key={} deferred until commit", key);
        Ok(false)
    }

    /// 插入提交后写入缓存
    pub async fn after_insert(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        version: Option<Version>,
    ) -> Result<bool> {
        self.inner.finalize_insert(key, value, version).await
    }

    /// 更新前回调
    ///
    /// 事务提交前从不写入缓存，总是返回 false
    pub async fn update(
        &self,
        key: &CacheKey,
        _value: &[u8],
        _current_version: Option<&Version>,
        _previous_version: Option<&Version>,
    ) -> Result<bool> {
        debug!("update: key={} deferred until commit", key);
        Ok(false)
    }

    /// 更新提交后写入缓存并释放锁
    pub async fn after_update(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        current_version: Option<Version>,
        token: LockToken,
    ) -> Result<bool> {
        self.inner
            .finalize_update(key, value, current_version, token)
            .await
    }

    pub async fn after_insert_as<T: Serialize + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        version: Option<Version>,
    ) -> Result<bool> {
        let bytes = self.inner.serializer().serialize(value)?;
        self.after_insert(key, bytes, version).await
    }

    pub async fn after_update_as<T: Serialize + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        current_version: Option<Version>,
        token: LockToken,
    ) -> Result<bool> {
        let bytes = self.inner.serializer().serialize(value)?;
        self.after_update(key, bytes, current_version, token).await
    }
}

impl<R: Region> AccessStrategy for EntityReadWriteAccess<R> {
    type Region = R;

    fn access(&self) -> &ReadWriteAccess<R> {
        &self.inner
    }
}
