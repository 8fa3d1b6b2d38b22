//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了自然键的读写访问策略。
//!
//! 缓存值是实体主键；自然键没有版本，写入顺序完全依赖软锁和时间戳。

use super::{AccessStrategy, ReadWriteAccess};
use crate::entry::LockToken;
use crate::error::Result;
use crate::key::CacheKey;
use crate::region::Region;
use tracing::debug;

/// 自然键读写访问策略
pub struct NaturalIdReadWriteAccess<R: Region> {
    inner: ReadWriteAccess<R>,
}

impl<R: Region> NaturalIdReadWriteAccess<R> {
    pub fn new(inner: ReadWriteAccess<R>) -> Self {
        Self {
            inner: inner.without_comparator(),
        }
    }

    pub fn generate_cache_key<I, S>(
        &self,
        natural_id_values: I,
        entity_name: &str,
        tenant: Option<&str>,
    ) -> CacheKey
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let key = CacheKey::natural_id(entity_name, natural_id_values);
        match tenant {
            Some(tenant) => key.with_tenant(tenant),
            None => key,
        }
    }

    pub async fn insert(&self, key: &CacheKey, _value: &[u8]) -> Result<bool> {
        debug!("insert: natural id {} deferred until commit", key);
        Ok(false)
    }

    pub async fn after_insert(&self, key: &CacheKey, value: Vec<u8>) -> Result<bool> {
        self.inner.finalize_insert(key, value, None).await
    }

    pub async fn update(&self, key: &CacheKey, _value: &[u8]) -> Result<bool> {
        debug!("update: natural id {} deferred until commit", key);
        Ok(false)
    }

    pub async fn after_update(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        token: LockToken,
    ) -> Result<bool> {
        self.inner.finalize_update(key, value, None, token).await
    }

    /// 事务结束时释放旧自然键的锁
    ///
    /// 旧键在变更时已被移除，此时不存在属于正常情况
    pub async fn release_previous(&self, previous_key: &CacheKey, token: LockToken) -> Result<()> {
        self.inner.release_removed(previous_key, token).await
    }
}

impl<R: Region> AccessStrategy for NaturalIdReadWriteAccess<R> {
    type Region = R;

    fn access(&self) -> &ReadWriteAccess<R> {
        &self.inner
    }
}
