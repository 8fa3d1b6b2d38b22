//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了集合的读写访问策略。
//!
//! 集合在提交时从不写入缓存，只通过加锁和解锁使其失效，下次读取时重新加载。

use super::{AccessStrategy, ReadWriteAccess};
use crate::key::CacheKey;
use crate::region::Region;

/// 集合读写访问策略（无版本）
pub struct CollectionReadWriteAccess<R: Region> {
    inner: ReadWriteAccess<R>,
}

impl<R: Region> CollectionReadWriteAccess<R> {
    pub fn new(inner: ReadWriteAccess<R>) -> Self {
        Self {
            inner: inner.without_comparator(),
        }
    }

    pub fn generate_cache_key(
        &self,
        owner_id: impl ToString,
        role: &str,
        tenant: Option<&str>,
    ) -> CacheKey {
        let key = CacheKey::collection(role, owner_id);
        match tenant {
            Some(tenant) => key.with_tenant(tenant),
            None => key,
        }
    }
}

impl<R: Region> AccessStrategy for CollectionReadWriteAccess<R> {
    type Region = R;

    fn access(&self) -> &ReadWriteAccess<R> {
        &self.inner
    }
}
