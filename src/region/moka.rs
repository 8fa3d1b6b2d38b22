//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 Moka 的进程内区域，支持按容量淘汰。
//!
//! 淘汰只会造成缓存未命中，协议在条目丢失后依然正确。

use super::{Mutation, Region, RegionSettings};
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use ::moka::future::Cache;
use ::moka::ops::compute::Op;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Moka 区域
pub struct MokaRegion {
    settings: RegionSettings,
    cache: Cache<CacheKey, CacheEntry>,
}

impl MokaRegion {
    pub fn new(name: impl Into<String>, lock_timeout: Duration, max_capacity: u64) -> Self {
        Self::with_settings(RegionSettings::new(name, lock_timeout), max_capacity)
    }

    pub fn with_settings(settings: RegionSettings, max_capacity: u64) -> Self {
        Self {
            settings,
            cache: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// 近似条目数（Moka 的计数是最终一致的）
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl Region for MokaRegion {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.cache.get(key).await)
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        self.cache.insert(key.clone(), entry).await;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(region = %self.settings.name))]
    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        debug!("Moka region cleared");
        Ok(())
    }

    async fn invoke<F, R>(&self, key: &CacheKey, f: F) -> Result<R>
    where
        F: Fn(Option<&CacheEntry>) -> (Mutation, R) + Send + Sync,
        R: Send,
    {
        let mut outcome = None;
        self.cache
            .entry(key.clone())
            .and_compute_with(|current| {
                let (mutation, result) = f(current.as_ref().map(|e| e.value()));
                outcome = Some(result);
                let op = match mutation {
                    Mutation::Keep => Op::Nop,
                    Mutation::Put(next) => Op::Put(next),
                    Mutation::Remove => Op::Remove,
                };
                std::future::ready(op)
            })
            .await;
        outcome.ok_or_else(|| {
            CacheError::RegionError(format!(
                "compute for key {} in region {} did not run",
                key, self.settings.name
            ))
        })
    }

    fn next_timestamp(&self) -> u64 {
        self.settings.timestamper.next()
    }

    fn lock_timeout(&self) -> u64 {
        self.settings.lock_timeout_ticks()
    }
}
