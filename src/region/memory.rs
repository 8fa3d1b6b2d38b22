//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 DashMap 的进程内区域。

use super::{Mutation, Region, RegionSettings};
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::CacheKey;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// 进程内区域
///
/// `invoke` 在持有键所在分片写锁期间执行修改函数，相当于每键互斥
pub struct MemoryRegion {
    settings: RegionSettings,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryRegion {
    /// 创建使用独立时钟的区域
    pub fn new(name: impl Into<String>, lock_timeout: Duration) -> Self {
        Self::with_settings(RegionSettings::new(name, lock_timeout))
    }

    pub fn with_settings(settings: RegionSettings) -> Self {
        Self {
            settings,
            entries: DashMap::new(),
        }
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Region for MemoryRegion {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(region = %self.settings.name))]
    async fn clear(&self) -> Result<()> {
        debug!("Memory region clear: {} entries", self.entries.len());
        self.entries.clear();
        Ok(())
    }

    async fn invoke<F, R>(&self, key: &CacheKey, f: F) -> Result<R>
    where
        F: Fn(Option<&CacheEntry>) -> (Mutation, R) + Send + Sync,
        R: Send,
    {
        let result = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let (mutation, result) = f(Some(occupied.get()));
                match mutation {
                    Mutation::Keep => {}
                    Mutation::Put(next) => {
                        occupied.insert(next);
                    }
                    Mutation::Remove => {
                        occupied.remove();
                    }
                }
                result
            }
            Entry::Vacant(vacant) => {
                let (mutation, result) = f(None);
                if let Mutation::Put(next) = mutation {
                    vacant.insert(next);
                }
                result
            }
        };
        Ok(result)
    }

    fn next_timestamp(&self) -> u64 {
        self.settings.timestamper.next()
    }

    fn lock_timeout(&self) -> u64 {
        self.settings.lock_timeout_ticks()
    }
}
