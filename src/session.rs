//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了事务级别的缓存协调器。
//!
//! 每个逻辑事务对应一个 [`CacheTransaction`]：它记录事务开始时间戳，
//! 在写数据库之前加软锁，并把提交或回滚后要执行的动作排队，
//! 保证每次 `lock_item` 恰好配对一次 `after_update` 或 `unlock_item`。

use crate::access::{
    AccessStrategy, CollectionReadWriteAccess, EntityReadWriteAccess, NaturalIdReadWriteAccess,
};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::region::Region;
use crate::version::Version;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 单个完成动作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// 新值写入了缓存
    Cached,
    /// 只释放了软锁
    Released,
    /// 键被驱逐
    Evicted,
    /// 未写入（已有条目）
    Skipped,
}

type CompletionFuture = BoxFuture<'static, Result<Completion>>;
type CompletionAction = Box<dyn FnOnce(bool) -> CompletionFuture + Send>;

/// 事务完成报告
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionReport {
    pub cached: usize,
    pub released: usize,
    pub evicted: usize,
    pub skipped: usize,
}

/// 事务级缓存协调器
pub struct CacheTransaction {
    start_timestamp: u64,
    pending: Vec<CompletionAction>,
}

impl CacheTransaction {
    /// 开始事务，以区域时钟的下一个时间戳作为事务开始时间
    pub fn begin<A: AccessStrategy + ?Sized>(access: &A) -> Self {
        Self::with_start_timestamp(access.next_timestamp())
    }

    pub fn with_start_timestamp(start_timestamp: u64) -> Self {
        Self {
            start_timestamp,
            pending: Vec::new(),
        }
    }

    /// 事务开始时间戳，读取缓存时使用
    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    /// 尚未完成的动作数量
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// 登记实体插入
    ///
    /// 提交后写入缓存；回滚时驱逐该键
    #[instrument(skip(self, access, value), level = "debug")]
    pub async fn insert_entity<R: Region + 'static>(
        &mut self,
        access: &Arc<EntityReadWriteAccess<R>>,
        key: CacheKey,
        value: Vec<u8>,
        version: Option<Version>,
    ) -> Result<()> {
        access.insert(&key, &value, version.as_ref()).await?;
        let access = access.clone();
        self.pending.push(Box::new(move |success| -> CompletionFuture {
            Box::pin(async move {
                if success {
                    let cached = access.after_insert(&key, value, version).await?;
                    Ok(if cached {
                        Completion::Cached
                    } else {
                        Completion::Skipped
                    })
                } else {
                    access.evict(&key).await?;
                    Ok(Completion::Evicted)
                }
            })
        }));
        Ok(())
    }

    /// 登记实体更新
    ///
    /// 必须在修改数据库行之前调用：立即加软锁，提交后写入新值，回滚时释放锁
    #[instrument(skip(self, access, value), level = "debug")]
    pub async fn update_entity<R: Region + 'static>(
        &mut self,
        access: &Arc<EntityReadWriteAccess<R>>,
        key: CacheKey,
        value: Vec<u8>,
        version: Option<Version>,
        previous_version: Option<Version>,
    ) -> Result<()> {
        let token = access.lock_item(&key, previous_version.clone()).await?;
        access
            .update(&key, &value, version.as_ref(), previous_version.as_ref())
            .await?;
        let access = access.clone();
        self.pending.push(Box::new(move |success| -> CompletionFuture {
            Box::pin(async move {
                if success {
                    let cached = access.after_update(&key, value, version, token).await?;
                    Ok(if cached {
                        Completion::Cached
                    } else {
                        Completion::Released
                    })
                } else {
                    access.unlock_item(&key, token).await?;
                    Ok(Completion::Released)
                }
            })
        }));
        Ok(())
    }

    /// 登记实体删除
    ///
    /// 加锁后保持锁定直到事务结束，结束时释放，留下的排空锁阻止旧值回填
    #[instrument(skip(self, access), level = "debug")]
    pub async fn delete_entity<R: Region + 'static>(
        &mut self,
        access: &Arc<EntityReadWriteAccess<R>>,
        key: CacheKey,
        version: Option<Version>,
    ) -> Result<()> {
        let token = access.lock_item(&key, version).await?;
        let access = access.clone();
        self.pending.push(Box::new(move |_success| -> CompletionFuture {
            Box::pin(async move {
                access.unlock_item(&key, token).await?;
                Ok(Completion::Released)
            })
        }));
        Ok(())
    }

    /// 登记集合修改
    ///
    /// 集合只做失效：加锁直到事务结束
    #[instrument(skip(self, access), level = "debug")]
    pub async fn invalidate_collection<R: Region + 'static>(
        &mut self,
        access: &Arc<CollectionReadWriteAccess<R>>,
        key: CacheKey,
    ) -> Result<()> {
        let token = access.lock_item(&key, None).await?;
        let access = access.clone();
        self.pending.push(Box::new(move |_success| -> CompletionFuture {
            Box::pin(async move {
                access.unlock_item(&key, token).await?;
                Ok(Completion::Released)
            })
        }));
        Ok(())
    }

    /// 登记自然键插入
    #[instrument(skip(self, access, id), level = "debug")]
    pub async fn insert_natural_id<R: Region + 'static>(
        &mut self,
        access: &Arc<NaturalIdReadWriteAccess<R>>,
        key: CacheKey,
        id: Vec<u8>,
    ) -> Result<()> {
        access.insert(&key, &id).await?;
        let access = access.clone();
        self.pending.push(Box::new(move |success| -> CompletionFuture {
            Box::pin(async move {
                if success {
                    let cached = access.after_insert(&key, id).await?;
                    Ok(if cached {
                        Completion::Cached
                    } else {
                        Completion::Skipped
                    })
                } else {
                    access.evict(&key).await?;
                    Ok(Completion::Evicted)
                }
            })
        }));
        Ok(())
    }

    /// 登记自然键变更
    ///
    /// 锁定并移除旧键，锁定新键；事务结束时释放旧键的锁，提交则写入新键
    #[instrument(skip(self, access, id), level = "debug")]
    pub async fn update_natural_id<R: Region + 'static>(
        &mut self,
        access: &Arc<NaturalIdReadWriteAccess<R>>,
        previous_key: CacheKey,
        key: CacheKey,
        id: Vec<u8>,
    ) -> Result<()> {
        if previous_key == key {
            debug!("update_natural_id: natural id unchanged, nothing to re-cache");
            return Ok(());
        }

        let removal_token = access.lock_item(&previous_key, None).await?;
        access.remove(&previous_key).await?;
        let token = access.lock_item(&key, None).await?;
        access.update(&key, &id).await?;

        let access = access.clone();
        self.pending.push(Box::new(move |success| -> CompletionFuture {
            Box::pin(async move {
                access.release_previous(&previous_key, removal_token).await?;
                if success {
                    let cached = access.after_update(&key, id, token).await?;
                    Ok(if cached {
                        Completion::Cached
                    } else {
                        Completion::Released
                    })
                } else {
                    access.unlock_item(&key, token).await?;
                    Ok(Completion::Released)
                }
            })
        }));
        Ok(())
    }

    /// 事务完成后执行所有排队动作
    ///
    /// 每个动作都会执行；若有区域错误，全部执行完后返回第一个错误
    #[instrument(skip(self), level = "debug", fields(pending = self.pending.len()))]
    pub async fn complete(self, success: bool) -> Result<CompletionReport> {
        let mut report = CompletionReport::default();
        let mut first_error: Option<CacheError> = None;

        for action in self.pending {
            match action(success).await {
                Ok(Completion::Cached) => report.cached += 1,
                Ok(Completion::Released) => report.released += 1,
                Ok(Completion::Evicted) => report.evicted += 1,
                Ok(Completion::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!("Cache completion action failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!("Transaction completed: success={}, {:?}", success, report);
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
