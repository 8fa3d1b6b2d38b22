//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 Redis 的区域。
//!
//! 条目以 JSON 编码存放在 `{prefix}:{region}:{key}` 下。原子修改通过
//! `WATCH / GET / MULTI / SET|DEL / EXEC` 的乐观事务实现，EXEC 失败时按指数退避重试。
//! WATCH 状态绑定在连接上，因此事务在从小型连接池中独占借出的连接上执行。

use super::{Mutation, Region, RegionSettings};
use crate::config::RedisRegionConfig;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::serialization::{Serializer, SerializerEnum};
use ::redis::aio::{ConnectionManager, MultiplexedConnection};
use ::redis::{Client, RedisResult};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// SCAN 每批返回的键数量提示
const SCAN_BATCH: usize = 500;

/// 连接池中保留的空闲事务连接上限
const MAX_IDLE_WATCH_CONNECTIONS: usize = 8;

/// Redis 区域
pub struct RedisRegion {
    settings: RegionSettings,
    client: Client,
    manager: ConnectionManager,
    /// 用于 WATCH 事务的空闲连接
    watch_pool: Mutex<Vec<MultiplexedConnection>>,
    key_prefix: String,
    command_timeout: Duration,
    max_cas_retries: u32,
    retry_base_delay_ms: u64,
    codec: SerializerEnum,
}

impl RedisRegion {
    /// 连接 Redis 并创建区域
    #[instrument(skip(settings, config), level = "info", fields(region = %settings.name))]
    pub async fn connect(settings: RegionSettings, config: &RedisRegionConfig) -> Result<Self> {
        let client = Client::open(config.connection_string.expose_secret())?;
        let command_timeout = Duration::from_millis(config.command_timeout_ms);
        let manager = match timeout(command_timeout, client.get_connection_manager()).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(CacheError::RegionError(format!(
                    "Timed out connecting to redis for region {}",
                    settings.name
                )))
            }
        };
        debug!("Redis region connected: prefix={}", config.key_prefix);

        Ok(Self {
            settings,
            client,
            manager,
            watch_pool: Mutex::new(Vec::new()),
            key_prefix: config.key_prefix.clone(),
            command_timeout,
            max_cas_retries: config.max_cas_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
            codec: SerializerEnum::default(),
        })
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}:{}:{}", self.key_prefix, self.settings.name, key)
    }

    fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        self.codec.serialize(entry)
    }

    fn decode(&self, raw: Option<Vec<u8>>) -> Result<Option<CacheEntry>> {
        raw.map(|bytes| self.codec.deserialize(&bytes)).transpose()
    }

    /// 为单条命令加上超时限制
    async fn timed<T>(&self, op: &str, fut: impl Future<Output = RedisResult<T>>) -> Result<T> {
        match timeout(self.command_timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::RegionError(format!(
                "redis {} timed out after {:?} in region {}",
                op, self.command_timeout, self.settings.name
            ))),
        }
    }

    /// 借出一个事务连接，池为空时新建
    async fn checkout_watch_connection(&self) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.watch_pool.lock().await.pop() {
            return Ok(conn);
        }
        debug!("Redis region opening watch connection: region={}", self.settings.name);
        self.timed("CONNECT", self.client.get_multiplexed_async_connection())
            .await
    }

    /// 归还事务连接，超过空闲上限时直接关闭
    async fn checkin_watch_connection(&self, conn: MultiplexedConnection) {
        let mut pool = self.watch_pool.lock().await;
        if pool.len() < MAX_IDLE_WATCH_CONNECTIONS {
            pool.push(conn);
        }
    }

    /// 当前空闲的事务连接数量
    pub async fn idle_watch_connections(&self) -> usize {
        self.watch_pool.lock().await.len()
    }

    /// 在给定连接上执行带重试的乐观事务
    async fn compare_and_set<F, R>(
        &self,
        conn: &mut MultiplexedConnection,
        key: &CacheKey,
        f: F,
    ) -> Result<R>
    where
        F: Fn(Option<&CacheEntry>) -> (Mutation, R) + Send + Sync,
        R: Send,
    {
        let storage_key = self.storage_key(key);

        for attempt in 0..self.max_cas_retries {
            let _: () = self
                .timed(
                    "WATCH",
                    ::redis::cmd("WATCH").arg(&storage_key).query_async(conn),
                )
                .await?;
            let raw: Option<Vec<u8>> = self
                .timed(
                    "GET",
                    ::redis::cmd("GET").arg(&storage_key).query_async(conn),
                )
                .await?;
            let current = self.decode(raw)?;

            let (mutation, result) = f(current.as_ref());
            let mut pipe = ::redis::pipe();
            pipe.atomic();
            match mutation {
                Mutation::Keep => {
                    let _: () = self
                        .timed("UNWATCH", ::redis::cmd("UNWATCH").query_async(conn))
                        .await?;
                    return Ok(result);
                }
                Mutation::Put(next) => {
                    pipe.set(&storage_key, self.encode(&next)?).ignore();
                }
                Mutation::Remove => {
                    pipe.del(&storage_key).ignore();
                }
            }

            let committed: Option<::redis::Value> =
                self.timed("EXEC", pipe.query_async(conn)).await?;
            if committed.is_some() {
                return Ok(result);
            }

            debug!(
                "Redis region invoke: EXEC aborted for key={}, attempt={}",
                storage_key, attempt
            );
            tokio::time::sleep(retry_delay(attempt, self.retry_base_delay_ms)).await;
        }

        warn!(
            "Redis region invoke gave up after {} attempts: key={}",
            self.max_cas_retries, storage_key
        );
        Err(CacheError::Conflict(format!(
            "key {} in region {} kept changing during {} attempts",
            key, self.settings.name, self.max_cas_retries
        )))
    }
}

/// 计算重试延迟（指数退避）
fn retry_delay(attempt: u32, base_delay_ms: u64) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.min(10));
    Duration::from_millis(base_delay_ms.saturating_mul(factor))
}

#[async_trait]
impl Region for RedisRegion {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut conn = self.manager.clone();
        let raw: Option<Vec<u8>> = self
            .timed(
                "GET",
                ::redis::cmd("GET")
                    .arg(self.storage_key(key))
                    .query_async(&mut conn),
            )
            .await?;
        self.decode(raw)
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        let mut conn = self.manager.clone();
        let exists: bool = self
            .timed(
                "EXISTS",
                ::redis::cmd("EXISTS")
                    .arg(self.storage_key(key))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(exists)
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        let bytes = self.encode(&entry)?;
        let mut conn = self.manager.clone();
        let _: () = self
            .timed(
                "SET",
                ::redis::cmd("SET")
                    .arg(self.storage_key(key))
                    .arg(bytes)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = self
            .timed(
                "DEL",
                ::redis::cmd("DEL")
                    .arg(self.storage_key(key))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(region = %self.settings.name))]
    async fn clear(&self) -> Result<()> {
        let pattern = format!("{}:{}:*", self.key_prefix, self.settings.name);
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .timed(
                    "SCAN",
                    ::redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;
            if !keys.is_empty() {
                removed += keys.len();
                let _: i64 = self
                    .timed("DEL", ::redis::cmd("DEL").arg(&keys).query_async(&mut conn))
                    .await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!("Redis region clear: removed {} keys", removed);
        Ok(())
    }

    async fn invoke<F, R>(&self, key: &CacheKey, f: F) -> Result<R>
    where
        F: Fn(Option<&CacheEntry>) -> (Mutation, R) + Send + Sync,
        R: Send,
    {
        let mut conn = self.checkout_watch_connection().await?;
        let outcome = self.compare_and_set(&mut conn, key, f).await;
        // 只有 EXEC 或 UNWATCH 结束的连接才能复用，其余可能仍处于 WATCH 状态
        if matches!(outcome, Ok(_) | Err(CacheError::Conflict(_))) {
            self.checkin_watch_connection(conn).await;
        }
        outcome
    }

    fn next_timestamp(&self) -> u64 {
        self.settings.timestamper.next()
    }

    fn lock_timeout(&self) -> u64 {
        self.settings.lock_timeout_ticks()
    }
}
