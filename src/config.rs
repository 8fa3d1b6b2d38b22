//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存区域的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

/// 软锁超时上限：一天
const MAX_LOCK_TIMEOUT_MS: u64 = 86_400_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub regions: HashMap<String, RegionConfig>,
}

/// 全局配置
///
/// 定义适用于所有区域的默认配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 软锁超时时间（毫秒）
    pub lock_timeout_ms: u64,
    /// 是否启用最小写入：已存在条目时跳过 put_from_load
    pub minimal_puts: bool,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 序列化时是否启用压缩
    pub compress: bool,
    /// 是否启用指标收集
    pub enable_metrics: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 60_000,
            minimal_puts: false,
            serialization: SerializationType::Json,
            compress: false,
            enable_metrics: true,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    #[default]
    Json,
}

/// 区域后端类型
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// 进程内 DashMap
    #[default]
    Memory,
    /// 进程内 Moka 缓存（支持容量淘汰）
    Moka,
    /// Redis
    Redis,
}

/// 区域配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RegionConfig {
    pub backend: BackendType,
    /// 覆盖全局软锁超时（毫秒）
    pub lock_timeout_ms: Option<u64>,
    /// 覆盖全局最小写入设置
    pub minimal_puts: Option<bool>,
    /// Moka 最大条目数
    pub max_capacity: Option<u64>,
    pub redis: Option<RedisRegionConfig>,
}

/// Redis 区域配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisRegionConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 键前缀
    pub key_prefix: String,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 乐观事务（WATCH/EXEC）最大重试次数
    pub max_cas_retries: u32,
    /// 重试退避基准时间（毫秒）
    pub retry_base_delay_ms: u64,
}

impl Default for RedisRegionConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            key_prefix: "rwcache".to_string(),
            command_timeout_ms: 3000,
            max_cas_retries: 16,
            retry_base_delay_ms: 1,
        }
    }
}

impl RegionConfig {
    /// 该区域生效的软锁超时
    pub fn lock_timeout(&self, global: &GlobalConfig) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.unwrap_or(global.lock_timeout_ms))
    }

    pub fn minimal_puts(&self, global: &GlobalConfig) -> bool {
        self.minimal_puts.unwrap_or(global.minimal_puts)
    }
}

impl Config {
    /// 从 TOML 字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))
    }

    /// 从文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值都在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.lock_timeout_ms == 0 || self.global.lock_timeout_ms > MAX_LOCK_TIMEOUT_MS {
            return Err(format!(
                "Global lock_timeout_ms must be between 1 and {} ms",
                MAX_LOCK_TIMEOUT_MS
            ));
        }

        for (name, region) in &self.regions {
            if name.is_empty() {
                return Err("Region name cannot be empty".to_string());
            }

            if name.len() > 128 {
                return Err(format!(
                    "Region name '{}' exceeds maximum length of 128 characters",
                    name
                ));
            }

            if let Some(timeout) = region.lock_timeout_ms {
                if timeout == 0 || timeout > MAX_LOCK_TIMEOUT_MS {
                    return Err(format!(
                        "Region '{}' lock_timeout_ms must be between 1 and {} ms",
                        name, MAX_LOCK_TIMEOUT_MS
                    ));
                }
            }

            match region.backend {
                BackendType::Moka => {
                    if region.max_capacity == Some(0) {
                        return Err(format!("Region '{}' max_capacity cannot be zero", name));
                    }
                }
                BackendType::Redis => {
                    let redis = region.redis.as_ref().ok_or_else(|| {
                        format!("Region '{}' uses the redis backend but has no [redis] section", name)
                    })?;

                    if !(100..=60000).contains(&redis.command_timeout_ms) {
                        return Err(format!(
                            "Region '{}' command_timeout_ms must be between 100 and 60000 ms",
                            name
                        ));
                    }

                    if !(1..=1000).contains(&redis.max_cas_retries) {
                        return Err(format!(
                            "Region '{}' max_cas_retries must be between 1 and 1000",
                            name
                        ));
                    }
                }
                BackendType::Memory => {}
            }

            if region.backend != BackendType::Redis && region.redis.is_some() {
                return Err(format!(
                    "Region '{}' has a [redis] section but backend is {:?}",
                    name, region.backend
                ));
            }
        }

        Ok(())
    }
}
