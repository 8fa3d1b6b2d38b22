//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存一致性协议的错误类型。
//!
//! 协议本身的结果（令牌不匹配、条目不可写）不是错误，而是布尔结果或强制驱逐；
//! 这里只描述区域（Region）不可用、配置错误和序列化失败等真正的故障。

use thiserror::Error;

/// 缓存系统错误类型枚举
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 区域后端操作失败（后端不可用、命令超时等）
    #[error("Region operation failed: {0}")]
    RegionError(String),

    /// 乐观并发冲突：原子修改在重试上限内未能提交
    #[error("Concurrent modification conflict: {0}")]
    Conflict(String),

    /// 未找到指定的区域
    #[error("Region not found: {0}")]
    NotFound(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
