//! rwcache - 读写二级缓存一致性协议
//!
//! 让非事务性的外部键值缓存安全地持有数据库数据（实体、集合、自然键）的副本：
//! 读取方不会看到未提交或过期的数据，并发写入方通过非阻塞软锁协调，
//! 区域只需提供单键原子读-改-写。

#![doc(html_root_url = "https://docs.rs/rwcache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};

pub mod access;
pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod manager;
pub mod metrics;
pub mod region;
pub mod serialization;
pub mod session;
pub mod telemetry;
pub mod timestamp;
pub mod version;

// Re-export commonly used items
pub use access::{
    AccessExt, AccessStrategy, CollectionReadWriteAccess, EntityReadWriteAccess,
    NaturalIdReadWriteAccess, ReadWriteAccess,
};
pub use config::Config;
pub use entry::{CacheEntry, Item, LockToken, SoftLock};
pub use error::{CacheError, Result};
pub use key::CacheKey;
pub use manager::CacheManager;
pub use region::{MemoryRegion, MokaRegion, Mutation, Region, RegionBackend, RedisRegion};
pub use session::{CacheTransaction, CompletionReport};
pub use version::{NaturalVersionComparator, Version, VersionComparator};

/// rwcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
