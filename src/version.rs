//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了乐观锁版本值及其比较器。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 乐观锁版本值
///
/// 对应数据库中的版本列（整数、时间戳或行版本二进制）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Version {
    Int(i64),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Version {
    fn rank(&self) -> u8 {
        match self {
            Version::Int(_) => 0,
            Version::Timestamp(_) => 1,
            Version::Bytes(_) => 2,
        }
    }
}

impl From<i64> for Version {
    fn from(v: i64) -> Self {
        Version::Int(v)
    }
}

impl From<DateTime<Utc>> for Version {
    fn from(v: DateTime<Utc>) -> Self {
        Version::Timestamp(v)
    }
}

/// 版本比较器
///
/// 对同一缓存类型的所有调用必须给出一致的全序
pub trait VersionComparator: Send + Sync {
    fn compare(&self, a: &Version, b: &Version) -> Ordering;
}

/// 默认比较器：同类版本按自然顺序比较，不同类按类型排序
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalVersionComparator;

impl VersionComparator for NaturalVersionComparator {
    fn compare(&self, a: &Version, b: &Version) -> Ordering {
        match (a, b) {
            (Version::Int(x), Version::Int(y)) => x.cmp(y),
            (Version::Timestamp(x), Version::Timestamp(y)) => x.cmp(y),
            (Version::Bytes(x), Version::Bytes(y)) => x.cmp(y),
            _ => a.rank().cmp(&b.rank()),
        }
    }
}
