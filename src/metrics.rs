//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存区域的指标收集功能。

use lazy_static::lazy_static;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// 指标收集器
///
/// 按 `region:op:result` 统计协议操作的结果
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

/// 单个区域的计数快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub skipped_puts: u64,
    pub locks: u64,
    pub concurrent_locks: u64,
    pub unlocks: u64,
    pub expired_locks: u64,
    pub evictions: u64,
}

impl RegionSnapshot {
    /// 命中率（0.0-1.0），无读取时为 None
    pub fn hit_ratio(&self) -> Option<f64> {
        let reads = self.hits + self.misses;
        if reads == 0 {
            None
        } else {
            Some(self.hits as f64 / reads as f64)
        }
    }
}

impl Metrics {
    fn requests(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        // 计数器在 panic 后依然可用
        self.requests_total
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 记录一次操作结果
    ///
    /// # 参数
    ///
    /// * `region` - 区域名称
    /// * `op` - 操作类型（get/put_from_load/lock/unlock/after_insert/after_update/evict）
    /// * `result` - 操作结果（hit/miss/put/skipped/...）
    pub fn record(&self, region: &str, op: &str, result: &str) {
        let key = format!("{}:{}:{}", region, op, result);
        *self.requests().entry(key).or_insert(0) += 1;
    }

    pub fn count(&self, region: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", region, op, result);
        self.requests().get(&key).copied().unwrap_or(0)
    }

    /// 获取指定区域的计数快照
    pub fn region_snapshot(&self, region: &str) -> RegionSnapshot {
        let mut snapshot = RegionSnapshot::default();
        let prefix = format!("{}:", region);
        for (key, count) in self.requests().iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            // 区域名称本身不含冒号时 rest 恰为 op:result
            match rest {
                "get:hit" => snapshot.hits += count,
                "get:miss" => snapshot.misses += count,
                "put_from_load:put" | "after_insert:put" | "after_update:put" => {
                    snapshot.puts += count
                }
                "put_from_load:skipped" | "after_insert:skipped" => snapshot.skipped_puts += count,
                "lock:acquired" => snapshot.locks += count,
                "lock:concurrent" => {
                    snapshot.locks += count;
                    snapshot.concurrent_locks += count;
                }
                "unlock:released" | "unlock:removed" | "after_update:concurrent" => {
                    snapshot.unlocks += count
                }
                "unlock:expired" => snapshot.expired_locks += count,
                "evict:key" | "evict:all" => snapshot.evictions += count,
                _ => {}
            }
        }
        snapshot
    }

    /// 清空全部计数
    pub fn reset(&self) {
        self.requests().clear();
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为 Prometheus 风格的文本，按标签排序
pub fn get_metrics_string() -> String {
    let sorted: BTreeMap<String, u64> = GLOBAL_METRICS
        .requests()
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();

    let mut output = String::new();
    for (key, count) in sorted {
        let parts: Vec<&str> = key.rsplitn(3, ':').collect();
        if let [result, op, region] = parts.as_slice() {
            output.push_str(&format!(
                "rwcache_operations_total{{region=\"{}\", operation=\"{}\", result=\"{}\"}} {}\n",
                region, op, result, count
            ));
        }
    }
    output
}
