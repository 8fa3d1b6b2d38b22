//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了区域使用的逻辑时间戳源。
//!
//! 时间戳格式为 `(毫秒 << 12) + 计数器`，即每毫秒 4096 个刻度，
//! 保证在同一进程内严格递增，即使系统时钟回拨也不会后退。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 每毫秒的时间戳刻度数
pub const ONE_MS: u64 = 1 << 12;

/// 单调递增的逻辑时钟
#[derive(Debug, Default)]
pub struct Timestamper {
    last: AtomicU64,
}

impl Timestamper {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// 获取下一个时间戳
    ///
    /// 返回值总是严格大于之前返回过的任何值
    pub fn next(&self) -> u64 {
        let wall = current_millis() << 12;
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = if wall > prev { wall } else { prev + 1 };
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// 将时长转换为时间戳刻度
pub fn duration_to_ticks(duration: Duration) -> u64 {
    (duration.as_millis() as u64).saturating_mul(ONE_MS)
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
