//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了并发模拟命令：多个写入者和读取者在同一组键上竞争，
//! 检查读取方从未看到比数据库已提交版本更新的值。

use crate::access::{AccessExt, AccessStrategy, EntityReadWriteAccess};
use crate::cli::SimulateArgs;
use crate::config::{Config, RegionConfig};
use crate::key::CacheKey;
use crate::manager::CacheManager;
use crate::metrics::GLOBAL_METRICS;
use crate::region::RegionBackend;
use crate::version::{NaturalVersionComparator, Version};
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 模拟结果
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub transactions: usize,
    pub hits: usize,
    pub violations: usize,
}

/// 模拟的数据库：每行一个版本号，行锁保证写入互斥
#[derive(Default)]
struct Database {
    rows: DashMap<usize, Arc<Mutex<i64>>>,
}

impl Database {
    fn row(&self, id: usize) -> Arc<Mutex<i64>> {
        self.rows.entry(id).or_default().clone()
    }
}

pub async fn execute(args: &SimulateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };
    config
        .regions
        .entry(args.region.clone())
        .or_insert_with(RegionConfig::default);
    CacheManager::init(config).await?;

    let report = run_simulation(args).await?;
    println!("=== Simulation on region '{}' ===", args.region);
    println!("Transactions:  {}", report.transactions);
    println!("Cache hits:    {}", report.hits);
    println!("Violations:    {}", report.violations);
    println!("{:#?}", GLOBAL_METRICS.region_snapshot(&args.region));

    if report.violations > 0 {
        anyhow::bail!("{} consistency violations detected", report.violations);
    }
    Ok(())
}

/// 在已注册的区域上运行模拟
pub async fn run_simulation(args: &SimulateArgs) -> Result<SimulationReport> {
    let access = Arc::new(CacheManager::entity_access(
        &args.region,
        Some(Arc::new(NaturalVersionComparator)),
    )?);
    let db = Arc::new(Database::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let keys = args.keys.max(1);

    let mut handles = Vec::with_capacity(args.writers);
    for writer in 0..args.writers {
        let access = access.clone();
        let db = db.clone();
        let hits = hits.clone();
        let violations = violations.clone();
        let args = args.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..args.rounds {
                let id = (writer * 7 + round) % keys;
                let commit = args.rollback_every == 0 || (round + 1) % args.rollback_every != 0;
                let outcome = transaction(&access, &db, id, commit).await?;
                if outcome.hit {
                    hits.fetch_add(1, Ordering::Relaxed);
                }
                if outcome.violation {
                    violations.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok::<_, crate::error::CacheError>(())
        }));
    }

    for handle in handles {
        handle.await.context("writer task panicked")??;
    }

    Ok(SimulationReport {
        transactions: args.writers * args.rounds,
        hits: hits.load(Ordering::Relaxed),
        violations: violations.load(Ordering::Relaxed),
    })
}

struct Outcome {
    hit: bool,
    violation: bool,
}

/// 一个读后写事务
async fn transaction(
    access: &EntityReadWriteAccess<RegionBackend>,
    db: &Database,
    id: usize,
    commit: bool,
) -> crate::error::Result<Outcome> {
    let key = CacheKey::entity("SimulatedRow", id);
    let tx_start = access.next_timestamp();
    let row = db.row(id);

    let mut outcome = Outcome {
        hit: false,
        violation: false,
    };
    let current = match access.get_as::<i64>(&key, tx_start).await? {
        Some(cached) => {
            outcome.hit = true;
            let committed = *row.lock().await;
            outcome.violation = cached < 0 || cached > committed;
            cached
        }
        None => {
            let loaded = *row.lock().await;
            access
                .put_from_load_as(&key, &loaded, tx_start, Some(Version::Int(loaded)))
                .await?;
            loaded
        }
    };

    let token = access.lock_item(&key, Some(Version::Int(current))).await?;
    let written = {
        let mut version = row.lock().await;
        let next = *version + 1;
        if commit {
            *version = next;
        }
        next
    };

    if commit {
        access
            .after_update_as(&key, &written, Some(Version::Int(written)), token)
            .await?;
    } else {
        access.unlock_item(&key, token).await?;
    }
    Ok(outcome)
}
