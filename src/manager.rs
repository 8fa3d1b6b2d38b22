//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，负责按配置创建区域并提供访问策略。

use crate::access::{
    CollectionReadWriteAccess, EntityReadWriteAccess, NaturalIdReadWriteAccess, ReadWriteAccess,
};
use crate::config::{BackendType, Config, GlobalConfig, RegionConfig};
use crate::error::{CacheError, Result};
use crate::region::{
    MemoryRegion, MokaRegion, Region, RegionBackend, RegionSettings, RedisRegion,
};
use crate::serialization::SerializerEnum;
use crate::timestamp::Timestamper;
use crate::version::VersionComparator;
use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::{Arc, RwLock};
use tracing::{info, instrument, warn};

/// Moka 区域未配置容量时的默认最大条目数
const DEFAULT_MOKA_CAPACITY: u64 = 10_000;

/// 已注册的区域及其配置
struct RegisteredRegion {
    backend: Arc<RegionBackend>,
    minimal_puts: bool,
}

lazy_static! {
    static ref REGIONS: DashMap<String, RegisteredRegion> = DashMap::new();
    static ref GLOBAL: RwLock<GlobalConfig> = RwLock::new(GlobalConfig::default());
    /// 所有区域共享的逻辑时钟
    static ref CLOCK: Arc<Timestamper> = Arc::new(Timestamper::new());
}

/// 缓存管理器
pub struct CacheManager;

impl CacheManager {
    /// 初始化缓存管理器
    ///
    /// 验证配置并创建所有区域；已存在的同名区域会被替换
    #[instrument(skip(config), level = "info", fields(region_count = config.regions.len()))]
    pub async fn init(config: Config) -> Result<()> {
        config.validate().map_err(CacheError::ConfigError)?;

        info!("Initializing CacheManager with {} regions", config.regions.len());
        // 全部区域构建成功后才注册，任一失败时不留下部分注册的区域
        let mut built = Vec::with_capacity(config.regions.len());
        for (name, region_cfg) in &config.regions {
            let backend = build_region(name, region_cfg, &config.global, CLOCK.clone()).await?;
            info!("Region {} ready ({:?})", name, region_cfg.backend);
            built.push((
                name.clone(),
                RegisteredRegion {
                    backend: Arc::new(backend),
                    minimal_puts: region_cfg.minimal_puts(&config.global),
                },
            ));
        }
        for (name, region) in built {
            REGIONS.insert(name, region);
        }

        match GLOBAL.write() {
            Ok(mut global) => *global = config.global,
            Err(poisoned) => *poisoned.into_inner() = config.global,
        }
        Ok(())
    }

    /// 获取已注册的区域
    pub fn get_region(name: &str) -> Result<Arc<RegionBackend>> {
        REGIONS
            .get(name)
            .map(|r| r.backend.clone())
            .ok_or_else(|| CacheError::NotFound(name.to_string()))
    }

    /// 已注册区域的名称
    pub fn region_names() -> Vec<String> {
        let mut names: Vec<String> = REGIONS.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    fn core_access(name: &str) -> Result<ReadWriteAccess<RegionBackend>> {
        let (backend, minimal_puts) = REGIONS
            .get(name)
            .map(|r| (r.backend.clone(), r.minimal_puts))
            .ok_or_else(|| CacheError::NotFound(name.to_string()))?;
        let global = match GLOBAL.read() {
            Ok(global) => global.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        Ok(ReadWriteAccess::new(backend)
            .with_minimal_puts(minimal_puts)
            .with_metrics(global.enable_metrics)
            .with_serializer(SerializerEnum::from_config(&global)))
    }

    /// 为区域创建实体访问策略
    pub fn entity_access(
        name: &str,
        comparator: Option<Arc<dyn VersionComparator>>,
    ) -> Result<EntityReadWriteAccess<RegionBackend>> {
        let core = Self::core_access(name)?;
        let core = match comparator {
            Some(comparator) => core.with_comparator(comparator),
            None => core,
        };
        Ok(EntityReadWriteAccess::new(core))
    }

    pub fn collection_access(name: &str) -> Result<CollectionReadWriteAccess<RegionBackend>> {
        Ok(CollectionReadWriteAccess::new(Self::core_access(name)?))
    }

    pub fn natural_id_access(name: &str) -> Result<NaturalIdReadWriteAccess<RegionBackend>> {
        Ok(NaturalIdReadWriteAccess::new(Self::core_access(name)?))
    }

    /// 清空所有区域
    #[instrument(level = "info")]
    pub async fn evict_all_regions() -> Result<()> {
        let backends: Vec<Arc<RegionBackend>> =
            REGIONS.iter().map(|r| r.backend.clone()).collect();
        for backend in backends {
            backend.clear().await?;
        }
        Ok(())
    }

    /// 重置缓存管理器（仅用于测试）
    #[doc(hidden)]
    pub fn reset() {
        REGIONS.clear();
    }
}

/// 按配置创建区域后端
pub async fn build_region(
    name: &str,
    region_cfg: &RegionConfig,
    global: &GlobalConfig,
    clock: Arc<Timestamper>,
) -> Result<RegionBackend> {
    let settings =
        RegionSettings::new(name, region_cfg.lock_timeout(global)).with_timestamper(clock);
    let backend = match region_cfg.backend {
        BackendType::Memory => RegionBackend::Memory(MemoryRegion::with_settings(settings)),
        BackendType::Moka => RegionBackend::Moka(MokaRegion::with_settings(
            settings,
            region_cfg.max_capacity.unwrap_or(DEFAULT_MOKA_CAPACITY),
        )),
        BackendType::Redis => {
            let redis_cfg = region_cfg.redis.as_ref().ok_or_else(|| {
                CacheError::ConfigError(format!("缺少区域{}的redis配置", name))
            })?;
            RegionBackend::Redis(RedisRegion::connect(settings, redis_cfg).await?)
        }
    };
    Ok(backend)
}

/// 关闭所有区域
///
/// 清空注册表；内存区域随之释放，外部区域保留其数据
#[instrument(level = "info")]
pub async fn shutdown_all() -> Result<()> {
    info!("开始关闭所有缓存区域...");
    let names = CacheManager::region_names();
    for name in &names {
        if REGIONS.remove(name).is_none() {
            warn!("区域 {} 在关闭前已被移除", name);
        }
    }
    info!("已关闭 {} 个缓存区域", names.len());
    Ok(())
}
