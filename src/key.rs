//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存键，由实体类型（或集合角色）、标识符和租户组成。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 缓存键
///
/// 不可变值类型，按结构比较相等
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheKey {
    /// 实体行
    Entity {
        entity_name: String,
        id: String,
        tenant: Option<String>,
    },
    /// 集合（一对多、多对多）
    Collection {
        role: String,
        owner_id: String,
        tenant: Option<String>,
    },
    /// 自然键到主键的映射
    NaturalId {
        entity_name: String,
        values: Vec<String>,
        tenant: Option<String>,
    },
}

impl CacheKey {
    pub fn entity(entity_name: impl Into<String>, id: impl ToString) -> Self {
        CacheKey::Entity {
            entity_name: entity_name.into(),
            id: id.to_string(),
            tenant: None,
        }
    }

    pub fn collection(role: impl Into<String>, owner_id: impl ToString) -> Self {
        CacheKey::Collection {
            role: role.into(),
            owner_id: owner_id.to_string(),
            tenant: None,
        }
    }

    pub fn natural_id<I, S>(entity_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        CacheKey::NaturalId {
            entity_name: entity_name.into(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
            tenant: None,
        }
    }

    /// 设置租户标识
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        let slot = match &mut self {
            CacheKey::Entity { tenant, .. }
            | CacheKey::Collection { tenant, .. }
            | CacheKey::NaturalId { tenant, .. } => tenant,
        };
        *slot = Some(tenant_id.into());
        self
    }

    pub fn tenant(&self) -> Option<&str> {
        match self {
            CacheKey::Entity { tenant, .. }
            | CacheKey::Collection { tenant, .. }
            | CacheKey::NaturalId { tenant, .. } => tenant.as_deref(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Entity {
                entity_name, id, ..
            } => write!(f, "entity:{}#{}", entity_name, id)?,
            CacheKey::Collection { role, owner_id, .. } => {
                write!(f, "collection:{}#{}", role, owner_id)?
            }
            CacheKey::NaturalId {
                entity_name,
                values,
                ..
            } => write!(f, "naturalid:{}#{}", entity_name, values.join("|"))?,
        }
        if let Some(tenant) = self.tenant() {
            write!(f, "@{}", tenant)?;
        }
        Ok(())
    }
}
