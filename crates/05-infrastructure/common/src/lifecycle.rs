//! 组件生命周期管理

use serde::{Deserialize, Serialize};
use std::fmt;

/// 组件生命周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// 单例模式 - 整个进程内只创建一个实例，缓存在根容器
    Singleton,
    /// 作用域模式 - 每个工作单元作用域内共享一个实例
    Scoped,
    /// 瞬时模式 - 每次解析都创建新实例
    Transient,
}

impl Lifetime {
    /// 是否缓存实例
    pub fn is_cached(self) -> bool {
        matches!(self, Self::Singleton | Self::Scoped)
    }

    /// 检查当前生命周期的提供者能否依赖指定生命周期的提供者
    ///
    /// 单例只能依赖单例，否则会捕获作用域或瞬时实例。
    pub fn can_depend_on(self, dependency: Lifetime) -> bool {
        self != Self::Singleton || dependency == Self::Singleton
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::Singleton
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::Scoped => write!(f, "scoped"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// 工作单元作用域信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInfo {
    pub id: uuid::Uuid,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ScopeInfo {
    /// 创建新作用域信息
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            created_at: chrono::Utc::now(),
        }
    }

    /// 作用域存活时长
    pub fn age(&self) -> chrono::Duration {
        chrono::Utc::now() - self.created_at
    }
}

impl fmt::Display for ScopeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.id)
    }
}
