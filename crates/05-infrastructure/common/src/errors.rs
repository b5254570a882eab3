//! 错误类型定义

use crate::context::TriggerKind;
use crate::lifecycle::Lifetime;
use crate::token::ServiceToken;
use thiserror::Error;

/// 装箱的错误源
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError { source: BoxError },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 依赖注入错误类型
///
/// 注册和解析提供者时产生的错误。解析期错误只影响当前调用，
/// 由调度方决定如何处理，容器本身从不重试。
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("未注册的服务令牌: {token}")]
    UnknownToken { token: ServiceToken },

    #[error("服务令牌重复注册: {token}")]
    DuplicateRegistration { token: ServiceToken },

    #[error("解析作用域服务需要活动的工作单元作用域: {token}")]
    ScopeRequired { token: ServiceToken },

    #[error("条件不满足且没有后备提供者: {token}")]
    NoFallbackProvider { token: ServiceToken },

    #[error("生命周期不匹配: {token} ({lifetime}) 不能依赖 {dependency} ({dependency_lifetime})")]
    LifetimeMismatch {
        token: ServiceToken,
        lifetime: Lifetime,
        dependency: ServiceToken,
        dependency_lifetime: Lifetime,
    },

    #[error("循环依赖检测到: {}", format_chain(chain))]
    CircularDependency { chain: Vec<ServiceToken> },

    #[error("类型不匹配: {token} 期望类型 {expected}")]
    TypeMismatch { token: ServiceToken, expected: String },

    #[error("组件创建失败: {token}, 原因: {source}")]
    ComponentCreationFailed { token: ServiceToken, source: BoxError },

    #[error("容器已关闭，无法解析: {token}")]
    ContainerClosed { token: ServiceToken },
}

impl DependencyError {
    /// 创建组件创建失败错误
    pub fn creation_failed(token: &ServiceToken, source: impl Into<BoxError>) -> Self {
        Self::ComponentCreationFailed {
            token: token.clone(),
            source: source.into(),
        }
    }

    /// 出错的令牌
    pub fn token(&self) -> Option<&ServiceToken> {
        match self {
            Self::UnknownToken { token }
            | Self::DuplicateRegistration { token }
            | Self::ScopeRequired { token }
            | Self::NoFallbackProvider { token }
            | Self::LifetimeMismatch { token, .. }
            | Self::TypeMismatch { token, .. }
            | Self::ComponentCreationFailed { token, .. }
            | Self::ContainerClosed { token } => Some(token),
            Self::CircularDependency { chain } => chain.last(),
        }
    }
}

fn format_chain(chain: &[ServiceToken]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// 模块图错误类型
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("检测到模块循环依赖: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("模块 {module} 存在未绑定的前向引用")]
    UnresolvedImport { module: String },

    #[error("模块重复展开: {module}")]
    DuplicateModuleRegistration { module: String },

    #[error("模块 {module} 注册提供者失败: {source}")]
    Registration {
        module: String,
        #[source]
        source: DependencyError,
    },

    #[error("提供者依赖图无效: {source}")]
    ProviderGraph {
        #[source]
        source: DependencyError,
    },

    #[error("模块 {module} 初始化失败: {source}")]
    InitializationFailed { module: String, source: BoxError },
}

/// 单个模块关闭失败的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownFailure {
    /// 模块名称
    pub module: String,
    /// 错误信息
    pub message: String,
}

/// 应用编排错误类型
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("应用已经配置过")]
    AlreadyConfigured,

    #[error("应用尚未就绪，当前状态: {state}")]
    NotConfigured { state: String },

    #[error("模块错误: {source}")]
    Module {
        #[from]
        source: ModuleError,
    },

    #[error("依赖注入错误: {source}")]
    Dependency {
        #[from]
        source: DependencyError,
    },

    #[error("配置错误: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("没有可用的调度目标: {target}")]
    DispatchTargetMissing { target: &'static str },

    #[error("调度失败 ({trigger}): {source}")]
    Dispatch { trigger: TriggerKind, source: BoxError },

    #[error("{} 个模块关闭失败", failures.len())]
    ShutdownFailed { failures: Vec<ShutdownFailure> },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type ModuleResult<T> = Result<T, ModuleError>;
pub type ApplicationResult<T> = Result<T, ApplicationError>;
