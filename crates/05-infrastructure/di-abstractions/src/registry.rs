//! 提供者注册表抽象接口
//!
//! 提供者描述符由令牌、构造策略和生命周期组成，是容器解析的基本单元。

use crate::factory::{constructor, ComponentFactory, ConstructorFn, Dependencies, FnFactory, Instance};
use infrastructure_common::{
    AmbientContext, DependencyError, DependencyResult, Lifetime, ServiceToken, Token,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// 条件谓词类型，参数为当前作用域的环境上下文（根容器中为 `None`）
pub type PredicateFn = Arc<dyn Fn(Option<&AmbientContext>) -> bool + Send + Sync>;

/// 构造策略
#[derive(Clone)]
pub enum ProviderStrategy {
    /// 构造函数 + 按位置注入的令牌列表
    Class {
        inject: Vec<ServiceToken>,
        constructor: ConstructorFn,
    },
    /// 异步工厂，参数为已解析的依赖
    Factory {
        inject: Vec<ServiceToken>,
        factory: Arc<dyn ComponentFactory>,
    },
    /// 预先计算好的实例
    Value(Instance),
    /// 根据谓词在两个策略之间选择
    Conditional {
        predicate: PredicateFn,
        when_true: Box<ProviderStrategy>,
        fallback: Option<Box<ProviderStrategy>>,
    },
}

impl ProviderStrategy {
    /// 构造函数策略
    pub fn class<T, F>(inject: Vec<ServiceToken>, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::Class {
            inject,
            constructor: constructor(build),
        }
    }

    /// 异步工厂策略
    pub fn factory<T, F, Fut>(inject: Vec<ServiceToken>, factory_fn: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Factory {
            inject,
            factory: Arc::new(FnFactory::new(factory_fn)),
        }
    }

    /// 值策略
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// 条件策略
    pub fn conditional<P>(predicate: P, when_true: ProviderStrategy, fallback: Option<ProviderStrategy>) -> Self
    where
        P: Fn(Option<&AmbientContext>) -> bool + Send + Sync + 'static,
    {
        Self::Conditional {
            predicate: Arc::new(predicate),
            when_true: Box::new(when_true),
            fallback: fallback.map(Box::new),
        }
    }

    /// 策略声明的全部依赖令牌，条件策略包含两个分支
    pub fn dependencies(&self) -> Vec<ServiceToken> {
        match self {
            Self::Class { inject, .. } | Self::Factory { inject, .. } => inject.clone(),
            Self::Value(_) => Vec::new(),
            Self::Conditional {
                when_true,
                fallback,
                ..
            } => {
                let mut tokens = when_true.dependencies();
                if let Some(fallback) = fallback {
                    for token in fallback.dependencies() {
                        if !tokens.contains(&token) {
                            tokens.push(token);
                        }
                    }
                }
                tokens
            }
        }
    }

    /// 策略类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Class { .. } => "class",
            Self::Factory { .. } => "factory",
            Self::Value(_) => "value",
            Self::Conditional { .. } => "conditional",
        }
    }
}

impl std::fmt::Debug for ProviderStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Class { inject, .. } => f
                .debug_struct("Class")
                .field("inject", inject)
                .field("constructor", &"<function>")
                .finish(),
            Self::Factory { inject, factory } => f
                .debug_struct("Factory")
                .field("inject", inject)
                .field("factory", &factory.name())
                .finish(),
            Self::Value(_) => f.write_str("Value(<instance>)"),
            Self::Conditional {
                when_true,
                fallback,
                ..
            } => f
                .debug_struct("Conditional")
                .field("when_true", when_true)
                .field("fallback", fallback)
                .finish(),
        }
    }
}

/// 提供者描述符
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// 服务令牌
    pub token: ServiceToken,
    /// 构造策略
    pub strategy: ProviderStrategy,
    /// 生命周期
    pub lifetime: Lifetime,
}

impl ProviderDescriptor {
    /// 创建提供者描述符，默认生命周期为单例
    pub fn new(token: impl Into<ServiceToken>, strategy: ProviderStrategy) -> Self {
        Self {
            token: token.into(),
            strategy,
            lifetime: Lifetime::default(),
        }
    }

    /// 注册预先计算好的值
    pub fn value<T: Send + Sync + 'static>(token: &Token<T>, value: T) -> Self {
        Self::new(token, ProviderStrategy::value(value))
    }

    /// 注册共享实例
    pub fn instance<T: Send + Sync + 'static>(token: &Token<T>, instance: Arc<T>) -> Self {
        Self::new(token, ProviderStrategy::Value(instance))
    }

    /// 注册构造函数
    pub fn class<T, F>(token: &Token<T>, inject: Vec<ServiceToken>, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::new(token, ProviderStrategy::class(inject, build))
    }

    /// 注册异步工厂
    pub fn factory<T, F, Fut>(token: &Token<T>, inject: Vec<ServiceToken>, factory_fn: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::new(token, ProviderStrategy::factory(inject, factory_fn))
    }

    /// 注册条件提供者
    pub fn conditional<T, P>(
        token: &Token<T>,
        predicate: P,
        when_true: ProviderStrategy,
        fallback: Option<ProviderStrategy>,
    ) -> Self
    where
        T: Send + Sync + 'static,
        P: Fn(Option<&AmbientContext>) -> bool + Send + Sync + 'static,
    {
        Self::new(token, ProviderStrategy::conditional(predicate, when_true, fallback))
    }

    /// 设置生命周期
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn singleton(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    pub fn scoped(self) -> Self {
        self.with_lifetime(Lifetime::Scoped)
    }

    pub fn transient(self) -> Self {
        self.with_lifetime(Lifetime::Transient)
    }

    /// 声明的依赖令牌
    pub fn dependencies(&self) -> Vec<ServiceToken> {
        self.strategy.dependencies()
    }
}

/// 提供者注册表 trait
///
/// 注册只作用于本地节点，不会修改父容器
pub trait ProviderRegistry: Send + Sync {
    /// 注册提供者，令牌已有本地注册时返回 `DuplicateRegistration`
    fn register(&self, descriptor: ProviderDescriptor) -> DependencyResult<()>;

    /// 显式覆盖本地注册，返回被替换的描述符
    fn override_provider(&self, descriptor: ProviderDescriptor) -> Option<Arc<ProviderDescriptor>>;

    /// 本地是否已注册令牌
    fn is_registered(&self, token: &ServiceToken) -> bool;

    /// 本地注册的全部描述符
    fn descriptors(&self) -> Vec<Arc<ProviderDescriptor>>;
}

/// 依赖图节点
#[derive(Debug, Clone)]
pub struct DependencyGraphNode {
    /// 组件令牌
    pub token: ServiceToken,
    /// 生命周期
    pub lifetime: Lifetime,
    /// 依赖的令牌列表
    pub dependencies: Vec<ServiceToken>,
}

/// 循环依赖检测器
pub trait CircularDependencyDetector: Send + Sync {
    /// 检测循环依赖
    fn detect_circular_dependencies(&self, graph: &[DependencyGraphNode]) -> DependencyResult<()>;

    /// 构建依赖图
    fn build_dependency_graph(&self, descriptors: &[Arc<ProviderDescriptor>]) -> Vec<DependencyGraphNode>;
}

/// 默认循环依赖检测器
#[derive(Debug, Default)]
pub struct DefaultCircularDependencyDetector;

impl CircularDependencyDetector for DefaultCircularDependencyDetector {
    fn detect_circular_dependencies(&self, graph: &[DependencyGraphNode]) -> DependencyResult<()> {
        let index: HashMap<&ServiceToken, &DependencyGraphNode> =
            graph.iter().map(|node| (&node.token, node)).collect();
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for node in graph {
            if !visited.contains(&node.token) {
                Self::dfs_check(&node.token, &index, &mut visited, &mut stack)?;
            }
        }

        Ok(())
    }

    fn build_dependency_graph(&self, descriptors: &[Arc<ProviderDescriptor>]) -> Vec<DependencyGraphNode> {
        descriptors
            .iter()
            .map(|descriptor| DependencyGraphNode {
                token: descriptor.token.clone(),
                lifetime: descriptor.lifetime,
                dependencies: descriptor.dependencies(),
            })
            .collect()
    }
}

impl DefaultCircularDependencyDetector {
    fn dfs_check(
        current: &ServiceToken,
        index: &HashMap<&ServiceToken, &DependencyGraphNode>,
        visited: &mut HashSet<ServiceToken>,
        stack: &mut Vec<ServiceToken>,
    ) -> DependencyResult<()> {
        if let Some(position) = stack.iter().position(|token| token == current) {
            let mut chain = stack[position..].to_vec();
            chain.push(current.clone());
            return Err(DependencyError::CircularDependency { chain });
        }

        if visited.contains(current) {
            return Ok(());
        }

        // 未注册的令牌可能由作用域本地覆盖提供，这里跳过
        let Some(node) = index.get(current) else {
            return Ok(());
        };

        stack.push(current.clone());
        for dependency in &node.dependencies {
            Self::dfs_check(dependency, index, visited, stack)?;
        }
        stack.pop();
        visited.insert(current.clone());

        Ok(())
    }
}
