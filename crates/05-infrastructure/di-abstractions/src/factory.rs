//! 组件工厂抽象接口
//!
//! 提供组件实例创建的工厂模式支持

use async_trait::async_trait;
use futures::future::BoxFuture;
use infrastructure_common::{DependencyError, DependencyResult, ServiceToken, Token, TypeInfo};
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// 类型擦除后的组件实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 将擦除类型的实例转换为具体类型
pub fn downcast_instance<T: Send + Sync + 'static>(
    token: &ServiceToken,
    instance: Instance,
) -> DependencyResult<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| DependencyError::TypeMismatch {
            token: token.clone(),
            expected: TypeInfo::of::<T>().module_path,
        })
}

/// 已解析的依赖集合
///
/// 按注入声明的顺序保存依赖实例，可按位置或按令牌取出。
#[derive(Clone)]
pub struct Dependencies {
    owner: ServiceToken,
    tokens: Vec<ServiceToken>,
    values: Vec<Instance>,
}

impl Dependencies {
    /// 创建依赖集合，`tokens` 与 `values` 一一对应
    pub fn new(owner: ServiceToken, tokens: Vec<ServiceToken>, values: Vec<Instance>) -> Self {
        debug_assert_eq!(tokens.len(), values.len());
        Self {
            owner,
            tokens,
            values,
        }
    }

    /// 被创建组件的令牌
    pub fn owner(&self) -> &ServiceToken {
        &self.owner
    }

    /// 按位置获取依赖
    pub fn at<T: Send + Sync + 'static>(&self, index: usize) -> DependencyResult<Arc<T>> {
        match (self.tokens.get(index), self.values.get(index)) {
            (Some(token), Some(value)) => downcast_instance(token, value.clone()),
            _ => Err(DependencyError::creation_failed(
                &self.owner,
                format!("依赖索引越界: {index} (共 {} 个依赖)", self.values.len()),
            )),
        }
    }

    /// 按令牌获取依赖
    pub fn get<T: Send + Sync + 'static>(&self, token: &Token<T>) -> DependencyResult<Arc<T>> {
        let index = self
            .tokens
            .iter()
            .position(|candidate| candidate == token.service_token())
            .ok_or_else(|| DependencyError::UnknownToken {
                token: token.service_token().clone(),
            })?;
        self.at(index)
    }

    /// 依赖数量
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否没有依赖
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("owner", &self.owner)
            .field("tokens", &self.tokens)
            .finish()
    }
}

/// 组件工厂 trait
///
/// 用于异步创建组件实例，依赖已经按声明顺序解析完成
#[async_trait]
pub trait ComponentFactory: Send + Sync {
    /// 创建组件实例
    async fn create(&self, dependencies: Dependencies) -> DependencyResult<Instance>;

    /// 获取工厂名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 同步构造函数类型
pub type ConstructorFn = Arc<dyn Fn(&Dependencies) -> DependencyResult<Instance> + Send + Sync>;

/// 把闭包包装成构造函数
pub fn constructor<T, F>(build: F) -> ConstructorFn
where
    T: Send + Sync + 'static,
    F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Arc::new(move |dependencies: &Dependencies| {
        build(dependencies)
            .map(|value| Arc::new(value) as Instance)
            .map_err(|error| into_dependency_error(dependencies.owner(), error))
    })
}

/// 把 anyhow 错误还原为依赖错误
///
/// 如果错误本身来自嵌套解析，则原样返回，否则包装为创建失败。
pub fn into_dependency_error(owner: &ServiceToken, error: anyhow::Error) -> DependencyError {
    match error.downcast::<DependencyError>() {
        Ok(dependency_error) => dependency_error,
        Err(other) => DependencyError::creation_failed(owner, other),
    }
}

/// 闭包工厂包装器
pub struct FnFactory<T, F> {
    factory_fn: F,
    component_type: PhantomData<fn() -> T>,
}

impl<T, F, Fut> FnFactory<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            component_type: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> ComponentFactory for FnFactory<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    async fn create(&self, dependencies: Dependencies) -> DependencyResult<Instance> {
        let owner = dependencies.owner().clone();
        (self.factory_fn)(dependencies)
            .await
            .map(|value| Arc::new(value) as Instance)
            .map_err(|error| into_dependency_error(&owner, error))
    }

    fn name(&self) -> &str {
        std::any::type_name::<T>()
    }
}

/// 装箱的异步结果
pub type BoxedResolution<'a> = BoxFuture<'a, DependencyResult<Instance>>;
