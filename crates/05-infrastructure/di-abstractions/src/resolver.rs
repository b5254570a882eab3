//! 服务解析器抽象接口
//!
//! 提供按令牌解析实例的能力

use crate::factory::{downcast_instance, Instance};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use infrastructure_common::{DependencyError, DependencyResult, Lifetime, ServiceToken, Token};
use std::sync::Arc;

/// 服务解析器 trait
///
/// 由容器实现，模块生命周期钩子和调度目标通过它取得依赖
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// 解析令牌对应的实例
    async fn resolve_instance(&self, token: &ServiceToken) -> DependencyResult<Instance>;

    /// 本节点或任一祖先节点是否注册了该令牌
    fn can_resolve(&self, token: &ServiceToken) -> bool;

    /// 查询令牌的生命周期
    fn lifetime_of(&self, token: &ServiceToken) -> Option<Lifetime>;
}

/// 带类型的解析扩展方法
pub trait ResolverExt: ServiceResolver {
    /// 解析并向下转型为令牌声明的类型
    fn resolve<'a, T>(&'a self, token: &'a Token<T>) -> BoxFuture<'a, DependencyResult<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        async move {
            let instance = self.resolve_instance(token.service_token()).await?;
            downcast_instance(token.service_token(), instance)
        }
        .boxed()
    }
}

impl<R: ServiceResolver + ?Sized> ResolverExt for R {}

/// 解析上下文
///
/// 记录一次顶层解析中正在构造的令牌链，用于检测循环依赖
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// 当前解析链
    pub resolution_chain: Vec<ServiceToken>,
    /// 最大递归深度
    pub max_depth: usize,
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self {
            resolution_chain: Vec::new(),
            max_depth: 100,
        }
    }
}

impl ResolveContext {
    /// 创建新的解析上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入令牌的构造
    pub fn enter(&mut self, token: &ServiceToken) -> DependencyResult<()> {
        if let Some(position) = self.resolution_chain.iter().position(|t| t == token) {
            let mut chain = self.resolution_chain[position..].to_vec();
            chain.push(token.clone());
            return Err(DependencyError::CircularDependency { chain });
        }
        if self.resolution_chain.len() >= self.max_depth {
            return Err(DependencyError::creation_failed(
                token,
                format!("解析深度超过上限 {}", self.max_depth),
            ));
        }
        self.resolution_chain.push(token.clone());
        Ok(())
    }

    /// 离开令牌的构造
    pub fn leave(&mut self) {
        self.resolution_chain.pop();
    }

    /// 当前深度
    pub fn depth(&self) -> usize {
        self.resolution_chain.len()
    }
}
