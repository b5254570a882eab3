//! 工作单元作用域
//!
//! 作用域把环境上下文和一个新的子容器绑定在一起，并通过 tokio 任务本地存储
//! 在整个异步调用链上传播，不需要显式传参。
//!
//! 传播只沿同一个 future 的执行链进行。同一线程上交替执行的兄弟 future
//! 各自看到自己的作用域；`tokio::spawn` 出去的新任务不会继承作用域，
//! 需要在任务内部重新调用 [`UnitOfWorkScope::run_within`]。

use crate::container::Container;
use di_abstractions::ProviderDescriptor;
use infrastructure_common::{AmbientContext, DependencyResult, ScopeInfo, Token};
use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

tokio::task_local! {
    static ACTIVE_SCOPE: UnitOfWorkScope;
}

/// 当前作用域环境上下文的令牌
///
/// 根容器中注册为作用域占位符，每个作用域用本地值遮蔽它。
pub static AMBIENT_CONTEXT: Lazy<Token<AmbientContext>> = Lazy::new(|| Token::new("AmbientContext"));

/// 工作单元作用域
#[derive(Clone, Debug)]
pub struct UnitOfWorkScope {
    info: ScopeInfo,
    context: Arc<AmbientContext>,
    container: Container,
}

impl UnitOfWorkScope {
    /// 打开新作用域，子容器的父容器为 `root` 所在的根容器
    pub fn open(root: &Container, context: AmbientContext) -> DependencyResult<Self> {
        let info = ScopeInfo::new(context.trigger.to_string());
        let context = Arc::new(context);
        let container = root.create_scope(info.clone(), Some(context.clone()));
        container.register(ProviderDescriptor::instance(&AMBIENT_CONTEXT, context.clone()).scoped())?;

        debug!("打开工作单元作用域: {} (locale={})", info, context.locale);
        Ok(Self {
            info,
            context,
            container,
        })
    }

    pub fn info(&self) -> &ScopeInfo {
        &self.info
    }

    /// 环境上下文
    pub fn context(&self) -> &Arc<AmbientContext> {
        &self.context
    }

    /// 作用域子容器
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// 在作用域内执行异步操作
    ///
    /// 操作完成后作用域缓存随即释放。
    pub async fn run_within<F>(self, operation: F) -> F::Output
    where
        F: Future,
    {
        let container = self.container.clone();
        let info = self.info.clone();
        let output = ACTIVE_SCOPE.scope(self, operation).await;
        container.release();
        debug!("关闭工作单元作用域: {} (耗时 {} ms)", info, info.age().num_milliseconds());
        output
    }

    /// 当前活动的作用域
    pub fn current() -> Option<UnitOfWorkScope> {
        ACTIVE_SCOPE.try_with(Clone::clone).ok()
    }
}

/// 当前活动作用域
pub fn current_scope() -> Option<UnitOfWorkScope> {
    UnitOfWorkScope::current()
}

/// 当前活动作用域的环境上下文
pub fn current_context() -> Option<Arc<AmbientContext>> {
    ACTIVE_SCOPE.try_with(|scope| scope.context.clone()).ok()
}

/// 当前活动作用域的子容器
pub fn current_container() -> Option<Container> {
    ACTIVE_SCOPE.try_with(|scope| scope.container.clone()).ok()
}
