//! 模块描述抽象
//!
//! 模块是提供者、导入关系、对外协作者和生命周期钩子的声明单元。
//! 模块之间的导入关系构成一张图，由组合层负责展开和初始化。

use crate::registry::ProviderDescriptor;
use crate::resolver::ServiceResolver;
use async_trait::async_trait;
use infrastructure_common::{ModuleError, ModuleResult};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// 模块唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    fn next() -> Self {
        Self(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// 模块生命周期钩子
///
/// 钩子只在整个模块图完成注册后调用，可以解析任何已注册的单例
#[async_trait]
pub trait ModuleLifecycle: Send + Sync {
    /// 模块初始化
    async fn on_initialize(&self, _resolver: &dyn ServiceResolver) -> anyhow::Result<()> {
        Ok(())
    }

    /// 模块关闭
    async fn on_shutdown(&self, _resolver: &dyn ServiceResolver) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 协作者类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollaboratorKind {
    Controller,
    Consumer,
    Job,
    Middleware,
}

impl fmt::Display for CollaboratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Controller => "controller",
            Self::Consumer => "consumer",
            Self::Job => "job",
            Self::Middleware => "middleware",
        };
        f.write_str(name)
    }
}

/// 协作者句柄
///
/// 运行时不解释协作者的内容，只负责收集后交给外部的路由、消费和调度层
#[derive(Clone)]
pub struct CollaboratorHandle {
    pub kind: CollaboratorKind,
    pub name: String,
    /// 声明该协作者的模块名称，收集时填入
    pub module: String,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl CollaboratorHandle {
    pub fn new<P: Send + Sync + 'static>(kind: CollaboratorKind, name: impl Into<String>, payload: P) -> Self {
        Self {
            kind,
            name: name.into(),
            module: String::new(),
            payload: Arc::new(payload),
        }
    }

    /// 按具体类型访问负载
    pub fn downcast_ref<P: 'static>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }
}

impl fmt::Debug for CollaboratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaboratorHandle")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("module", &self.module)
            .finish()
    }
}

/// 中间件配置
#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    pub middleware: CollaboratorHandle,
    /// 适用的路由模式
    pub for_routes: Vec<String>,
    /// 排除的路由模式
    pub exclude: Vec<String>,
}

impl MiddlewareConfig {
    pub fn new<P: Send + Sync + 'static>(name: impl Into<String>, middleware: P) -> Self {
        Self {
            middleware: CollaboratorHandle::new(CollaboratorKind::Middleware, name, middleware),
            for_routes: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn for_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.for_routes.extend(routes.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(routes.into_iter().map(Into::into));
        self
    }
}

/// 前向引用
///
/// 用于声明尚未构造完成的模块导入，构成循环导入时必须在展开前绑定
#[derive(Clone, Default)]
pub struct ForwardRef {
    target: Arc<OnceCell<Weak<ModuleDescriptor>>>,
}

impl ForwardRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定目标模块，只能绑定一次，重复绑定返回 `false`
    pub fn bind(&self, module: &Arc<ModuleDescriptor>) -> bool {
        self.target.set(Arc::downgrade(module)).is_ok()
    }

    /// 获取目标模块
    pub fn get(&self) -> Option<Arc<ModuleDescriptor>> {
        self.target.get().and_then(Weak::upgrade)
    }

    pub fn is_bound(&self) -> bool {
        self.get().is_some()
    }
}

impl fmt::Debug for ForwardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(module) => write!(f, "ForwardRef({})", module.name),
            None => f.write_str("ForwardRef(<unbound>)"),
        }
    }
}

/// 模块引用
#[derive(Clone)]
pub enum ModuleRef {
    /// 直接引用
    Direct(Arc<ModuleDescriptor>),
    /// 延迟绑定的前向引用
    Forward(ForwardRef),
}

impl ModuleRef {
    /// 解析为具体模块，未绑定的前向引用返回 `UnresolvedImport`
    pub fn resolve(&self, importer: &str) -> ModuleResult<Arc<ModuleDescriptor>> {
        match self {
            Self::Direct(module) => Ok(module.clone()),
            Self::Forward(forward) => forward.get().ok_or_else(|| ModuleError::UnresolvedImport {
                module: importer.to_string(),
            }),
        }
    }
}

impl From<&Arc<ModuleDescriptor>> for ModuleRef {
    fn from(module: &Arc<ModuleDescriptor>) -> Self {
        Self::Direct(module.clone())
    }
}

impl From<ForwardRef> for ModuleRef {
    fn from(forward: ForwardRef) -> Self {
        Self::Forward(forward)
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(module) => write!(f, "Direct({})", module.name),
            Self::Forward(forward) => forward.fmt(f),
        }
    }
}

/// 模块描述符
pub struct ModuleDescriptor {
    pub id: ModuleId,
    pub name: String,
    pub providers: Vec<ProviderDescriptor>,
    pub imports: Vec<ModuleRef>,
    pub controllers: Vec<CollaboratorHandle>,
    pub consumers: Vec<CollaboratorHandle>,
    pub jobs: Vec<CollaboratorHandle>,
    pub middleware: Vec<MiddlewareConfig>,
    pub lifecycle: Option<Arc<dyn ModuleLifecycle>>,
}

impl ModuleDescriptor {
    /// 创建模块构建器
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder::new(name)
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("providers", &self.providers.len())
            .field("imports", &self.imports)
            .field("controllers", &self.controllers.len())
            .field("consumers", &self.consumers.len())
            .field("jobs", &self.jobs.len())
            .field("middleware", &self.middleware.len())
            .field("has_lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

/// 模块构建器
pub struct ModuleBuilder {
    name: String,
    providers: Vec<ProviderDescriptor>,
    imports: Vec<ModuleRef>,
    controllers: Vec<CollaboratorHandle>,
    consumers: Vec<CollaboratorHandle>,
    jobs: Vec<CollaboratorHandle>,
    middleware: Vec<MiddlewareConfig>,
    lifecycle: Option<Arc<dyn ModuleLifecycle>>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            imports: Vec::new(),
            controllers: Vec::new(),
            consumers: Vec::new(),
            jobs: Vec::new(),
            middleware: Vec::new(),
            lifecycle: None,
        }
    }

    /// 导入模块
    pub fn import(mut self, module: &Arc<ModuleDescriptor>) -> Self {
        self.imports.push(ModuleRef::from(module));
        self
    }

    /// 导入模块引用（包括前向引用）
    pub fn import_ref(mut self, module: impl Into<ModuleRef>) -> Self {
        self.imports.push(module.into());
        self
    }

    /// 声明提供者
    pub fn provider(mut self, descriptor: ProviderDescriptor) -> Self {
        self.providers.push(descriptor);
        self
    }

    pub fn controller<P: Send + Sync + 'static>(mut self, name: impl Into<String>, payload: P) -> Self {
        self.controllers
            .push(CollaboratorHandle::new(CollaboratorKind::Controller, name, payload));
        self
    }

    pub fn consumer<P: Send + Sync + 'static>(mut self, name: impl Into<String>, payload: P) -> Self {
        self.consumers
            .push(CollaboratorHandle::new(CollaboratorKind::Consumer, name, payload));
        self
    }

    pub fn job<P: Send + Sync + 'static>(mut self, name: impl Into<String>, payload: P) -> Self {
        self.jobs.push(CollaboratorHandle::new(CollaboratorKind::Job, name, payload));
        self
    }

    pub fn middleware(mut self, config: MiddlewareConfig) -> Self {
        self.middleware.push(config);
        self
    }

    /// 设置生命周期钩子
    pub fn lifecycle(mut self, lifecycle: impl ModuleLifecycle + 'static) -> Self {
        self.lifecycle = Some(Arc::new(lifecycle));
        self
    }

    /// 构建模块描述符，协作者会记录所属模块名称
    pub fn build(self) -> Arc<ModuleDescriptor> {
        let name = self.name;
        let tag = |mut handle: CollaboratorHandle| {
            handle.module = name.clone();
            handle
        };
        let controllers = self.controllers.into_iter().map(tag).collect();
        let consumers = self.consumers.into_iter().map(tag).collect();
        let jobs = self.jobs.into_iter().map(tag).collect();
        let middleware = self
            .middleware
            .into_iter()
            .map(|mut config| {
                config.middleware = tag(config.middleware);
                config
            })
            .collect();

        Arc::new(ModuleDescriptor {
            id: ModuleId::next(),
            name,
            providers: self.providers,
            imports: self.imports,
            controllers,
            consumers,
            jobs,
            middleware,
            lifecycle: self.lifecycle,
        })
    }
}
