//! 两级依赖注入容器
//!
//! 根容器保存全部模块提供者和单例缓存，每个工作单元作用域持有一个子容器，
//! 子容器只缓存作用域实例，并可以用本地注册遮蔽父容器的令牌。

use crate::scope;
use async_trait::async_trait;
use dashmap::DashMap;
use di_abstractions::{
    CircularDependencyDetector, DefaultCircularDependencyDetector, Dependencies, Instance,
    ProviderDescriptor, ProviderRegistry, ProviderStrategy, ResolveContext, ServiceResolver,
};
use futures::future::{BoxFuture, FutureExt};
use infrastructure_common::{
    AmbientContext, DependencyError, DependencyResult, Lifetime, ScopeInfo, ServiceToken,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

type InstanceCell = Arc<OnceCell<Instance>>;

tokio::task_local! {
    /// 正在构造的提供者，工厂内部的嵌套解析沿用它的解析链
    static RESOLVE_FRAME: ResolveFrame;
}

#[derive(Clone)]
struct ResolveFrame {
    /// 执行构造的容器
    container: Container,
    token: ServiceToken,
    lifetime: Lifetime,
    context: ResolveContext,
}

/// 依赖注入容器
///
/// `Container` 是共享句柄，克隆开销很小，所有克隆指向同一个节点。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    /// 作用域信息，根容器为 `None`
    scope: Option<ScopeInfo>,
    /// 作用域的环境上下文
    ambient: Option<Arc<AmbientContext>>,
    parent: Option<Container>,
    registry: RwLock<HashMap<ServiceToken, Arc<ProviderDescriptor>>>,
    /// 每个令牌一个单元格，初始化进行中时其他解析者等待同一结果
    cache: DashMap<ServiceToken, InstanceCell>,
    closed: AtomicBool,
}

/// 容器统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    /// 本地注册的提供者数量
    pub registrations: usize,
    /// 本地已缓存的实例数量
    pub cached_instances: usize,
    /// 是否为作用域容器
    pub is_scope: bool,
}

impl Container {
    /// 创建根容器
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                scope: None,
                ambient: None,
                parent: None,
                registry: RwLock::new(HashMap::new()),
                cache: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// 创建作用域子容器，父容器总是根容器
    pub fn create_scope(&self, info: ScopeInfo, ambient: Option<Arc<AmbientContext>>) -> Self {
        debug!("创建作用域容器: {}", info);
        Self {
            inner: Arc::new(ContainerInner {
                scope: Some(info),
                ambient,
                parent: Some(self.root()),
                registry: RwLock::new(HashMap::new()),
                cache: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// 是否为根容器
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// 作用域信息
    pub fn scope_info(&self) -> Option<&ScopeInfo> {
        self.inner.scope.as_ref()
    }

    /// 作用域的环境上下文
    pub fn ambient_context(&self) -> Option<Arc<AmbientContext>> {
        self.inner.ambient.clone()
    }

    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    /// 获取根容器
    pub fn root(&self) -> Container {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current.clone()
    }

    /// 两个句柄是否指向同一个容器
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 注册提供者
    pub fn register(&self, descriptor: ProviderDescriptor) -> DependencyResult<()> {
        let mut registry = self.inner.registry.write();
        if registry.contains_key(&descriptor.token) {
            return Err(DependencyError::DuplicateRegistration {
                token: descriptor.token,
            });
        }
        debug!(
            "注册提供者: {} ({}, {})",
            descriptor.token,
            descriptor.strategy.kind(),
            descriptor.lifetime
        );
        registry.insert(descriptor.token.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// 覆盖本地注册并清除对应缓存，返回被替换的描述符
    pub fn override_provider(&self, descriptor: ProviderDescriptor) -> Option<Arc<ProviderDescriptor>> {
        let token = descriptor.token.clone();
        let previous = self
            .inner
            .registry
            .write()
            .insert(token.clone(), Arc::new(descriptor));
        self.inner.cache.remove(&token);
        debug!("覆盖提供者: {}", token);
        previous
    }

    /// 本地是否注册了令牌
    pub fn is_registered(&self, token: &ServiceToken) -> bool {
        self.inner.registry.read().contains_key(token)
    }

    /// 本地注册的全部描述符
    pub fn descriptors(&self) -> Vec<Arc<ProviderDescriptor>> {
        self.inner.registry.read().values().cloned().collect()
    }

    /// 本地注册的全部令牌
    pub fn registered_tokens(&self) -> Vec<ServiceToken> {
        self.inner.registry.read().keys().cloned().collect()
    }

    /// 沿父链查找令牌
    pub fn can_resolve(&self, token: &ServiceToken) -> bool {
        self.lookup(token).is_some()
    }

    /// 沿父链查找令牌的生命周期
    pub fn lifetime_of(&self, token: &ServiceToken) -> Option<Lifetime> {
        self.lookup(token).map(|(_, descriptor)| descriptor.lifetime)
    }

    /// 检查本地提供者依赖图中的循环
    pub fn validate(&self) -> DependencyResult<()> {
        let detector = DefaultCircularDependencyDetector;
        let graph = detector.build_dependency_graph(&self.descriptors());
        detector.detect_circular_dependencies(&graph)
    }

    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            registrations: self.inner.registry.read().len(),
            cached_instances: self
                .inner
                .cache
                .iter()
                .filter(|entry| entry.value().initialized())
                .count(),
            is_scope: self.inner.scope.is_some(),
        }
    }

    /// 丢弃本地缓存的全部实例
    pub fn release(&self) {
        let released = self.inner.cache.len();
        self.inner.cache.clear();
        match &self.inner.scope {
            Some(scope) => debug!("释放作用域容器 {}，丢弃 {} 个缓存实例", scope, released),
            None => info!("释放根容器，丢弃 {} 个单例", released),
        }
    }

    /// 关闭容器并释放缓存
    ///
    /// 关闭后从它（以及以它为根的作用域）发起的解析都返回 `ContainerClosed`。
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.release();
    }

    /// 容器或其根容器是否已关闭
    pub fn is_closed(&self) -> bool {
        let mut current = Some(self);
        while let Some(container) = current {
            if container.inner.closed.load(Ordering::SeqCst) {
                return true;
            }
            current = container.parent();
        }
        false
    }

    fn lookup(&self, token: &ServiceToken) -> Option<(Container, Arc<ProviderDescriptor>)> {
        let mut current = Some(self);
        while let Some(container) = current {
            let found = container.inner.registry.read().get(token).cloned();
            if let Some(descriptor) = found {
                return Some((container.clone(), descriptor));
            }
            current = container.parent();
        }
        None
    }

    /// 根容器在活动作用域内被调用时，转交给该作用域的子容器
    fn effective_container(&self) -> Container {
        if self.is_root() {
            if let Some(active) = scope::current_container() {
                if active.root().ptr_eq(self) {
                    return active;
                }
            }
        }
        self.clone()
    }

    fn resolve_with<'a>(
        &'a self,
        token: &'a ServiceToken,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, DependencyResult<Instance>> {
        async move {
            if self.is_closed() {
                return Err(DependencyError::ContainerClosed {
                    token: token.clone(),
                });
            }
            let (owner, descriptor) = self
                .lookup(token)
                .ok_or_else(|| DependencyError::UnknownToken {
                    token: token.clone(),
                })?;

            ctx.enter(token)?;
            let result = match descriptor.lifetime {
                // 单例缓存在注册它的容器中，依赖也从那里解析
                Lifetime::Singleton => owner.cached(&descriptor, ctx).await,
                Lifetime::Scoped => {
                    if self.inner.scope.is_none() {
                        Err(DependencyError::ScopeRequired {
                            token: token.clone(),
                        })
                    } else {
                        self.cached(&descriptor, ctx).await
                    }
                }
                Lifetime::Transient => {
                    self.instantiate(&descriptor, &descriptor.strategy, ctx).await
                }
            };
            ctx.leave();
            result
        }
        .boxed()
    }

    fn cached<'a>(
        &'a self,
        descriptor: &'a ProviderDescriptor,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, DependencyResult<Instance>> {
        async move {
            let cell: InstanceCell = self
                .inner
                .cache
                .entry(descriptor.token.clone())
                .or_insert_with(InstanceCell::default)
                .clone();

            if let Some(instance) = cell.get() {
                debug!("命中缓存: {}", descriptor.token);
                return Ok(instance.clone());
            }

            cell.get_or_try_init(move || self.instantiate(descriptor, &descriptor.strategy, ctx))
                .await
                .cloned()
        }
        .boxed()
    }

    fn instantiate<'a>(
        &'a self,
        descriptor: &'a ProviderDescriptor,
        strategy: &'a ProviderStrategy,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, DependencyResult<Instance>> {
        async move {
            match strategy {
                ProviderStrategy::Value(instance) => Ok(instance.clone()),
                ProviderStrategy::Class {
                    inject,
                    constructor,
                } => {
                    let dependencies = self.resolve_dependencies(descriptor, inject, ctx).await?;
                    (**constructor)(&dependencies)
                }
                ProviderStrategy::Factory { inject, factory } => {
                    let dependencies = self.resolve_dependencies(descriptor, inject, ctx).await?;
                    let frame = self.frame_for(descriptor, ctx);
                    RESOLVE_FRAME.scope(frame, factory.create(dependencies)).await
                }
                ProviderStrategy::Conditional {
                    predicate,
                    when_true,
                    fallback,
                } => {
                    let ambient = self.ambient_context();
                    if (**predicate)(ambient.as_deref()) {
                        self.instantiate(descriptor, when_true, ctx).await
                    } else if let Some(fallback) = fallback {
                        self.instantiate(descriptor, fallback, ctx).await
                    } else {
                        Err(DependencyError::NoFallbackProvider {
                            token: descriptor.token.clone(),
                        })
                    }
                }
            }
        }
        .boxed()
    }

    fn frame_for(&self, descriptor: &ProviderDescriptor, ctx: &ResolveContext) -> ResolveFrame {
        ResolveFrame {
            container: self.clone(),
            token: descriptor.token.clone(),
            lifetime: descriptor.lifetime,
            context: ctx.clone(),
        }
    }

    /// 构造过程中的嵌套解析
    ///
    /// 沿用外层的解析链，并在构造它的容器上按外层生命周期检查依赖。
    async fn resolve_nested(
        frame: ResolveFrame,
        token: &ServiceToken,
    ) -> DependencyResult<Instance> {
        let ResolveFrame {
            container,
            token: owner,
            lifetime,
            mut context,
        } = frame;
        if let Some(dependency_lifetime) = container.lifetime_of(token) {
            if !lifetime.can_depend_on(dependency_lifetime) {
                return Err(DependencyError::LifetimeMismatch {
                    token: owner,
                    lifetime,
                    dependency: token.clone(),
                    dependency_lifetime,
                });
            }
        }
        container.resolve_with(token, &mut context).await
    }

    /// 按声明顺序逐个解析依赖
    fn resolve_dependencies<'a>(
        &'a self,
        descriptor: &'a ProviderDescriptor,
        inject: &'a [ServiceToken],
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, DependencyResult<Dependencies>> {
        async move {
            let mut values = Vec::with_capacity(inject.len());
            for dependency in inject {
                if let Some(dependency_lifetime) = self.lifetime_of(dependency) {
                    if !descriptor.lifetime.can_depend_on(dependency_lifetime) {
                        return Err(DependencyError::LifetimeMismatch {
                            token: descriptor.token.clone(),
                            lifetime: descriptor.lifetime,
                            dependency: dependency.clone(),
                            dependency_lifetime,
                        });
                    }
                }
                values.push(self.resolve_with(dependency, ctx).await?);
            }
            Ok(Dependencies::new(
                descriptor.token.clone(),
                inject.to_vec(),
                values,
            ))
        }
        .boxed()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("scope", &self.inner.scope)
            .field("stats", &self.stats())
            .finish()
    }
}

#[async_trait]
impl ServiceResolver for Container {
    async fn resolve_instance(&self, token: &ServiceToken) -> DependencyResult<Instance> {
        if let Ok(frame) = RESOLVE_FRAME.try_with(Clone::clone) {
            if frame.container.root().ptr_eq(&self.root()) {
                return Self::resolve_nested(frame, token).await;
            }
        }
        let target = self.effective_container();
        let mut ctx = ResolveContext::new();
        target.resolve_with(token, &mut ctx).await
    }

    fn can_resolve(&self, token: &ServiceToken) -> bool {
        Container::can_resolve(self, token)
    }

    fn lifetime_of(&self, token: &ServiceToken) -> Option<Lifetime> {
        Container::lifetime_of(self, token)
    }
}

impl ProviderRegistry for Container {
    fn register(&self, descriptor: ProviderDescriptor) -> DependencyResult<()> {
        Container::register(self, descriptor)
    }

    fn override_provider(&self, descriptor: ProviderDescriptor) -> Option<Arc<ProviderDescriptor>> {
        Container::override_provider(self, descriptor)
    }

    fn is_registered(&self, token: &ServiceToken) -> bool {
        Container::is_registered(self, token)
    }

    fn descriptors(&self) -> Vec<Arc<ProviderDescriptor>> {
        Container::descriptors(self)
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if let Some(scope) = &self.scope {
            debug!("作用域容器已销毁: {} (存活 {} ms)", scope, scope.age().num_milliseconds());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::UnitOfWorkScope;
    use di_abstractions::ResolverExt;
    use infrastructure_common::Token;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(usize);

    fn counting_provider(token: &Token<Counter>, calls: Arc<AtomicUsize>) -> ProviderDescriptor {
        ProviderDescriptor::class(token, Vec::new(), move |_| {
            Ok(Counter(calls.fetch_add(1, Ordering::SeqCst)))
        })
    }

    fn scope_of(root: &Container) -> Container {
        root.create_scope(ScopeInfo::new("test"), None)
    }

    #[tokio::test]
    async fn singleton_is_created_once() {
        let root = Container::new();
        let token = Token::new("Counter");
        let calls = Arc::new(AtomicUsize::new(0));
        root.register(counting_provider(&token, calls.clone())).unwrap();

        let first = root.resolve(&token).await.unwrap();
        let second = scope_of(&root).resolve(&token).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let root = Container::new();
        let token: Token<u8> = Token::new("Byte");
        root.register(ProviderDescriptor::value(&token, 1)).unwrap();
        assert!(matches!(
            root.register(ProviderDescriptor::value(&token, 2)),
            Err(DependencyError::DuplicateRegistration { .. })
        ));
    }

    #[tokio::test]
    async fn override_replaces_and_evicts_cache() {
        let root = Container::new();
        let token: Token<u8> = Token::new("Byte");
        root.register(ProviderDescriptor::value(&token, 1)).unwrap();
        assert_eq!(*root.resolve(&token).await.unwrap(), 1);

        let previous = root.override_provider(ProviderDescriptor::value(&token, 2));
        assert!(previous.is_some());
        assert_eq!(*root.resolve(&token).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn scoped_requires_scope_and_is_cached_per_scope() {
        let root = Container::new();
        let token = Token::new("Counter");
        let calls = Arc::new(AtomicUsize::new(0));
        root.register(counting_provider(&token, calls).scoped()).unwrap();

        assert!(matches!(
            root.resolve(&token).await,
            Err(DependencyError::ScopeRequired { .. })
        ));

        let scope_a = scope_of(&root);
        let scope_b = scope_of(&root);
        let a1 = scope_a.resolve(&token).await.unwrap();
        let a2 = scope_a.resolve(&token).await.unwrap();
        let b1 = scope_b.resolve(&token).await.unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b1));
        assert_eq!(root.stats().cached_instances, 0);
    }

    #[tokio::test]
    async fn transient_is_new_every_time() {
        let root = Container::new();
        let token = Token::new("Counter");
        let calls = Arc::new(AtomicUsize::new(0));
        root.register(counting_provider(&token, calls.clone()).transient()).unwrap();

        let first = root.resolve(&token).await.unwrap();
        let second = root.resolve(&token).await.unwrap();
        assert_ne!(first.0, second.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dependencies_are_injected_in_declared_order() {
        let root = Container::new();
        let left: Token<String> = Token::new("Left");
        let right: Token<String> = Token::new("Right");
        let joined: Token<String> = Token::new("Joined");
        root.register(ProviderDescriptor::value(&left, "l".to_string())).unwrap();
        root.register(ProviderDescriptor::value(&right, "r".to_string())).unwrap();
        root.register(ProviderDescriptor::factory(
            &joined,
            vec![left.service_token().clone(), right.service_token().clone()],
            |deps: Dependencies| async move {
                let l = deps.at::<String>(0)?;
                let r = deps.at::<String>(1)?;
                Ok(format!("{l}{r}"))
            },
        ))
        .unwrap();

        assert_eq!(root.resolve(&joined).await.unwrap().as_str(), "lr");
    }

    #[tokio::test]
    async fn unknown_token_fails() {
        let root = Container::new();
        let token: Token<u8> = Token::new("Missing");
        assert!(matches!(
            root.resolve(&token).await,
            Err(DependencyError::UnknownToken { .. })
        ));
    }

    #[tokio::test]
    async fn singleton_cannot_depend_on_scoped() {
        let root = Container::new();
        let scoped: Token<u8> = Token::new("Scoped");
        let singleton: Token<u8> = Token::new("Singleton");
        root.register(ProviderDescriptor::value(&scoped, 1).scoped()).unwrap();
        root.register(ProviderDescriptor::class(
            &singleton,
            vec![scoped.service_token().clone()],
            |deps| Ok(*deps.at::<u8>(0)?),
        ))
        .unwrap();

        assert!(matches!(
            scope_of(&root).resolve(&singleton).await,
            Err(DependencyError::LifetimeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn resolution_cycle_is_reported() {
        let root = Container::new();
        let a: Token<u8> = Token::new("A");
        let b: Token<u8> = Token::new("B");
        root.register(ProviderDescriptor::class(&a, vec![b.service_token().clone()], |_| Ok(1u8)))
            .unwrap();
        root.register(ProviderDescriptor::class(&b, vec![a.service_token().clone()], |_| Ok(2u8)))
            .unwrap();

        assert!(root.validate().is_err());
        match root.resolve(&a).await {
            Err(DependencyError::CircularDependency { chain }) => {
                assert_eq!(chain.first(), chain.last());
                assert_eq!(chain.len(), 3);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn conditional_without_fallback_fails() {
        let root = Container::new();
        let token: Token<u8> = Token::new("Feature");
        root.register(ProviderDescriptor::conditional(
            &token,
            |ambient| ambient.is_some(),
            ProviderStrategy::value(1u8),
            None,
        ))
        .unwrap();

        assert!(matches!(
            root.resolve(&token).await,
            Err(DependencyError::NoFallbackProvider { .. })
        ));
    }

    #[tokio::test]
    async fn conditional_uses_scope_ambient_context() {
        let root = Container::new();
        let token: Token<&'static str> = Token::new("Greeting");
        root.register(
            ProviderDescriptor::conditional(
                &token,
                |ambient| ambient.map(|context| context.locale == "fr").unwrap_or(false),
                ProviderStrategy::value("bonjour"),
                Some(ProviderStrategy::value("hello")),
            )
            .scoped(),
        )
        .unwrap();

        let french = root.create_scope(ScopeInfo::new("fr"), Some(Arc::new(AmbientContext::new("fr"))));
        let english = root.create_scope(ScopeInfo::new("en"), Some(Arc::new(AmbientContext::new("en"))));
        assert_eq!(*french.resolve(&token).await.unwrap(), "bonjour");
        assert_eq!(*english.resolve(&token).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn child_override_shadows_parent_without_mutating_it() {
        let root = Container::new();
        let token: Token<u8> = Token::new("Value");
        root.register(ProviderDescriptor::value(&token, 1)).unwrap();
        let child = scope_of(&root);
        child.register(ProviderDescriptor::value(&token, 2)).unwrap();

        assert_eq!(*child.resolve(&token).await.unwrap(), 2);
        assert_eq!(*root.resolve(&token).await.unwrap(), 1);
        assert_eq!(root.stats().registrations, 1);
        assert_eq!(child.stats().registrations, 1);
    }

    #[tokio::test]
    async fn concurrent_singleton_resolution_shares_one_instance() {
        let root = Container::new();
        let token: Token<Counter> = Token::new("Slow");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        root.register(ProviderDescriptor::factory(&token, Vec::new(), move |_| {
            let counter = counter.clone();
            async move {
                tokio::task::yield_now().await;
                Ok(Counter(counter.fetch_add(1, Ordering::SeqCst)))
            }
        }))
        .unwrap();

        let (a, b) = tokio::join!(root.resolve(&token), root.resolve(&token));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_drops_cached_instances() {
        let root = Container::new();
        let token = Token::new("Counter");
        let calls = Arc::new(AtomicUsize::new(0));
        root.register(counting_provider(&token, calls).scoped()).unwrap();
        let scope = scope_of(&root);
        scope.resolve(&token).await.unwrap();
        assert_eq!(scope.stats().cached_instances, 1);
        scope.release();
        assert_eq!(scope.stats().cached_instances, 0);
    }

    fn locale_providers(root: &Container, scoped: &Token<String>, single: &Token<String>) {
        root.register(
            ProviderDescriptor::factory(scoped, Vec::new(), |_| async {
                let context = crate::scope::current_context().ok_or_else(|| {
                    DependencyError::ScopeRequired {
                        token: ServiceToken::new("AmbientContext"),
                    }
                })?;
                Ok(context.locale.clone())
            })
            .scoped(),
        )
        .unwrap();

        let captured = root.clone();
        let scoped = scoped.clone();
        root.register(ProviderDescriptor::factory(single, Vec::new(), move |_| {
            let root = captured.clone();
            let scoped = scoped.clone();
            async move { Ok(format!("cached:{}", root.resolve(&scoped).await?)) }
        }))
        .unwrap();
    }

    #[tokio::test]
    async fn singleton_factory_cannot_capture_scoped_through_container() {
        let root = Container::new();
        let scoped: Token<String> = Token::new("ScopedLocale");
        let single: Token<String> = Token::new("SingleLocale");
        locale_providers(&root, &scoped, &single);

        for locale in ["fr", "en"] {
            let unit = UnitOfWorkScope::open(&root, AmbientContext::new(locale)).unwrap();
            let (own, cached) = unit
                .run_within(async {
                    (root.resolve(&scoped).await, root.resolve(&single).await)
                })
                .await;
            assert_eq!(own.unwrap().as_str(), locale);
            match cached {
                Err(DependencyError::LifetimeMismatch {
                    lifetime,
                    dependency,
                    dependency_lifetime,
                    ..
                }) => {
                    assert_eq!(lifetime, Lifetime::Singleton);
                    assert_eq!(&dependency, scoped.service_token());
                    assert_eq!(dependency_lifetime, Lifetime::Scoped);
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
        assert_eq!(root.stats().cached_instances, 0);
    }

    #[tokio::test]
    async fn scoped_factory_resolves_through_its_own_scope() {
        let root = Container::new();
        let scoped: Token<String> = Token::new("ScopedLocale");
        let greeting: Token<String> = Token::new("Greeting");
        locale_providers(&root, &scoped, &Token::new("Unused"));

        let captured = root.clone();
        let inner = scoped.clone();
        root.register(
            ProviderDescriptor::factory(&greeting, Vec::new(), move |_| {
                let root = captured.clone();
                let inner = inner.clone();
                async move { Ok(format!("hello/{}", root.resolve(&inner).await?)) }
            })
            .scoped(),
        )
        .unwrap();

        let unit = UnitOfWorkScope::open(&root, AmbientContext::new("de")).unwrap();
        let text = unit.run_within(async { root.resolve(&greeting).await }).await;
        assert_eq!(text.unwrap().as_str(), "hello/de");
    }

    #[tokio::test]
    async fn nested_container_cycle_fails_instead_of_waiting() {
        let root = Container::new();
        let a: Token<u8> = Token::new("A");
        let b: Token<u8> = Token::new("B");
        for (token, target) in [(a.clone(), b.clone()), (b.clone(), a.clone())] {
            let captured = root.clone();
            root.register(ProviderDescriptor::factory(&token, Vec::new(), move |_| {
                let root = captured.clone();
                let target = target.clone();
                async move { Ok(*root.resolve(&target).await?) }
            }))
            .unwrap();
        }

        // 声明的依赖图里没有这条环
        assert!(root.validate().is_ok());
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), root.resolve(&a))
            .await
            .expect("循环解析不应挂起");
        match result {
            Err(DependencyError::CircularDependency { chain }) => {
                assert_eq!(
                    chain,
                    vec![
                        a.service_token().clone(),
                        b.service_token().clone(),
                        a.service_token().clone(),
                    ]
                );
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        // 失败的构造不会留下进行中的单元格
        let retry = tokio::time::timeout(std::time::Duration::from_secs(2), root.resolve(&b)).await;
        assert!(matches!(retry, Ok(Err(DependencyError::CircularDependency { .. }))));
    }

    #[tokio::test]
    async fn closed_container_rejects_resolution() {
        let root = Container::new();
        let token: Token<u8> = Token::new("Byte");
        root.register(ProviderDescriptor::value(&token, 1)).unwrap();
        let scope = scope_of(&root);
        assert_eq!(*scope.resolve(&token).await.unwrap(), 1);

        root.close();
        assert!(root.is_closed());
        assert!(scope.is_closed());
        assert!(matches!(
            root.resolve(&token).await,
            Err(DependencyError::ContainerClosed { .. })
        ));
        assert!(matches!(
            scope.resolve(&token).await,
            Err(DependencyError::ContainerClosed { .. })
        ));
    }
}
