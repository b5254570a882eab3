//! 跨 crate 的容器与作用域集成测试
use di_abstractions::{Dependencies, ProviderDescriptor, ProviderStrategy, ResolverExt};
use di_impl::{current_context, Container, UnitOfWorkScope};
use futures::future::join_all;
use infrastructure_common::{AmbientContext, DependencyError, Lifetime, Token};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// 测试服务
#[derive(Debug)]
struct Counter {
    serial: usize,
}

#[derive(Debug)]
struct Greeting(String);

fn counting_provider(token: &Token<Counter>, created: &Arc<AtomicUsize>) -> ProviderDescriptor {
    let created = created.clone();
    ProviderDescriptor::class(token, Vec::new(), move |_| {
        Ok(Counter {
            serial: created.fetch_add(1, Ordering::SeqCst),
        })
    })
}

#[tokio::test]
async fn test_singleton_shared_across_scopes() {
    let token = Token::<Counter>::new("Counter");
    let created = Arc::new(AtomicUsize::new(0));
    let root = Container::new();
    assert_ok!(root.register(counting_provider(&token, &created)));

    let first = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("en")));
    let second = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("fr")));
    let a = assert_ok!(first.container().resolve(&token).await);
    let b = assert_ok!(second.container().resolve(&token).await);
    let c = assert_ok!(root.resolve(&token).await);

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scoped_instance_per_scope() {
    let token = Token::<Counter>::new("Counter");
    let created = Arc::new(AtomicUsize::new(0));
    let root = Container::new();
    assert_ok!(root.register(counting_provider(&token, &created).scoped()));

    let first = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("en")));
    let second = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("en")));

    let a1 = assert_ok!(first.container().resolve(&token).await);
    let a2 = assert_ok!(first.container().resolve(&token).await);
    let b = assert_ok!(second.container().resolve(&token).await);

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_ne!(a1.serial, b.serial);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transient_instances_are_distinct() {
    let token = Token::<Counter>::new("Counter");
    let created = Arc::new(AtomicUsize::new(0));
    let root = Container::new();
    assert_ok!(root.register(counting_provider(&token, &created).transient()));

    let scope = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("en")));
    let a = assert_ok!(scope.container().resolve(&token).await);
    let b = assert_ok!(scope.container().resolve(&token).await);
    let c = assert_ok!(root.resolve(&token).await);

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(created.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_concurrent_singleton_created_once() {
    let token = Token::<Counter>::new("Counter");
    let created = Arc::new(AtomicUsize::new(0));
    let root = Container::new();
    let counter = created.clone();
    assert_ok!(root.register(ProviderDescriptor::factory(
        &token,
        Vec::new(),
        move |_| {
            let counter = counter.clone();
            async move {
                tokio::task::yield_now().await;
                Ok(Counter {
                    serial: counter.fetch_add(1, Ordering::SeqCst),
                })
            }
        },
    )));

    let results = join_all((0..8).map(|_| root.resolve(&token))).await;
    let instances: Vec<_> = results.into_iter().map(|result| result.unwrap()).collect();
    assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_interleaved_scopes_keep_their_context() {
    let greeting = Token::<Greeting>::new("Greeting");
    let root = Container::new();
    assert_ok!(root.register(
        ProviderDescriptor::factory(&greeting, Vec::new(), |_| async {
            tokio::task::yield_now().await;
            let context = current_context().ok_or_else(|| anyhow::anyhow!("没有活动作用域"))?;
            Ok(Greeting(format!("hello/{}", context.locale)))
        })
        .scoped(),
    ));

    let units = ["en", "fr", "de", "ja"].into_iter().map(|locale| {
        let root = root.clone();
        let greeting = greeting.clone();
        async move {
            let scope = UnitOfWorkScope::open(&root, AmbientContext::new(locale))?;
            scope
                .run_within(async move {
                    tokio::task::yield_now().await;
                    // 根容器在作用域内会转交给活动作用域
                    let resolved = root.resolve(&greeting).await?;
                    Ok::<_, DependencyError>((locale, resolved.0.clone()))
                })
                .await
        }
    });

    for result in join_all(units).await {
        let (locale, text) = assert_ok!(result);
        assert_eq!(text, format!("hello/{}", locale));
    }
}

#[tokio::test]
async fn test_scoped_requires_active_scope() {
    let token = Token::<Counter>::new("Counter");
    let root = Container::new();
    assert_ok!(root.register(counting_provider(&token, &Arc::new(AtomicUsize::new(0))).scoped()));

    let error = assert_err!(root.resolve(&token).await);
    assert!(matches!(error, DependencyError::ScopeRequired { .. }));
}

#[tokio::test]
async fn test_singleton_cannot_capture_scoped() {
    let scoped = Token::<Counter>::new("Counter");
    let holder = Token::<Greeting>::new("Holder");
    let root = Container::new();
    assert_ok!(root.register(counting_provider(&scoped, &Arc::new(AtomicUsize::new(0))).scoped()));
    assert_ok!(root.register(ProviderDescriptor::class(
        &holder,
        vec![scoped.service_token().clone()],
        |deps: &Dependencies| {
            let counter = deps.at::<Counter>(0)?;
            Ok(Greeting(counter.serial.to_string()))
        },
    )));

    let scope = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("en")));
    let error = assert_err!(scope.container().resolve(&holder).await);
    match error {
        DependencyError::LifetimeMismatch {
            lifetime,
            dependency_lifetime,
            ..
        } => {
            assert_eq!(lifetime, Lifetime::Singleton);
            assert_eq!(dependency_lifetime, Lifetime::Scoped);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_provider_cycle_detected() {
    let a = Token::<Counter>::new("A");
    let b = Token::<Counter>::new("B");
    let root = Container::new();
    assert_ok!(root.register(ProviderDescriptor::class(
        &a,
        vec![b.service_token().clone()],
        |deps: &Dependencies| deps.at::<Counter>(0).map(|inner| Counter { serial: inner.serial }).map_err(Into::into),
    )));
    assert_ok!(root.register(ProviderDescriptor::class(
        &b,
        vec![a.service_token().clone()],
        |deps: &Dependencies| deps.at::<Counter>(0).map(|inner| Counter { serial: inner.serial }).map_err(Into::into),
    )));

    assert!(matches!(
        root.validate(),
        Err(DependencyError::CircularDependency { .. })
    ));
    assert!(matches!(
        root.resolve(&a).await,
        Err(DependencyError::CircularDependency { .. })
    ));
}

#[tokio::test]
async fn test_conditional_provider_follows_scope_context() {
    let greeting = Token::<Greeting>::new("Greeting");
    let root = Container::new();
    assert_ok!(root.register(
        ProviderDescriptor::conditional(
            &greeting,
            |context: Option<&AmbientContext>| context.map_or(false, |context| context.locale == "fr"),
            ProviderStrategy::value(Greeting("bonjour".to_string())),
            Some(ProviderStrategy::value(Greeting("hello".to_string()))),
        )
        .scoped(),
    ));

    let french = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("fr")));
    let english = assert_ok!(UnitOfWorkScope::open(&root, AmbientContext::new("en")));
    assert_eq!(assert_ok!(french.container().resolve(&greeting).await).0, "bonjour");
    assert_eq!(assert_ok!(english.container().resolve(&greeting).await).0, "hello");
}

#[tokio::test]
async fn test_conditional_without_fallback_fails() {
    let greeting = Token::<Greeting>::new("Greeting");
    let root = Container::new();
    assert_ok!(root.register(ProviderDescriptor::conditional(
        &greeting,
        |_: Option<&AmbientContext>| false,
        ProviderStrategy::value(Greeting("never".to_string())),
        None,
    )));

    assert!(matches!(
        root.resolve(&greeting).await,
        Err(DependencyError::NoFallbackProvider { .. })
    ));
}

#[tokio::test]
async fn test_override_replaces_provider() {
    let greeting = Token::<Greeting>::new("Greeting");
    let root = Container::new();
    assert_ok!(root.register(ProviderDescriptor::value(&greeting, Greeting("old".to_string()))));
    assert_eq!(assert_ok!(root.resolve(&greeting).await).0, "old");

    assert!(matches!(
        root.register(ProviderDescriptor::value(&greeting, Greeting("dup".to_string()))),
        Err(DependencyError::DuplicateRegistration { .. })
    ));

    let previous = root.override_provider(ProviderDescriptor::value(&greeting, Greeting("new".to_string())));
    assert!(previous.is_some());
    assert_eq!(assert_ok!(root.resolve(&greeting).await).0, "new");
}
