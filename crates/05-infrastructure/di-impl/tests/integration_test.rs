//! 依赖注入实现的集成测试

use di_abstractions::{Dependencies, ProviderDescriptor, ProviderStrategy};
use di_impl::{current_context, Container, ResolverExt, UnitOfWorkScope, AMBIENT_CONTEXT};
use infrastructure_common::{AmbientContext, DependencyError, Token, TriggerKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// 测试服务
#[derive(Debug)]
struct TestService {
    name: String,
}

impl TestService {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn get_name(&self) -> &str {
        &self.name
    }
}

/// 依赖测试服务的仓储
#[derive(Debug)]
struct TestRepository {
    service: Arc<TestService>,
    locale: String,
}

#[tokio::test]
async fn test_value_registration_and_resolution() {
    let container = Container::new();
    let token: Token<TestService> = Token::new("TestService");

    assert_ok!(container.register(ProviderDescriptor::value(&token, TestService::new("test"))));
    assert!(container.is_registered(token.service_token()));

    let resolved = assert_ok!(container.resolve(&token).await);
    assert_eq!(resolved.get_name(), "test");
}

#[tokio::test]
async fn test_factory_registration() {
    let container = Container::new();
    let token: Token<TestService> = Token::new("TestService");

    container
        .register(ProviderDescriptor::factory(&token, Vec::new(), |_| async {
            Ok(TestService::new("factory_created"))
        }))
        .unwrap();

    let first = container.resolve(&token).await.unwrap();
    let second = container.resolve(&token).await.unwrap();
    assert_eq!(first.get_name(), "factory_created");

    // 单例行为：两次解析返回同一个实例
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_scoped_repository_reads_ambient_locale() {
    let root = Container::new();
    let service: Token<TestService> = Token::new("TestService");
    let repository: Token<TestRepository> = Token::new("TestRepository");

    root.register(ProviderDescriptor::value(&service, TestService::new("shared")))
        .unwrap();
    root.register(
        ProviderDescriptor::class(
            &repository,
            vec![
                service.service_token().clone(),
                AMBIENT_CONTEXT.service_token().clone(),
            ],
            |deps: &Dependencies| {
                let context = deps.at::<AmbientContext>(1)?;
                Ok(TestRepository {
                    service: deps.at(0)?,
                    locale: context.locale.clone(),
                })
            },
        )
        .scoped(),
    )
    .unwrap();

    let english = UnitOfWorkScope::open(&root, AmbientContext::new("en")).unwrap();
    let french = UnitOfWorkScope::open(&root, AmbientContext::new("fr")).unwrap();

    let en_repo = english.container().resolve(&repository).await.unwrap();
    let fr_repo = french.container().resolve(&repository).await.unwrap();

    assert_eq!(en_repo.locale, "en");
    assert_eq!(fr_repo.locale, "fr");
    assert!(Arc::ptr_eq(&en_repo.service, &fr_repo.service));
    assert!(!Arc::ptr_eq(&en_repo, &fr_repo));
}

#[tokio::test]
async fn test_interleaved_scopes_are_isolated() {
    let root = Container::new();
    let token: Token<usize> = Token::new("RequestId");
    let counter = Arc::new(AtomicUsize::new(0));
    let next = counter.clone();
    root.register(
        ProviderDescriptor::class(&token, Vec::new(), move |_| {
            Ok(next.fetch_add(1, Ordering::SeqCst))
        })
        .scoped(),
    )
    .unwrap();

    let scope_a = UnitOfWorkScope::open(&root, AmbientContext::new("en")).unwrap();
    let scope_b = UnitOfWorkScope::open(&root, AmbientContext::new("ja")).unwrap();

    let root_a = root.clone();
    let token_a = token.clone();
    let unit_a = scope_a.run_within(async move {
        tokio::task::yield_now().await;
        let locale_before = current_context().map(|context| context.locale.clone());
        let first = root_a.resolve(&token_a).await.unwrap();
        tokio::task::yield_now().await;
        let second = root_a.resolve(&token_a).await.unwrap();
        let locale_after = current_context().map(|context| context.locale.clone());
        (locale_before, locale_after, first, second)
    });

    let root_b = root.clone();
    let token_b = token.clone();
    let unit_b = scope_b.run_within(async move {
        let value = root_b.resolve(&token_b).await.unwrap();
        tokio::task::yield_now().await;
        let locale = current_context().map(|context| context.locale.clone());
        (locale, value)
    });

    let ((a_before, a_after, a_first, a_second), (b_locale, b_value)) = tokio::join!(unit_a, unit_b);

    assert_eq!(a_before.as_deref(), Some("en"));
    assert_eq!(a_after.as_deref(), Some("en"));
    assert_eq!(b_locale.as_deref(), Some("ja"));
    assert!(Arc::ptr_eq(&a_first, &a_second));
    assert_ne!(*a_first, *b_value);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resolution_errors() {
    let root = Container::new();
    let scoped: Token<u32> = Token::new("Scoped");
    let missing: Token<u32> = Token::new("Missing");
    root.register(ProviderDescriptor::value(&scoped, 1).scoped()).unwrap();

    let error = assert_err!(root.resolve(&scoped).await);
    assert!(matches!(error, DependencyError::ScopeRequired { .. }));

    let error = assert_err!(root.resolve(&missing).await);
    assert!(matches!(error, DependencyError::UnknownToken { .. }));

    let wrong_type: Token<String> = Token::new("WrongType");
    let erased = ProviderDescriptor::new(wrong_type.service_token().clone(), ProviderStrategy::value(5u8));
    root.register(erased).unwrap();
    let error = assert_err!(root.resolve(&wrong_type).await);
    assert!(matches!(error, DependencyError::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_ambient_context_is_scope_only() {
    let root = Container::new();
    let error = assert_err!(root.resolve(&AMBIENT_CONTEXT).await);
    assert!(matches!(error, DependencyError::UnknownToken { .. }));

    let scope = UnitOfWorkScope::open(
        &root,
        AmbientContext::new("en")
            .with_trigger(TriggerKind::HttpRequest)
            .with_metadata("request-id", "r-1"),
    )
    .unwrap();
    let context = scope.container().resolve(&AMBIENT_CONTEXT).await.unwrap();
    assert_eq!(context.metadata("request-id"), Some("r-1"));
}
