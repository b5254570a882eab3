//! # 示例应用程序
//!
//! 组合 `Catalog` 与 `Greeting` 两个模块，并发处理若干 HTTP 请求、
//! 一个消息批次和一次定时触发，演示每个工作单元拥有独立的区域设置。

use async_trait::async_trait;
use clap::Parser;
use di_abstractions::{
    CollaboratorHandle, Dependencies, MiddlewareConfig, ModuleDescriptor, ModuleLifecycle,
    ProviderDescriptor, ResolverExt, ServiceResolver,
};
use di_impl::{current_context, Container};
use futures::future::join_all;
use infrastructure_common::Token;
use infrastructure_composition::{
    Application, ApplicationOptions, ConsumerDispatcher, HttpRequest, HttpResponse, Locale,
    LoggingConfig, MessageBatch, Router, ScheduleExecutor, TimerTick, LOCALE,
};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "模块组合运行时示例应用")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/app.toml")]
    config: PathBuf,

    /// 覆盖默认区域设置
    #[arg(long)]
    locale: Option<String>,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 并发请求数量
    #[arg(long, default_value_t = 4)]
    requests: usize,
}

/// 按区域设置索引的问候语目录（单例）
#[derive(Debug)]
struct Catalog {
    greetings: HashMap<&'static str, &'static str>,
}

impl Catalog {
    fn new() -> Self {
        let greetings = HashMap::from([
            ("en", "Hello"),
            ("fr", "Bonjour"),
            ("de", "Hallo"),
            ("zh", "你好"),
        ]);
        Self { greetings }
    }

    fn greeting_for(&self, locale: &Locale) -> &'static str {
        let language = locale.as_str().split('-').next().unwrap_or_default();
        self.greetings.get(language).copied().unwrap_or("Hello")
    }
}

/// 当前工作单元的问候服务（作用域）
#[derive(Debug)]
struct Greeter {
    locale: Arc<Locale>,
    catalog: Arc<Catalog>,
}

impl Greeter {
    fn greet(&self, name: &str) -> String {
        format!("{}, {} [{}]", self.catalog.greeting_for(&self.locale), name, self.locale)
    }
}

static CATALOG: Lazy<Token<Catalog>> = Lazy::new(|| Token::new("Catalog"));
static GREETER: Lazy<Token<Greeter>> = Lazy::new(|| Token::new("Greeter"));

/// 问候模块的生命周期
struct GreetingLifecycle;

#[async_trait]
impl ModuleLifecycle for GreetingLifecycle {
    async fn on_initialize(&self, resolver: &dyn ServiceResolver) -> anyhow::Result<()> {
        let catalog = resolver.resolve(&CATALOG).await?;
        info!("问候模块初始化，支持 {} 种语言", catalog.greetings.len());
        Ok(())
    }

    async fn on_shutdown(&self, _resolver: &dyn ServiceResolver) -> anyhow::Result<()> {
        info!("问候模块关闭");
        Ok(())
    }
}

fn catalog_module() -> Arc<ModuleDescriptor> {
    ModuleDescriptor::builder("Catalog")
        .provider(ProviderDescriptor::class(&CATALOG, Vec::new(), |_| Ok(Catalog::new())))
        .build()
}

fn greeting_module(catalog: &Arc<ModuleDescriptor>) -> Arc<ModuleDescriptor> {
    ModuleDescriptor::builder("Greeting")
        .import(catalog)
        .provider(
            ProviderDescriptor::class(
                &GREETER,
                vec![LOCALE.service_token().clone(), CATALOG.service_token().clone()],
                |deps: &Dependencies| {
                    Ok(Greeter {
                        locale: deps.get(&LOCALE)?,
                        catalog: deps.get(&CATALOG)?,
                    })
                },
            )
            .scoped(),
        )
        .controller("GreetingController", "/greet")
        .middleware(MiddlewareConfig::new("RequestLogger", ()).for_routes(["/greet"]))
        .consumer("GreetingEvents", "greetings")
        .job("DailyDigest", "daily-digest")
        .lifecycle(GreetingLifecycle)
        .build()
}

/// 示例路由：按请求的区域设置返回问候语
#[derive(Default)]
struct GreetingRouter;

#[async_trait]
impl Router for GreetingRouter {
    fn mount(&self, controllers: &[CollaboratorHandle], middleware: &[MiddlewareConfig]) {
        for controller in controllers {
            info!("挂载控制器: {} ({})", controller.name, controller.module);
        }
        for config in middleware {
            info!("挂载中间件: {} -> {:?}", config.middleware.name, config.for_routes);
        }
    }

    async fn dispatch(&self, request: HttpRequest, container: Container) -> anyhow::Result<HttpResponse> {
        let greeter = container.resolve(&GREETER).await?;
        let name = request.path.trim_start_matches("/greet/");
        Ok(HttpResponse::ok(greeter.greet(name)))
    }
}

/// 示例消费者调度：统计处理过的消息
#[derive(Default)]
struct GreetingConsumers {
    processed: AtomicUsize,
}

#[async_trait]
impl ConsumerDispatcher for GreetingConsumers {
    fn register(&self, consumers: &[CollaboratorHandle]) {
        for consumer in consumers {
            info!("注册消费者: {}", consumer.name);
        }
    }

    async fn process(&self, batch: MessageBatch, container: Container) -> anyhow::Result<()> {
        let greeter = container.resolve(&GREETER).await?;
        for message in &batch.messages {
            let name = message.get("name").and_then(|name| name.as_str()).unwrap_or("匿名");
            info!("{}: {}", batch.queue, greeter.greet(name));
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// 示例任务执行器
#[derive(Default)]
struct DigestScheduler;

#[async_trait]
impl ScheduleExecutor for DigestScheduler {
    fn register(&self, jobs: &[CollaboratorHandle]) {
        for job in jobs {
            info!("注册定时任务: {}", job.name);
        }
    }

    async fn execute(&self, tick: TimerTick, container: Container) -> anyhow::Result<()> {
        let greeter = container.resolve(&GREETER).await?;
        let trigger = current_context().map(|context| context.trigger.to_string());
        info!(
            "执行定时任务 {} ({:?}): {}",
            tick.job,
            trigger,
            greeter.greet("digest")
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let app = build_application(&args)?;
    info!("启动示例应用");

    let catalog = catalog_module();
    let root = greeting_module(&catalog);
    app.configure(&root).await?;
    info!("已加载模块: {:?}", app.module_names().await);

    handle_requests(&app, args.requests).await;

    let batch = MessageBatch::new("greetings")
        .with_metadata("locale", "de")
        .with_message(serde_json::json!({ "name": "Ada" }))
        .with_message(serde_json::json!({ "name": "Grace" }));
    app.handle_messages(batch).await?;

    app.handle_tick(TimerTick::new("daily-digest")).await?;

    let metrics = app.metrics();
    info!(
        "已处理 {} 个工作单元，失败 {} 个",
        metrics.units_of_work, metrics.failed_units
    );

    app.shutdown().await?;
    info!("应用已关闭");
    Ok(())
}

/// 构建应用
fn build_application(args: &Args) -> anyhow::Result<Application> {
    let config_file = if args.config.exists() {
        Some(args.config.as_path())
    } else {
        info!("配置文件不存在，将使用默认配置和环境变量");
        None
    };

    let mut options = ApplicationOptions::load(config_file)?;
    if let Some(locale) = &args.locale {
        options = options.with_default_locale(locale.clone());
    }

    let app = Application::builder()
        .with_options(options)
        .with_logging(LoggingConfig::development().with_level(args.log_level.clone()))
        .router(GreetingRouter)
        .consumer_dispatcher(GreetingConsumers::default())
        .schedule_executor(DigestScheduler)
        .build()?;
    Ok(app)
}

/// 并发处理请求，每个请求带不同的区域设置
async fn handle_requests(app: &Application, count: usize) {
    const LOCALES: [&str; 4] = ["en-US", "fr-FR", "de", "zh-CN"];

    let requests = (0..count).map(|index| {
        let request = HttpRequest::new("GET", format!("/greet/user-{}", index))
            .with_header("accept-language", LOCALES[index % LOCALES.len()])
            .with_header("request-id", format!("req-{}", index));
        app.handle_request(request)
    });

    for (index, response) in join_all(requests).await.into_iter().enumerate() {
        match response {
            Ok(response) => info!("请求 {} -> {} {}", index, response.status, response.text()),
            Err(e) => warn!("请求 {} 失败: {}", index, e),
        }
    }
}
