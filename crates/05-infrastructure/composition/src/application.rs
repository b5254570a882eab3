//! 应用主入口

use crate::bootstrapper::ApplicationBootstrapper;
use crate::builder::ApplicationBuilder;
use crate::dispatch::{
    ConsumerDispatcher, HttpRequest, HttpResponse, MessageBatch, Router, ScheduleExecutor, TimerTick,
    Trigger,
};
use crate::module_registry::{ModuleRegistry, ShutdownReport};
use crate::options::ApplicationOptions;
use di_abstractions::{CollaboratorHandle, MiddlewareConfig, ModuleDescriptor, ResolverExt};
use di_impl::{Container, UnitOfWorkScope};
use infrastructure_common::{AmbientContext, ApplicationError, ApplicationResult, Token};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// 组合应用
///
/// 持有根容器和模块注册表，为每个触发打开工作单元作用域并调度到对应的目标
pub struct Application {
    /// 应用配置
    options: ApplicationOptions,
    /// 根容器
    root: Container,
    /// 模块注册表
    registry: tokio::sync::Mutex<ModuleRegistry>,
    /// 运行状态
    status: RwLock<ApplicationStatus>,
    /// 统计信息
    metrics: Mutex<ApplicationMetrics>,
    /// 正在执行的工作单元
    in_flight: AtomicUsize,
    drained: Notify,
    router: Option<Arc<dyn Router>>,
    consumer_dispatcher: Option<Arc<dyn ConsumerDispatcher>>,
    schedule_executor: Option<Arc<dyn ScheduleExecutor>>,
}

impl Application {
    /// 创建应用构建器
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// 内部构造函数
    pub(crate) fn new(
        options: ApplicationOptions,
        router: Option<Arc<dyn Router>>,
        consumer_dispatcher: Option<Arc<dyn ConsumerDispatcher>>,
        schedule_executor: Option<Arc<dyn ScheduleExecutor>>,
    ) -> Self {
        Self {
            options,
            root: Container::new(),
            registry: tokio::sync::Mutex::new(ModuleRegistry::new()),
            status: RwLock::new(ApplicationStatus::Unconfigured),
            metrics: Mutex::new(ApplicationMetrics::default()),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
            router,
            consumer_dispatcher,
            schedule_executor,
        }
    }

    /// 以根模块配置应用，只能调用一次
    pub async fn configure(&self, root_module: &Arc<ModuleDescriptor>) -> ApplicationResult<()> {
        {
            let mut status = self.status.write();
            if *status != ApplicationStatus::Unconfigured {
                return Err(ApplicationError::AlreadyConfigured);
            }
            *status = ApplicationStatus::Initializing;
        }

        let mut registry = self.registry.lock().await;
        let bootstrapper = ApplicationBootstrapper::new(self.options.clone(), self.root.clone());
        if let Err(boot_error) = bootstrapper.bootstrap(&mut registry, root_module).await {
            error!("应用启动失败: {}", boot_error);
            *self.status.write() = ApplicationStatus::Failed;
            return Err(boot_error.into());
        }

        self.wire_collaborators(
            &registry.controllers(),
            &registry.middleware_configs(),
            &registry.consumers(),
            &registry.jobs(),
        );

        {
            let mut metrics = self.metrics.lock();
            metrics.started_at = Some(chrono::Utc::now());
            metrics.module_count = registry.modules().len();
            metrics.provider_count = self.root.stats().registrations;
        }
        *self.status.write() = ApplicationStatus::Ready;
        info!("应用已就绪: {}", self.options.name);
        Ok(())
    }

    /// 把收集到的协作者交给各个调度目标
    fn wire_collaborators(
        &self,
        controllers: &[CollaboratorHandle],
        middleware: &[MiddlewareConfig],
        consumers: &[CollaboratorHandle],
        jobs: &[CollaboratorHandle],
    ) {
        match &self.router {
            Some(router) => {
                router.mount(controllers, middleware);
                info!("路由挂载 {} 个控制器，{} 个中间件", controllers.len(), middleware.len());
            }
            None if !controllers.is_empty() => {
                warn!("声明了 {} 个控制器但没有配置路由", controllers.len());
            }
            None => {}
        }

        match &self.consumer_dispatcher {
            Some(dispatcher) => {
                dispatcher.register(consumers);
                info!("注册 {} 个消息消费者", consumers.len());
            }
            None if !consumers.is_empty() => {
                warn!("声明了 {} 个消费者但没有配置消息调度", consumers.len());
            }
            None => {}
        }

        match &self.schedule_executor {
            Some(executor) => {
                executor.register(jobs);
                info!("注册 {} 个定时任务", jobs.len());
            }
            None if !jobs.is_empty() => {
                warn!("声明了 {} 个定时任务但没有配置任务执行器", jobs.len());
            }
            None => {}
        }
    }

    /// 处理 HTTP 请求
    pub async fn handle_request(&self, request: HttpRequest) -> ApplicationResult<HttpResponse> {
        self.ensure_ready()?;
        let router = self
            .router
            .clone()
            .ok_or(ApplicationError::DispatchTargetMissing { target: "router" })?;
        self.dispatch(request, move |request, container| async move {
            router.dispatch(request, container).await
        })
        .await
    }

    /// 处理消息批次
    pub async fn handle_messages(&self, batch: MessageBatch) -> ApplicationResult<()> {
        self.ensure_ready()?;
        let dispatcher = self
            .consumer_dispatcher
            .clone()
            .ok_or(ApplicationError::DispatchTargetMissing {
                target: "consumer dispatcher",
            })?;
        self.dispatch(batch, move |batch, container| async move {
            dispatcher.process(batch, container).await
        })
        .await
    }

    /// 处理定时触发
    pub async fn handle_tick(&self, tick: TimerTick) -> ApplicationResult<()> {
        self.ensure_ready()?;
        let executor = self
            .schedule_executor
            .clone()
            .ok_or(ApplicationError::DispatchTargetMissing {
                target: "schedule executor",
            })?;
        self.dispatch(tick, move |tick, container| async move {
            executor.execute(tick, container).await
        })
        .await
    }

    /// 打开作用域并在其中执行调度
    async fn dispatch<T, R, F, Fut>(&self, trigger: T, target: F) -> ApplicationResult<R>
    where
        T: Trigger,
        F: FnOnce(T, Container) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let _unit = self.begin_unit()?;
        let kind = trigger.kind();
        let scope = self.open_scope(trigger.ambient_context(&self.options))?;
        let span = info_span!(
            "unit_of_work",
            scope_id = %scope.info().id,
            trigger = %kind,
            locale = %scope.context().locale,
        );
        let container = scope.container().clone();

        let result = scope
            .run_within(target(trigger, container))
            .instrument(span)
            .await;

        let mut metrics = self.metrics.lock();
        metrics.units_of_work += 1;
        match result {
            Ok(output) => Ok(output),
            Err(source) => {
                metrics.failed_units += 1;
                warn!("调度失败 ({}): {:#}", kind, source);
                Err(ApplicationError::Dispatch {
                    trigger: kind,
                    source: source.into(),
                })
            }
        }
    }

    /// 登记一个工作单元，关闭开始后不再接受新的工作单元
    fn begin_unit(&self) -> ApplicationResult<UnitGuard<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = UnitGuard { app: self };
        self.ensure_ready()?;
        Ok(guard)
    }

    /// 等待所有进行中的工作单元结束
    async fn drain_units(&self) {
        loop {
            let drained = self.drained.notified();
            let remaining = self.in_flight.load(Ordering::SeqCst);
            if remaining == 0 {
                return;
            }
            debug!("等待 {} 个工作单元结束", remaining);
            drained.await;
        }
    }

    /// 手动打开工作单元作用域
    pub fn open_scope(&self, context: AmbientContext) -> ApplicationResult<UnitOfWorkScope> {
        self.ensure_ready()?;
        Ok(UnitOfWorkScope::open(&self.root, context)?)
    }

    /// 从根容器解析服务（在活动作用域内会转交给该作用域）
    pub async fn resolve<T: Send + Sync + 'static>(&self, token: &Token<T>) -> ApplicationResult<Arc<T>> {
        self.ensure_ready()?;
        Ok(self.root.resolve(token).await?)
    }

    /// 关闭应用
    ///
    /// 先等待进行中的工作单元结束，再按逆序关闭全部模块并关闭根容器；
    /// 存在失败时返回 `ShutdownFailed`
    pub async fn shutdown(&self) -> ApplicationResult<ShutdownReport> {
        {
            let mut status = self.status.write();
            match *status {
                ApplicationStatus::Ready | ApplicationStatus::Failed => {
                    *status = ApplicationStatus::ShuttingDown;
                }
                other => {
                    return Err(ApplicationError::NotConfigured {
                        state: other.to_string(),
                    });
                }
            }
        }
        info!("开始关闭应用: {}", self.options.name);

        self.drain_units().await;
        let report = self.registry.lock().await.shutdown_all(&self.root).await;
        self.root.close();

        *self.status.write() = ApplicationStatus::Closed;
        self.metrics.lock().stopped_at = Some(chrono::Utc::now());
        info!("应用已关闭: {}", self.options.name);

        if report.is_clean() {
            Ok(report)
        } else {
            Err(ApplicationError::ShutdownFailed {
                failures: report.failures,
            })
        }
    }

    fn ensure_ready(&self) -> ApplicationResult<()> {
        let status = *self.status.read();
        if status == ApplicationStatus::Ready {
            Ok(())
        } else {
            Err(ApplicationError::NotConfigured {
                state: status.to_string(),
            })
        }
    }

    /// 获取运行状态
    pub fn status(&self) -> ApplicationStatus {
        *self.status.read()
    }

    /// 获取统计信息
    pub fn metrics(&self) -> ApplicationMetrics {
        self.metrics.lock().clone()
    }

    /// 获取应用配置
    pub fn options(&self) -> &ApplicationOptions {
        &self.options
    }

    /// 获取根容器
    pub fn container(&self) -> &Container {
        &self.root
    }

    /// 按注册顺序列出模块名称
    pub async fn module_names(&self) -> Vec<String> {
        self.registry.lock().await.module_names()
    }
}

struct UnitGuard<'a> {
    app: &'a Application,
}

impl Drop for UnitGuard<'_> {
    fn drop(&mut self) {
        if self.app.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.app.drained.notify_waiters();
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.options.name)
            .field("status", &self.status())
            .field("root", &self.root)
            .finish()
    }
}

/// 应用运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// 未配置
    Unconfigured,
    /// 初始化中
    Initializing,
    /// 就绪
    Ready,
    /// 关闭中
    ShuttingDown,
    /// 已关闭
    Closed,
    /// 启动失败
    Failed,
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 应用统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationMetrics {
    /// 就绪时间
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// 关闭时间
    pub stopped_at: Option<chrono::DateTime<chrono::Utc>>,
    /// 已注册模块数量
    pub module_count: usize,
    /// 根容器中的提供者数量
    pub provider_count: usize,
    /// 已处理的工作单元数量
    pub units_of_work: u64,
    /// 失败的工作单元数量
    pub failed_units: u64,
}

impl ApplicationMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}
