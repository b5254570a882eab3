//! # 组合层
//!
//! 这个 crate 负责把模块图组合成一个可运行的应用：解析模块导入、
//! 把提供者展开到根容器、驱动模块生命周期，并为每个触发打开工作单元作用域。
//!
//! ## 主要功能
//!
//! - **模块注册表**: 导入图的循环检测、依赖优先的展开和初始化顺序
//! - **内置模块**: 应用配置、环境上下文和区域设置
//! - **应用构建器**: 配置加载、日志初始化和调度目标
//! - **应用编排**: `Unconfigured → Initializing → Ready → ShuttingDown → Closed`
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::{ModuleDescriptor, ProviderDescriptor};
//! use infrastructure_common::Token;
//! use infrastructure_composition::{Application, LoggingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let greeting: Token<String> = Token::new("Greeting");
//!     let root = ModuleDescriptor::builder("app")
//!         .provider(ProviderDescriptor::value(&greeting, "你好".to_string()))
//!         .build();
//!
//!     let app = Application::builder()
//!         .add_config_toml("config/app.toml")
//!         .with_logging(LoggingConfig::development())
//!         .build()?;
//!     app.configure(&root).await?;
//!
//!     let value = app.resolve(&greeting).await?;
//!     println!("{}", value);
//!
//!     app.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod bootstrapper;
pub mod builder;
pub mod builtin;
pub mod dispatch;
pub mod module_registry;
pub mod options;

// 重新导出主要类型
pub use application::{Application, ApplicationMetrics, ApplicationStatus};
pub use bootstrapper::ApplicationBootstrapper;
pub use builder::{initialize_logging, ApplicationBuilder, LoggingConfig};
pub use builtin::{builtin_modules, Locale, APPLICATION_OPTIONS, CORE_MODULE, LOCALE, LOCALE_MODULE};
pub use dispatch::{
    primary_language_tag, ConsumerDispatcher, HttpRequest, HttpResponse, MessageBatch, Router,
    ScheduleExecutor, TimerTick, Trigger,
};
pub use module_registry::{ModuleRegistry, ShutdownReport};
pub use options::{ApplicationOptions, DEFAULT_ENV_PREFIX};

// 重新导出错误类型
pub use infrastructure_common::{ApplicationError, ApplicationResult};
