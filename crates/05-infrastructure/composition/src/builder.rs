//! 应用构建器

use crate::application::Application;
use crate::dispatch::{ConsumerDispatcher, Router, ScheduleExecutor};
use crate::options::ApplicationOptions;
use infrastructure_common::{ApplicationError, ApplicationResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 应用构建器
///
/// 使用建造者模式收集配置和调度目标，构建出尚未配置的应用实例
pub struct ApplicationBuilder {
    /// 显式提供的配置
    options: Option<ApplicationOptions>,
    /// 配置文件路径
    config_file: Option<PathBuf>,
    /// 环境变量前缀
    env_prefix: Option<String>,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置覆盖
    logging_config: Option<LoggingConfig>,
    router: Option<Arc<dyn Router>>,
    consumer_dispatcher: Option<Arc<dyn ConsumerDispatcher>>,
    schedule_executor: Option<Arc<dyn ScheduleExecutor>>,
}

impl ApplicationBuilder {
    /// 创建新的应用构建器
    pub fn new() -> Self {
        Self {
            options: None,
            config_file: None,
            env_prefix: None,
            logging_enabled: false, // 默认不启用日志初始化
            logging_config: None,
            router: None,
            consumer_dispatcher: None,
            schedule_executor: None,
        }
    }

    /// 直接使用给定配置，不再读取文件和环境变量
    pub fn with_options(mut self, options: ApplicationOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// 添加 TOML 配置文件
    pub fn add_config_toml(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("添加 TOML 配置文件: {}", path.display());
        self.config_file = Some(path);
        self
    }

    /// 设置环境变量前缀
    pub fn add_config_env_vars(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        info!("添加环境变量配置源，前缀: {}", prefix);
        self.env_prefix = Some(prefix);
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self.logging_enabled = true;
        self
    }

    /// 按配置文件中的日志设置初始化日志
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn router(mut self, router: impl Router + 'static) -> Self {
        self.router = Some(Arc::new(router));
        self
    }

    pub fn consumer_dispatcher(mut self, dispatcher: impl ConsumerDispatcher + 'static) -> Self {
        self.consumer_dispatcher = Some(Arc::new(dispatcher));
        self
    }

    pub fn schedule_executor(mut self, executor: impl ScheduleExecutor + 'static) -> Self {
        self.schedule_executor = Some(Arc::new(executor));
        self
    }

    /// 构建应用实例
    pub fn build(self) -> ApplicationResult<Application> {
        let mut options = match self.options {
            Some(options) => {
                options.validate()?;
                options
            }
            None => ApplicationOptions::load_with_prefix(
                self.config_file.as_deref(),
                self.env_prefix
                    .as_deref()
                    .unwrap_or(crate::options::DEFAULT_ENV_PREFIX),
            )?,
        };

        if let Some(logging) = self.logging_config {
            options.logging = logging;
        }

        // 只有在明确配置了日志时才初始化日志，避免在测试环境中重复初始化
        if self.logging_enabled {
            initialize_logging(&options.logging)?;
        }

        info!("应用构建完成: {}", options.name);
        Ok(Application::new(
            options,
            self.router,
            self.consumer_dispatcher,
            self.schedule_executor,
        ))
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 初始化日志系统
///
/// 重复调用时保留第一次安装的订阅者，不会报错
pub fn initialize_logging(config: &LoggingConfig) -> ApplicationResult<()> {
    let filter = EnvFilter::try_new(&config.level).map_err(|error| ApplicationError::Config {
        source: ConfigError::ValidationError {
            message: format!("无效的日志级别 {}: {}", config.level, error),
        },
    })?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    let installed = if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    if installed.is_ok() {
        info!("日志系统初始化完成");
    }
    Ok(())
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志过滤指令，例如 `info` 或 `di_impl=debug,info`
    pub level: String,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}
