//! 应用配置选项

use crate::builder::LoggingConfig;
use infrastructure_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "COMPOSITION";

/// 应用配置选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationOptions {
    /// 应用名称
    pub name: String,
    /// 无法从触发源取得区域设置时使用的默认值
    pub default_locale: String,
    /// 携带区域设置的 HTTP 请求头
    pub locale_header: String,
    /// 携带区域设置的消息元数据键
    pub message_locale_key: String,
    /// 启动时是否检查提供者依赖图中的循环
    pub validate_provider_graph: bool,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            name: "composition-app".to_string(),
            default_locale: "en".to_string(),
            locale_header: "accept-language".to_string(),
            message_locale_key: "locale".to_string(),
            validate_provider_graph: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl ApplicationOptions {
    /// 从可选的 TOML 文件和 `COMPOSITION__*` 环境变量加载
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// 使用指定的环境变量前缀加载
    ///
    /// 优先级：环境变量 > 配置文件 > 默认值
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            info!("加载配置文件: {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let options: Self = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|error| ConfigError::ParseError {
                source: Box::new(error),
            })?;

        options.validate()?;
        debug!("应用配置: {:?}", options);
        Ok(options)
    }

    /// 校验配置
    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("name", &self.name),
            ("default_locale", &self.default_locale),
            ("locale_header", &self.locale_header),
            ("message_locale_key", &self.message_locale_key),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: format!("{field} 不能为空"),
                });
            }
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}
