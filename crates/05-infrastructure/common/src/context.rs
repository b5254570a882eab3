//! 工作单元的环境上下文
//!
//! 每个请求、消息批次或定时触发都携带一份环境上下文（区域设置、请求元数据），
//! 在对应的工作单元作用域内对所有代码可见。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 触发工作单元的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// 入站 HTTP 请求
    HttpRequest,
    /// 队列消息批次
    MessageBatch,
    /// 定时任务触发
    TimerTick,
    /// 手动打开的作用域（测试、脚本等）
    Manual,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HttpRequest => "http_request",
            Self::MessageBatch => "message_batch",
            Self::TimerTick => "timer_tick",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// 环境上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbientContext {
    /// 区域设置，例如 "en"、"zh-cn"
    pub locale: String,
    /// 触发来源
    pub trigger: TriggerKind,
    /// 请求元数据
    pub metadata: HashMap<String, String>,
}

impl AmbientContext {
    /// 创建新的环境上下文
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            trigger: TriggerKind::Manual,
            metadata: HashMap::new(),
        }
    }

    /// 设置触发来源
    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = trigger;
        self
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 获取元数据
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
