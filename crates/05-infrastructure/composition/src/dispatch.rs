//! 触发源与调度目标
//!
//! 触发源（HTTP 请求、消息批次、定时触发）决定工作单元的环境上下文，
//! 调度目标在作用域内接收子容器并完成协议相关的工作。

use crate::options::ApplicationOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di_abstractions::{CollaboratorHandle, MiddlewareConfig};
use di_impl::Container;
use infrastructure_common::{AmbientContext, TriggerKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 请求标识请求头
pub const REQUEST_ID_HEADER: &str = "request-id";

/// 触发源
pub trait Trigger: Send {
    /// 触发来源类别
    fn kind(&self) -> TriggerKind;

    /// 从触发源派生环境上下文
    fn ambient_context(&self, options: &ApplicationOptions) -> AmbientContext;
}

/// 入站 HTTP 请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    /// 请求头，键统一为小写
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// 按名称获取请求头（不区分大小写）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl Trigger for HttpRequest {
    fn kind(&self) -> TriggerKind {
        TriggerKind::HttpRequest
    }

    fn ambient_context(&self, options: &ApplicationOptions) -> AmbientContext {
        let locale = self
            .header(&options.locale_header)
            .and_then(primary_language_tag)
            .unwrap_or_else(|| options.default_locale.clone());

        let mut context = AmbientContext::new(locale)
            .with_trigger(TriggerKind::HttpRequest)
            .with_metadata("method", self.method.clone())
            .with_metadata("path", self.path.clone());
        if let Some(request_id) = self.header(REQUEST_ID_HEADER) {
            context = context.with_metadata(REQUEST_ID_HEADER, request_id);
        }
        context
    }
}

/// HTTP 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// 按 UTF-8 解读响应体
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 队列消息批次
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBatch {
    pub queue: String,
    pub metadata: HashMap<String, String>,
    pub messages: Vec<serde_json::Value>,
}

impl MessageBatch {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_message(mut self, message: serde_json::Value) -> Self {
        self.messages.push(message);
        self
    }
}

impl Trigger for MessageBatch {
    fn kind(&self) -> TriggerKind {
        TriggerKind::MessageBatch
    }

    fn ambient_context(&self, options: &ApplicationOptions) -> AmbientContext {
        let locale = self
            .metadata
            .get(&options.message_locale_key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| options.default_locale.clone());

        let mut context = AmbientContext::new(locale)
            .with_trigger(TriggerKind::MessageBatch)
            .with_metadata("queue", self.queue.clone());
        for (key, value) in &self.metadata {
            if key != &options.message_locale_key {
                context = context.with_metadata(key.clone(), value.clone());
            }
        }
        context
    }
}

/// 定时触发
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTick {
    pub job: String,
    pub fired_at: DateTime<Utc>,
}

impl TimerTick {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            fired_at: Utc::now(),
        }
    }
}

impl Trigger for TimerTick {
    fn kind(&self) -> TriggerKind {
        TriggerKind::TimerTick
    }

    /// 定时触发没有调用方，区域设置固定为默认值
    fn ambient_context(&self, options: &ApplicationOptions) -> AmbientContext {
        AmbientContext::new(options.default_locale.clone())
            .with_trigger(TriggerKind::TimerTick)
            .with_metadata("job", self.job.clone())
            .with_metadata("fired_at", self.fired_at.to_rfc3339())
    }
}

/// 取 Accept-Language 风格取值中的第一个语言标签
///
/// `"fr-CH, fr;q=0.9, en;q=0.8"` 得到 `"fr-ch"`
pub fn primary_language_tag(value: &str) -> Option<String> {
    let first = value.split(',').next()?;
    let tag = first.split(';').next()?.trim();
    if tag.is_empty() || tag == "*" {
        None
    } else {
        Some(tag.to_ascii_lowercase())
    }
}

/// HTTP 路由
#[async_trait]
pub trait Router: Send + Sync {
    /// 挂载全部模块声明的控制器和中间件
    fn mount(&self, _controllers: &[CollaboratorHandle], _middleware: &[MiddlewareConfig]) {}

    /// 在作用域内处理请求
    async fn dispatch(&self, request: HttpRequest, container: Container) -> anyhow::Result<HttpResponse>;
}

/// 消息消费调度
#[async_trait]
pub trait ConsumerDispatcher: Send + Sync {
    /// 注册全部模块声明的消费者
    fn register(&self, _consumers: &[CollaboratorHandle]) {}

    /// 在作用域内处理消息批次
    async fn process(&self, batch: MessageBatch, container: Container) -> anyhow::Result<()>;
}

/// 定时任务执行
#[async_trait]
pub trait ScheduleExecutor: Send + Sync {
    /// 注册全部模块声明的任务
    fn register(&self, _jobs: &[CollaboratorHandle]) {}

    /// 在作用域内执行定时任务
    async fn execute(&self, tick: TimerTick, container: Container) -> anyhow::Result<()>;
}
