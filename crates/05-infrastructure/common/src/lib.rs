//! # Infrastructure Common
//!
//! 这个 crate 提供了组合运行时各层共用的基础类型。
//!
//! ## 核心类型
//!
//! - [`ServiceToken`] / [`Token`] - 服务令牌
//! - [`Lifetime`] - 提供者生命周期
//! - [`AmbientContext`] - 工作单元环境上下文
//! - [`DependencyError`] / [`ModuleError`] / [`ApplicationError`] - 分层错误
//!
//! ## 设计原则
//!
//! - 令牌身份只由唯一标识决定，不会意外相等
//! - 异步优先
//! - 没有隐藏的全局状态

pub mod context;
pub mod errors;
pub mod lifecycle;
pub mod metadata;
pub mod token;

pub use context::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
pub use token::*;
