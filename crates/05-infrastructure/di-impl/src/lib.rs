//! # 依赖注入具体实现
//!
//! 提供两级容器（根容器 + 作用域子容器）和工作单元作用域的具体实现。
//!
//! ## 生命周期
//!
//! - 单例缓存在注册它的容器中（模块提供者都注册在根容器）
//! - 作用域实例缓存在作用域子容器中，作用域结束时丢弃
//! - 瞬时实例每次解析都重新创建

pub mod container;
pub mod scope;

pub use container::{Container, ContainerStats};
pub use di_abstractions::{ProviderRegistry, ResolverExt, ServiceResolver};
pub use scope::{current_container, current_context, current_scope, UnitOfWorkScope, AMBIENT_CONTEXT};
