//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义提供者注册、依赖解析和模块声明的核心接口。
//!
//! ## 核心接口
//!
//! - [`ProviderRegistry`] - 提供者注册表接口
//! - [`ServiceResolver`] - 服务解析器接口
//! - [`ComponentFactory`] - 组件工厂接口
//! - [`ModuleDescriptor`] - 模块声明

pub mod factory;
pub mod module;
pub mod registry;
pub mod resolver;

pub use factory::*;
pub use module::*;
pub use registry::*;
pub use resolver::*;
