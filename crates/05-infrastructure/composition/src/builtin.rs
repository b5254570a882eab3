//! 内置模块
//!
//! 内置模块总是先于用户模块注册，顺序固定：`core` 然后 `locale`。

use crate::options::ApplicationOptions;
use di_abstractions::{Dependencies, ModuleDescriptor, ProviderDescriptor};
use di_impl::AMBIENT_CONTEXT;
use infrastructure_common::{AmbientContext, DependencyError, Token};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// 应用配置令牌（单例）
pub static APPLICATION_OPTIONS: Lazy<Token<ApplicationOptions>> =
    Lazy::new(|| Token::new("ApplicationOptions"));

/// 当前工作单元区域设置令牌（作用域）
pub static LOCALE: Lazy<Token<Locale>> = Lazy::new(|| Token::new("Locale"));

pub const CORE_MODULE: &str = "core";
pub const LOCALE_MODULE: &str = "locale";

/// 区域设置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `core` 模块：应用配置和环境上下文占位符
pub fn core_module(options: ApplicationOptions) -> Arc<ModuleDescriptor> {
    ModuleDescriptor::builder(CORE_MODULE)
        .provider(ProviderDescriptor::value(&APPLICATION_OPTIONS, options))
        // 每个作用域都会用本地值遮蔽这个提供者
        .provider(
            ProviderDescriptor::class(&AMBIENT_CONTEXT, Vec::new(), |deps: &Dependencies| {
                Err::<AmbientContext, _>(anyhow::Error::new(DependencyError::ScopeRequired {
                    token: deps.owner().clone(),
                }))
            })
            .scoped(),
        )
        .build()
}

/// `locale` 模块：从环境上下文派生当前区域设置
pub fn locale_module(core: &Arc<ModuleDescriptor>) -> Arc<ModuleDescriptor> {
    ModuleDescriptor::builder(LOCALE_MODULE)
        .import(core)
        .provider(
            ProviderDescriptor::factory(
                &LOCALE,
                vec![
                    AMBIENT_CONTEXT.service_token().clone(),
                    APPLICATION_OPTIONS.service_token().clone(),
                ],
                |deps: Dependencies| async move {
                    let context = deps.get(&AMBIENT_CONTEXT)?;
                    let options = deps.get(&APPLICATION_OPTIONS)?;
                    let tag = context.locale.trim();
                    if tag.is_empty() {
                        Ok(Locale::new(options.default_locale.clone()))
                    } else {
                        Ok(Locale::new(tag))
                    }
                },
            )
            .scoped(),
        )
        .build()
}

/// 全部内置模块，按注册顺序
pub fn builtin_modules(options: ApplicationOptions) -> Vec<Arc<ModuleDescriptor>> {
    let core = core_module(options);
    let locale = locale_module(&core);
    vec![core, locale]
}
