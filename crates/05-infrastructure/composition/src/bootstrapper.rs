//! 应用启动器

use crate::builtin::builtin_modules;
use crate::module_registry::ModuleRegistry;
use crate::options::ApplicationOptions;
use di_abstractions::ModuleDescriptor;
use di_impl::Container;
use infrastructure_common::{ModuleError, ModuleResult};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 应用启动器
///
/// 负责协调模块注册、提供者展开、依赖图校验和模块初始化的顺序
#[derive(Debug)]
pub struct ApplicationBootstrapper {
    /// 应用配置
    options: ApplicationOptions,
    /// 根容器
    root: Container,
}

impl ApplicationBootstrapper {
    /// 创建新的应用启动器
    pub fn new(options: ApplicationOptions, root: Container) -> Self {
        Self { options, root }
    }

    /// 启动模块图
    ///
    /// 初始化失败时，已经初始化的模块会按逆序关闭后再返回错误
    pub async fn bootstrap(
        &self,
        registry: &mut ModuleRegistry,
        root_module: &Arc<ModuleDescriptor>,
    ) -> ModuleResult<()> {
        info!("开始启动应用: {}", self.options.name);

        // 第一步：注册内置模块和用户模块
        self.register_modules(registry, root_module)?;

        // 第二步：展开提供者到根容器
        registry.flatten(&self.root)?;

        // 第三步：校验提供者依赖图
        if self.options.validate_provider_graph {
            debug!("校验提供者依赖图");
            self.root
                .validate()
                .map_err(|source| ModuleError::ProviderGraph { source })?;
        }

        // 第四步：初始化模块
        if let Err(init_error) = registry.initialize_all(&self.root).await {
            error!("模块初始化失败: {}", init_error);
            let report = registry.shutdown_all(&self.root).await;
            if !report.is_clean() {
                warn!("回滚已初始化模块时有 {} 个模块关闭失败", report.failures.len());
            }
            return Err(init_error);
        }

        info!("应用启动完成: {} 个模块", registry.modules().len());
        Ok(())
    }

    /// 内置模块先于用户模块注册
    fn register_modules(
        &self,
        registry: &mut ModuleRegistry,
        root_module: &Arc<ModuleDescriptor>,
    ) -> ModuleResult<()> {
        for module in builtin_modules(self.options.clone()) {
            debug!("注册内置模块: {}", module.name);
            registry.register(&module)?;
        }
        info!("注册根模块: {}", root_module.name);
        registry.register(root_module)
    }
}
