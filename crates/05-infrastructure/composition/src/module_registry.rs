//! 模块注册表
//!
//! 负责解析模块导入图、把提供者展开到根容器，并按依赖顺序驱动模块生命周期。

use di_abstractions::{CollaboratorHandle, MiddlewareConfig, ModuleDescriptor, ModuleId, ServiceResolver};
use di_impl::Container;
use infrastructure_common::{ModuleError, ModuleResult, ShutdownFailure};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 模块关闭报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// 按调用顺序记录的已尝试关闭的模块
    pub attempted: Vec<String>,
    /// 收集到的关闭失败
    pub failures: Vec<ShutdownFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 模块注册表
#[derive(Default)]
pub struct ModuleRegistry {
    /// 已注册模块（按标识）
    registered: HashMap<ModuleId, Arc<ModuleDescriptor>>,
    /// 注册完成顺序（导入 DFS 的后序）
    order: Vec<Arc<ModuleDescriptor>>,
    /// 导入边
    edges: Vec<(ModuleId, ModuleId)>,
    /// 已展开到根容器的模块
    flattened: HashSet<ModuleId>,
    /// 已完成初始化的模块，按初始化顺序
    initialized: Vec<Arc<ModuleDescriptor>>,
}

/// 一次注册调用中暂存的结果，整体成功后才提交
#[derive(Default)]
struct Staging {
    stack: Vec<(ModuleId, String)>,
    modules: Vec<Arc<ModuleDescriptor>>,
    ids: HashSet<ModuleId>,
    edges: Vec<(ModuleId, ModuleId)>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模块及其全部导入
    ///
    /// 导入先于模块本身完成注册；已注册的模块直接跳过。
    /// 失败时注册表保持调用前的状态。
    pub fn register(&mut self, module: &Arc<ModuleDescriptor>) -> ModuleResult<()> {
        let mut staging = Staging::default();
        self.visit(module, &mut staging)?;

        for staged in &staging.modules {
            debug!("注册模块: {} ({})", staged.name, staged.id);
            self.registered.insert(staged.id, staged.clone());
        }
        self.order.extend(staging.modules);
        self.edges.extend(staging.edges);
        Ok(())
    }

    fn visit(&self, module: &Arc<ModuleDescriptor>, staging: &mut Staging) -> ModuleResult<()> {
        if let Some(position) = staging.stack.iter().position(|(id, _)| *id == module.id) {
            let mut path: Vec<String> = staging.stack[position..]
                .iter()
                .map(|(_, name)| name.clone())
                .collect();
            path.push(module.name.clone());
            return Err(ModuleError::CircularDependency { path });
        }

        if self.registered.contains_key(&module.id) || staging.ids.contains(&module.id) {
            return Ok(());
        }

        staging.stack.push((module.id, module.name.clone()));
        for import in &module.imports {
            let target = import.resolve(&module.name)?;
            staging.edges.push((module.id, target.id));
            self.visit(&target, staging)?;
        }
        staging.stack.pop();

        staging.ids.insert(module.id);
        staging.modules.push(module.clone());
        Ok(())
    }

    /// 按注册顺序把每个模块的提供者注册到根容器
    pub fn flatten(&mut self, root: &Container) -> ModuleResult<()> {
        for module in &self.order {
            if !self.flattened.insert(module.id) {
                return Err(ModuleError::DuplicateModuleRegistration {
                    module: module.name.clone(),
                });
            }
            for provider in &module.providers {
                root.register(provider.clone())
                    .map_err(|source| ModuleError::Registration {
                        module: module.name.clone(),
                        source,
                    })?;
            }
            debug!("模块 {} 展开了 {} 个提供者", module.name, module.providers.len());
        }
        info!("模块展开完成，共 {} 个模块", self.order.len());
        Ok(())
    }

    /// 按依赖优先的顺序依次调用初始化钩子
    pub async fn initialize_all(&mut self, resolver: &dyn ServiceResolver) -> ModuleResult<()> {
        let pending: Vec<_> = self
            .order
            .iter()
            .filter(|module| !self.initialized.iter().any(|done| done.id == module.id))
            .cloned()
            .collect();

        for module in pending {
            if let Some(lifecycle) = &module.lifecycle {
                debug!("初始化模块: {}", module.name);
                lifecycle
                    .on_initialize(resolver)
                    .await
                    .map_err(|error| ModuleError::InitializationFailed {
                        module: module.name.clone(),
                        source: error.into(),
                    })?;
            }
            self.initialized.push(module);
        }

        info!("模块初始化完成，共 {} 个模块", self.initialized.len());
        Ok(())
    }

    /// 按初始化的逆序调用关闭钩子，单个失败不会中断其余模块
    pub async fn shutdown_all(&mut self, resolver: &dyn ServiceResolver) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        while let Some(module) = self.initialized.pop() {
            report.attempted.push(module.name.clone());
            let Some(lifecycle) = &module.lifecycle else {
                continue;
            };
            debug!("关闭模块: {}", module.name);
            if let Err(error) = lifecycle.on_shutdown(resolver).await {
                warn!("模块 {} 关闭失败: {:#}", module.name, error);
                report.failures.push(ShutdownFailure {
                    module: module.name.clone(),
                    message: format!("{error:#}"),
                });
            }
        }

        info!(
            "模块关闭完成，尝试 {} 个，失败 {} 个",
            report.attempted.len(),
            report.failures.len()
        );
        report
    }

    /// 模块是否已注册
    pub fn is_registered(&self, module: &ModuleDescriptor) -> bool {
        self.registered.contains_key(&module.id)
    }

    /// 按注册顺序排列的模块
    pub fn modules(&self) -> &[Arc<ModuleDescriptor>] {
        &self.order
    }

    /// 模块名称，按注册顺序
    pub fn module_names(&self) -> Vec<String> {
        self.order.iter().map(|module| module.name.clone()).collect()
    }

    /// 已初始化模块名称，按初始化顺序
    pub fn initialized_modules(&self) -> Vec<String> {
        self.initialized.iter().map(|module| module.name.clone()).collect()
    }

    /// 导入边，`(导入方, 被导入方)`
    pub fn edges(&self) -> &[(ModuleId, ModuleId)] {
        &self.edges
    }

    pub fn controllers(&self) -> Vec<CollaboratorHandle> {
        self.order
            .iter()
            .flat_map(|module| module.controllers.iter().cloned())
            .collect()
    }

    pub fn consumers(&self) -> Vec<CollaboratorHandle> {
        self.order
            .iter()
            .flat_map(|module| module.consumers.iter().cloned())
            .collect()
    }

    pub fn jobs(&self) -> Vec<CollaboratorHandle> {
        self.order
            .iter()
            .flat_map(|module| module.jobs.iter().cloned())
            .collect()
    }

    pub fn middleware_configs(&self) -> Vec<MiddlewareConfig> {
        self.order
            .iter()
            .flat_map(|module| module.middleware.iter().cloned())
            .collect()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.module_names())
            .field("flattened", &self.flattened.len())
            .field("initialized", &self.initialized_modules())
            .finish()
    }
}
