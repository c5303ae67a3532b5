//! 模块管理器
//!
//! 整合发现、依赖解析、生命周期编排和事件广播，提供统一的模块管理接口。
//! 宿主启动时构造一个实例并显式传递，不存在全局注册表。

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::dependency::{DependencyResolver, Resolution};
use super::discovery::{Discovery, ManifestDiscovery};
use super::lifecycle::LifecycleManager;
use super::metadata::{Descriptor, FailureKind, ModuleState};
use super::parser::DescriptorParser;
use super::registry::ModuleRecord;
use super::report::{FailureReport, Reporter, TracingReporter};
use super::runtime::ModuleLoader;
use crate::core::config::HostConfig;
use crate::event::{BroadcastOutcome, DispatchStats, Event, EventBroadcaster};
use crate::utils::{PluginError, Result};

/// 模块管理器
///
/// 负责：
/// - 收集发现阶段产出的描述（重名跳过）
/// - 依赖解析并报告被排除的模块
/// - 按解析顺序加载、启用、停用模块
/// - 向已启用模块广播事件
pub struct ModuleManager {
    /// 配置
    config: HostConfig,
    /// 已登记的描述（发现顺序，键唯一）
    descriptors: RwLock<Vec<Arc<Descriptor>>>,
    /// 最近一次解析结果
    resolution: RwLock<Resolution>,
    /// 依赖解析器
    resolver: DependencyResolver,
    /// 生命周期编排器
    lifecycle: LifecycleManager,
    /// 事件广播器
    broadcaster: EventBroadcaster,
}

impl ModuleManager {
    /// 创建模块管理器
    pub fn new(
        config: HostConfig,
        loader: Arc<dyn ModuleLoader>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let lifecycle =
            LifecycleManager::new(loader, reporter, config.lifecycle.shutdown_grace());
        let broadcaster = EventBroadcaster::new(
            lifecycle.registry().clone(),
            lifecycle.active().clone(),
            config.lifecycle.handler_timeout(),
        );

        Self {
            config,
            descriptors: RwLock::new(Vec::new()),
            resolution: RwLock::new(Resolution::default()),
            resolver: DependencyResolver::new(),
            lifecycle,
            broadcaster,
        }
    }

    /// 使用默认配置和 tracing 报告创建
    pub fn with_defaults(loader: Arc<dyn ModuleLoader>) -> Self {
        Self::new(HostConfig::default(), loader, Arc::new(TracingReporter))
    }

    /// 配置
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ==================== 发现 ====================

    /// 登记一批描述
    ///
    /// 无效描述记录警告后跳过；与已登记描述重名（大小写不敏感）的描述报告为
    /// `DuplicateModule` 并跳过。返回新登记的数量。
    pub async fn register_descriptors(&self, descriptors: Vec<Descriptor>) -> usize {
        let mut registered = self.descriptors.write().await;
        let mut known: HashSet<String> = registered.iter().map(|d| d.key()).collect();
        let mut count = 0;

        for descriptor in descriptors {
            if let Err(e) = DescriptorParser::validate(&descriptor) {
                warn!(module = %descriptor.name, error = %e, "描述无效，跳过");
                continue;
            }
            if !known.insert(descriptor.key()) {
                self.lifecycle
                    .record_failure(FailureReport::new(
                        descriptor.name.as_str(),
                        FailureKind::DuplicateModule,
                        "同名模块已登记",
                    ))
                    .await;
                continue;
            }

            debug!(module = %descriptor.name, version = %descriptor.version, "登记模块描述");
            registered.push(Arc::new(descriptor));
            count += 1;
        }

        count
    }

    /// 通过发现接口登记描述
    pub async fn discover(&self, discovery: &dyn Discovery) -> Result<usize> {
        let descriptors = discovery.discover().await?;
        Ok(self.register_descriptors(descriptors).await)
    }

    /// 扫描配置中的模块目录
    pub async fn discover_configured(&self) -> Result<usize> {
        let discovery = ManifestDiscovery::new(self.config.discovery.module_dirs.clone())
            .with_manifest_file(self.config.discovery.manifest_file.clone());
        self.discover(&discovery).await
    }

    /// 已登记的描述
    pub async fn descriptors(&self) -> Vec<Arc<Descriptor>> {
        self.descriptors.read().await.clone()
    }

    // ==================== 生命周期 ====================

    /// 解析依赖
    ///
    /// 被排除的模块（循环依赖、缺失依赖及其传递依赖方）记为终态失败并报告。
    pub async fn resolve(&self) -> Resolution {
        let descriptors = self.descriptors().await;
        let resolution = self.resolver.resolve(&descriptors);

        for rejection in resolution.rejected() {
            self.lifecycle
                .record_failure(FailureReport::new(
                    rejection.module.as_str(),
                    rejection.kind,
                    rejection.context.as_str(),
                ))
                .await;
        }

        info!(
            order = resolution.order().len(),
            rejected = resolution.rejected().len(),
            "依赖解析完成"
        );
        *self.resolution.write().await = resolution.clone();
        resolution
    }

    /// 按最近一次解析的顺序加载模块
    pub async fn load_all(&self) -> Vec<String> {
        let order = self.resolution.read().await.order().to_vec();
        self.lifecycle.load_all(&order).await
    }

    /// 按最近一次解析的顺序启用模块
    pub async fn enable_all(&self) -> Vec<String> {
        let order = self.resolution.read().await.order().to_vec();
        self.lifecycle.enable_all(&order).await
    }

    /// 启动：解析、加载，并在配置允许时启用
    ///
    /// 返回启动后的活动序列。
    #[instrument(skip(self))]
    pub async fn start(&self) -> Vec<String> {
        self.resolve().await;
        self.load_all().await;
        if self.config.lifecycle.auto_enable {
            self.enable_all().await;
        }

        let active = self.active_modules().await;
        info!(active = active.len(), "模块管理器已启动");
        active
    }

    /// 重新解析并推进所有可推进的模块
    ///
    /// 已启用的模块保持不变，已失败和已停用的模块不会重新加载；
    /// 新登记的描述会被加载和启用。
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Vec<String> {
        self.resolve().await;
        self.load_all().await;
        self.enable_all().await;
        self.active_modules().await
    }

    /// 停用模块（幂等）
    pub async fn disable(&self, name: &str) -> bool {
        self.lifecycle.disable(name).await
    }

    /// 停用所有模块，并释放已加载但未启用的模块
    pub async fn disable_all(&self) -> usize {
        self.lifecycle.disable_all().await
    }

    /// 关闭：停用所有模块并取消宿主根令牌
    ///
    /// 管理器只能关闭一次。关闭后 `start`、`reload`、`load_all` 和 `enable_all`
    /// 不再推进任何模块，直接返回空结果。
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> usize {
        let count = self.disable_all().await;
        self.lifecycle.root_token().cancel();
        info!(count, "模块管理器已关闭");
        count
    }

    // ==================== 事件 ====================

    /// 向所有已启用模块广播事件
    pub async fn broadcast(&self, event: &Event) -> BroadcastOutcome {
        self.broadcaster.broadcast(event).await
    }

    /// 事件分发统计
    pub async fn dispatch_stats(&self) -> DispatchStats {
        self.broadcaster.stats().await
    }

    // ==================== 查询 ====================

    /// 活动序列（启用顺序）
    pub async fn active_modules(&self) -> Vec<String> {
        self.lifecycle.active().snapshot().await
    }

    /// 模块状态
    pub async fn state_of(&self, name: &str) -> Option<ModuleState> {
        self.lifecycle.state_of(name).await
    }

    /// 模块是否已启用
    pub async fn is_enabled(&self, name: &str) -> bool {
        self.state_of(name).await == Some(ModuleState::Enabled)
    }

    /// 获取模块记录
    pub async fn module(&self, name: &str) -> Result<ModuleRecord> {
        self.lifecycle
            .registry()
            .get(name)
            .await
            .ok_or_else(|| PluginError::ModuleNotFound(name.to_string()))
    }

    /// 所有终态失败
    pub async fn failures(&self) -> Vec<FailureReport> {
        self.lifecycle.failures().await
    }

    /// 最近一次解析结果
    pub async fn resolution(&self) -> Resolution {
        self.resolution.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::context::ExecutionContext;
    use crate::module::discovery::StaticDiscovery;
    use crate::module::report::MemoryReporter;
    use crate::module::runtime::{ModuleHandle, Plugin, StaticModuleLoader};
    use async_trait::async_trait;

    struct Quiet;

    #[async_trait]
    impl Plugin for Quiet {
        async fn on_enable(&self, _context: &ExecutionContext) -> anyhow::Result<()> {
            Ok(())
        }

        async fn on_disable(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn manager(names: &[&str], config: HostConfig) -> (ModuleManager, MemoryReporter) {
        let mut loader = StaticModuleLoader::new();
        for name in names {
            loader.register(name, |_, _| Ok(Arc::new(Quiet) as ModuleHandle));
        }
        let reporter = MemoryReporter::new();
        let manager = ModuleManager::new(config, Arc::new(loader), Arc::new(reporter.clone()));
        (manager, reporter)
    }

    #[tokio::test]
    async fn test_duplicate_descriptor_skipped() {
        let (manager, reporter) = manager(&["a"], HostConfig::default());
        let discovery = StaticDiscovery::default()
            .with(Descriptor::new("Alpha", "1.0.0"))
            .with(Descriptor::new("alpha", "2.0.0"));

        assert_eq!(manager.discover(&discovery).await.unwrap(), 1);
        let descriptors = manager.descriptors().await;
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].version, "1.0.0");
        assert_eq!(reporter.kinds_for("alpha"), vec![FailureKind::DuplicateModule]);
        // 重名不是终态失败
        assert!(manager.failures().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_descriptor_skipped() {
        let (manager, _) = manager(&[], HostConfig::default());
        let count = manager
            .register_descriptors(vec![Descriptor::new("ok", "1.0.0"), Descriptor::new("bad", "v1")])
            .await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_start_without_auto_enable() {
        let config = HostConfig::builder().manual_enable().build();
        let (manager, _) = manager(&["a"], config);
        manager
            .register_descriptors(vec![Descriptor::new("a", "1.0.0")])
            .await;

        assert!(manager.start().await.is_empty());
        assert_eq!(manager.state_of("a").await, Some(ModuleState::Loaded));

        manager.enable_all().await;
        assert!(manager.is_enabled("a").await);
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_descriptors() {
        let (manager, _) = manager(&["a", "b"], HostConfig::default());
        manager
            .register_descriptors(vec![Descriptor::new("a", "1.0.0")])
            .await;
        assert_eq!(manager.start().await, vec!["a"]);

        manager
            .register_descriptors(vec![Descriptor::new("b", "1.0.0").with_dependency("a")])
            .await;
        assert_eq!(manager.reload().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_root() {
        let (manager, _) = manager(&["a"], HostConfig::default());
        manager
            .register_descriptors(vec![Descriptor::new("a", "1.0.0")])
            .await;
        manager.start().await;

        let context = manager.module("a").await.unwrap().context;
        assert_eq!(manager.shutdown().await, 1);
        assert!(context.is_cancelled());
        assert!(manager.active_modules().await.is_empty());
        assert!(matches!(
            manager.module("a").await,
            Err(PluginError::ModuleNotFound(_))
        ));
    }
}
