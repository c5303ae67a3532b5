//! 生命周期编排器
//!
//! 按解析器给出的顺序驱动每个模块走完状态机：
//!
//! ```text
//! Discovered -> Loaded -> Enabled -> Disabled
//!     \
//!      -> LoadFailed
//! ```
//!
//! 所有失败都是模块级的：记录、报告、把模块排除在后续推进之外，
//! 不相关模块的加载和启用照常进行。`Disabled` 与 `LoadFailed` 一样是终态，
//! 停用过的模块不会被重新加载。
//!
//! 根令牌取消（宿主关闭）后编排器不再加载或启用任何模块。

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::active::ActiveSequence;
use super::context::ExecutionContext;
use super::metadata::{module_key, Descriptor, FailureKind, ModuleState};
use super::registry::{ModuleRecord, ModuleRegistry};
use super::report::{FailureReport, Reporter};
use super::runtime::{isolate, panic_message, ModuleLoader};
use crate::utils::PluginError;

/// 生命周期编排器
///
/// 拥有模块实例注册表和活动序列；宿主启动时构造一次，显式传递给需要的代码。
pub struct LifecycleManager {
    /// 模块实例注册表
    registry: Arc<ModuleRegistry>,
    /// 活动序列
    active: Arc<ActiveSequence>,
    /// 终态失败：模块键 -> 报告
    failed: RwLock<HashMap<String, FailureReport>>,
    /// 已停用并卸载的模块键
    retired: RwLock<HashSet<String>>,
    /// 外部模块加载器
    loader: Arc<dyn ModuleLoader>,
    /// 报告接收方
    reporter: Arc<dyn Reporter>,
    /// 宿主根令牌，所有模块上下文都是它的子令牌
    root: CancellationToken,
    /// 停用时等待模块任务结束的期限
    shutdown_grace: Duration,
}

impl LifecycleManager {
    /// 创建编排器
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        reporter: Arc<dyn Reporter>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(ModuleRegistry::new()),
            active: Arc::new(ActiveSequence::new()),
            failed: RwLock::new(HashMap::new()),
            retired: RwLock::new(HashSet::new()),
            loader,
            reporter,
            root: CancellationToken::new(),
            shutdown_grace,
        }
    }

    /// 模块实例注册表
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// 活动序列
    pub fn active(&self) -> &Arc<ActiveSequence> {
        &self.active
    }

    /// 宿主根令牌
    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    // ==================== 失败记录 ====================

    /// 记录模块的终态失败
    ///
    /// 每个模块只记录第一次失败，返回本次是否被记录。
    /// 非阻塞类失败（停用失败、重名）只报告，不进入失败表。
    pub async fn record_failure(&self, report: FailureReport) -> bool {
        if !report.kind.is_blocking() {
            self.reporter.failure(&report);
            return false;
        }

        let key = module_key(&report.module);
        let mut failed = self.failed.write().await;
        if failed.contains_key(&key) {
            return false;
        }
        self.reporter.failure(&report);
        self.reporter.transition(&report.module, ModuleState::LoadFailed);
        failed.insert(key, report);
        true
    }

    /// 模块的失败分类
    pub async fn failure(&self, name: &str) -> Option<FailureKind> {
        let failed = self.failed.read().await;
        failed.get(&module_key(name)).map(|r| r.kind)
    }

    /// 所有终态失败（按模块名排序）
    pub async fn failures(&self) -> Vec<FailureReport> {
        let failed = self.failed.read().await;
        let mut reports: Vec<FailureReport> = failed.values().cloned().collect();
        reports.sort_by(|a, b| a.module.cmp(&b.module));
        reports
    }

    /// 模块是否已停用（终态）
    pub async fn is_retired(&self, name: &str) -> bool {
        self.retired.read().await.contains(&module_key(name))
    }

    /// 宿主是否已关闭
    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// 模块当前状态
    ///
    /// 注册表中的模块返回其记录状态，失败的模块返回 `LoadFailed`，
    /// 已停用的模块返回 `Disabled`，未知模块返回 `None`。
    pub async fn state_of(&self, name: &str) -> Option<ModuleState> {
        if let Some(state) = self.registry.state(name).await {
            return Some(state);
        }
        if self.failure(name).await.is_some() {
            return Some(ModuleState::LoadFailed);
        }
        self.is_retired(name).await.then_some(ModuleState::Disabled)
    }

    /// 模块是否已离开可推进的状态
    async fn is_settled(&self, key: &str) -> bool {
        self.registry.contains(key).await
            || self.failure(key).await.is_some()
            || self.is_retired(key).await
    }

    // ==================== 加载 ====================

    /// 按顺序加载所有模块
    ///
    /// 每个模块加载前先确保其依赖已加载（必要时先加载依赖）。
    /// 依赖已失败的模块直接进入 `LoadFailed`，不会调用加载器。
    /// 已加载、已失败和已停用的模块被跳过，因此可以在部分失败后重复调用。
    ///
    /// 返回本次新加载的模块名。宿主关闭后直接返回空列表。
    pub async fn load_all(&self, order: &[Arc<Descriptor>]) -> Vec<String> {
        if self.is_shut_down() {
            warn!("宿主已关闭，拒绝加载模块");
            return Vec::new();
        }

        let index: HashMap<String, &Arc<Descriptor>> =
            order.iter().map(|d| (d.key(), d)).collect();
        let mut loaded = Vec::new();

        for root in order {
            // (模块键, 依赖是否已展开)
            let mut stack = vec![(root.key(), false)];
            let mut loading: HashSet<String> = HashSet::new();

            while let Some((key, expanded)) = stack.pop() {
                if self.is_settled(&key).await {
                    loading.remove(&key);
                    continue;
                }
                let Some(descriptor) = index.get(&key).copied() else {
                    continue;
                };

                if !expanded {
                    loading.insert(key.clone());
                    stack.push((key, true));

                    for dep in descriptor.dependencies.iter().rev() {
                        let dep_key = module_key(dep);
                        if loading.contains(&dep_key) {
                            self.record_failure(FailureReport::new(
                                &descriptor.name,
                                FailureKind::CyclicDependency,
                                format!("{} -> {}", descriptor.name, dep),
                            ))
                            .await;
                            break;
                        }
                        if index.contains_key(&dep_key) {
                            stack.push((dep_key, false));
                        }
                    }
                    continue;
                }

                loading.remove(&key);
                if let Some(dep) = self.unavailable_dependency(descriptor, false).await {
                    self.record_failure(FailureReport::new(
                        &descriptor.name,
                        FailureKind::DependencyFailed,
                        dep,
                    ))
                    .await;
                    continue;
                }

                if self.load_one(descriptor).await {
                    loaded.push(descriptor.name.clone());
                }
            }
        }

        info!(loaded = loaded.len(), "模块加载完成");
        loaded
    }

    /// 找到第一个不可用的依赖
    ///
    /// `require_enabled` 为 `false` 时 Loaded 和 Enabled 都算可用。
    async fn unavailable_dependency(
        &self,
        descriptor: &Descriptor,
        require_enabled: bool,
    ) -> Option<String> {
        for dep in &descriptor.dependencies {
            let available = match self.registry.state(dep).await {
                Some(ModuleState::Enabled) => true,
                Some(ModuleState::Loaded) => !require_enabled,
                _ => false,
            };
            if !available {
                return Some(dep.clone());
            }
        }
        None
    }

    /// 实例化单个模块
    async fn load_one(&self, descriptor: &Arc<Descriptor>) -> bool {
        let name = &descriptor.name;
        let context = ExecutionContext::new(name.as_str(), &self.root);
        debug!(module = %name, version = %descriptor.version, "实例化模块");

        let instantiated = AssertUnwindSafe(self.loader.instantiate(descriptor, &context))
            .catch_unwind()
            .instrument(context.span().clone())
            .await;

        let reason = match instantiated {
            Ok(Ok(handle)) => {
                let record = ModuleRecord::loaded(descriptor.clone(), handle, context.clone());
                if self.registry.put(record).await {
                    self.reporter.transition(name, ModuleState::Loaded);
                    info!(module = %name, version = %descriptor.version, "模块已加载");
                    return true;
                }
                context.shutdown(self.shutdown_grace).await;
                self.record_failure(FailureReport::new(
                    name.as_str(),
                    FailureKind::DuplicateModule,
                    "模块已加载",
                ))
                .await;
                return false;
            }
            Ok(Err(PluginError::InstantiationFailure { reason, .. })) => reason,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        context.shutdown(self.shutdown_grace).await;
        self.record_failure(FailureReport::new(
            name.as_str(),
            FailureKind::InstantiationFailure,
            reason,
        ))
        .await;
        false
    }

    // ==================== 启用 ====================

    /// 按顺序启用所有已加载模块
    ///
    /// 启用成功的模块追加到活动序列。启用钩子失败的模块被强制停用并移除，
    /// 依赖未启用的模块以 `DependencyFailed` 释放。已启用的模块保持不变。
    ///
    /// 返回本次新启用的模块名。宿主关闭后直接返回空列表。
    pub async fn enable_all(&self, order: &[Arc<Descriptor>]) -> Vec<String> {
        if self.is_shut_down() {
            warn!("宿主已关闭，拒绝启用模块");
            return Vec::new();
        }

        let mut enabled = Vec::new();

        for descriptor in order {
            let Some(record) = self.registry.get(&descriptor.name).await else {
                continue;
            };
            if !record.state.can_enable() {
                continue;
            }

            if let Some(dep) = self.unavailable_dependency(descriptor, true).await {
                self.release(&record).await;
                self.record_failure(FailureReport::new(
                    &descriptor.name,
                    FailureKind::DependencyFailed,
                    dep,
                ))
                .await;
                continue;
            }

            if self.enable_one(record).await {
                enabled.push(descriptor.name.clone());
            }
        }

        info!(enabled = enabled.len(), active = self.active.len().await, "模块启用完成");
        enabled
    }

    async fn enable_one(&self, record: ModuleRecord) -> bool {
        let name = record.name().to_string();
        let span = record.context.span().clone();

        let result = isolate(record.handle.on_enable(&record.context))
            .instrument(span.clone())
            .await;

        match result {
            Ok(()) => {
                if self
                    .registry
                    .transition(&name, &[ModuleState::Loaded], ModuleState::Enabled)
                    .await
                    .is_none()
                {
                    warn!(module = %name, "模块在启用期间被移除，撤销启用");
                    if let Err(e) = isolate(record.handle.on_disable()).instrument(span).await {
                        debug!(module = %name, error = %e, "撤销启用时停用钩子失败，已忽略");
                    }
                    record.context.shutdown(self.shutdown_grace).await;
                    return false;
                }
                self.active.push(&name).await;
                self.reporter.transition(&name, ModuleState::Enabled);
                info!(module = %name, "模块已启用");
                true
            }
            Err(reason) => {
                warn!(module = %name, error = %reason, "启用钩子失败，强制停用");
                if let Err(e) = isolate(record.handle.on_disable()).instrument(span).await {
                    debug!(module = %name, error = %e, "强制停用时停用钩子失败，已忽略");
                }
                self.release(&record).await;
                self.record_failure(FailureReport::new(
                    name.as_str(),
                    FailureKind::ActivationFailure,
                    reason,
                ))
                .await;
                false
            }
        }
    }

    // ==================== 停用 ====================

    /// 停用模块
    ///
    /// 幂等：未启用、已停用或不存在的模块直接返回 `false`，不调用任何钩子。
    /// 停用钩子的失败只会被报告，模块仍会从活动序列和注册表中移除。
    pub async fn disable(&self, name: &str) -> bool {
        let Some(record) = self
            .registry
            .transition(name, &[ModuleState::Enabled], ModuleState::Disabled)
            .await
        else {
            debug!(module = %name, "模块未启用，无需停用");
            return false;
        };

        self.active.remove(name).await;
        self.retire(record.name()).await;

        let span = record.context.span().clone();
        if let Err(reason) = isolate(record.handle.on_disable()).instrument(span).await {
            self.record_failure(FailureReport::new(
                record.name(),
                FailureKind::DeactivationFailure,
                reason,
            ))
            .await;
        }

        self.release(&record).await;
        self.reporter.transition(record.name(), ModuleState::Disabled);
        info!(module = %record.name(), "模块已停用");
        true
    }

    /// 停用所有模块
    ///
    /// 按活动序列逆序停用，随后释放已加载但从未启用的模块。
    /// 返回被拆除的模块数。
    pub async fn disable_all(&self) -> usize {
        let mut count = 0;

        for name in self.active.teardown_order().await {
            if self.disable(&name).await {
                count += 1;
            }
        }

        for record in self.registry.all_by_state(ModuleState::Enabled).await {
            if self.disable(record.name()).await {
                count += 1;
            }
        }

        for record in self.registry.all_by_state(ModuleState::Loaded).await {
            if self
                .registry
                .transition(record.name(), &[ModuleState::Loaded], ModuleState::Disabled)
                .await
                .is_some()
            {
                self.retire(record.name()).await;
                self.release(&record).await;
                self.reporter.transition(record.name(), ModuleState::Disabled);
                debug!(module = %record.name(), "释放未启用的模块");
                count += 1;
            }
        }

        info!(count, "所有模块已停用");
        count
    }

    async fn retire(&self, name: &str) {
        self.retired.write().await.insert(module_key(name));
    }

    /// 取消模块上下文并从注册表移除
    async fn release(&self, record: &ModuleRecord) {
        record.context.shutdown(self.shutdown_grace).await;
        self.registry.remove(record.name()).await;
    }
}
