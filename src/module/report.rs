//! 失败与生命周期报告
//!
//! 核心只产出结构化的报告（模块名 + 失败分类 + 上下文），
//! 面向用户的文本由报告接收方自行决定。

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::metadata::{FailureKind, ModuleState};
use crate::utils::PluginError;

/// 模块失败报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// 模块名
    pub module: String,
    /// 失败分类
    pub kind: FailureKind,
    /// 上下文（环路径、依赖名或错误原因）
    pub context: String,
    /// 报告时间
    pub at: DateTime<Utc>,
}

impl FailureReport {
    /// 创建报告
    pub fn new(module: impl Into<String>, kind: FailureKind, context: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            kind,
            context: context.into(),
            at: Utc::now(),
        }
    }

    /// 从模块级错误创建报告
    ///
    /// 非模块级错误返回 `None`。
    pub fn from_error(error: &PluginError) -> Option<Self> {
        let kind = error.kind()?;
        let module = error.module()?.to_string();
        let context = match error {
            PluginError::CyclicDependency { path, .. } => path.clone(),
            PluginError::MissingDependency { dependency, .. }
            | PluginError::DependencyFailed { dependency, .. } => dependency.clone(),
            PluginError::InstantiationFailure { reason, .. }
            | PluginError::ActivationFailure { reason, .. }
            | PluginError::DeactivationFailure { reason, .. } => reason.clone(),
            _ => String::new(),
        };
        Some(Self::new(module, kind, context))
    }
}

/// 报告接收方
///
/// 实现必须是线程安全的；报告可能在广播或停用期间从任意任务发出。
pub trait Reporter: Send + Sync {
    /// 模块失败
    fn failure(&self, report: &FailureReport);

    /// 模块状态变化
    fn transition(&self, _module: &str, _state: ModuleState) {}
}

/// 基于 tracing 的报告接收方
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn failure(&self, report: &FailureReport) {
        warn!(
            module = %report.module,
            kind = %report.kind,
            context = %report.context,
            "模块失败"
        );
    }

    fn transition(&self, module: &str, state: ModuleState) {
        info!(module = %module, state = %state, "模块状态变化");
    }
}

/// 内存报告接收方
///
/// 收集所有报告，供诊断接口和测试读取。
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    failures: Arc<Mutex<Vec<FailureReport>>>,
    transitions: Arc<Mutex<Vec<(String, ModuleState)>>>,
}

impl MemoryReporter {
    /// 创建空接收方
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有失败报告
    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// 指定模块的失败分类
    pub fn kinds_for(&self, module: &str) -> Vec<FailureKind> {
        self.failures()
            .into_iter()
            .filter(|r| r.module.eq_ignore_ascii_case(module))
            .map(|r| r.kind)
            .collect()
    }

    /// 所有状态变化
    pub fn transitions(&self) -> Vec<(String, ModuleState)> {
        self.transitions
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn failure(&self, report: &FailureReport) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(report.clone());
        }
    }

    fn transition(&self, module: &str, state: ModuleState) {
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.push((module.to_string(), state));
        }
    }
}

/// 同时转发给多个接收方
#[derive(Clone, Default)]
pub struct FanoutReporter {
    targets: Vec<Arc<dyn Reporter>>,
}

impl FanoutReporter {
    /// 创建空的转发器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加接收方
    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.targets.push(reporter);
        self
    }
}

impl Reporter for FanoutReporter {
    fn failure(&self, report: &FailureReport) {
        for target in &self.targets {
            target.failure(report);
        }
    }

    fn transition(&self, module: &str, state: ModuleState) {
        for target in &self.targets {
            target.transition(module, state);
        }
    }
}
