//! 模块管理
//!
//! 包含插件宿主的核心组件：
//! - 模块描述、状态和失败分类
//! - 描述解析与发现
//! - 依赖解析
//! - 实例注册表与活动序列
//! - 执行上下文、加载器接口与报告
//! - 生命周期编排与统一管理接口

pub mod active;
pub mod context;
pub mod dependency;
pub mod discovery;
pub mod lifecycle;
pub mod manager;
pub mod metadata;
pub mod parser;
pub mod registry;
pub mod report;
pub mod runtime;

// 重导出常用类型
pub use active::ActiveSequence;
pub use context::ExecutionContext;
pub use dependency::{DependencyGraph, DependencyResolver, Rejection, Resolution};
pub use discovery::{Discovery, ManifestDiscovery, StaticDiscovery};
pub use lifecycle::LifecycleManager;
pub use manager::ModuleManager;
pub use metadata::{module_key, Descriptor, FailureKind, ModuleState};
pub use parser::DescriptorParser;
pub use registry::{ModuleRecord, ModuleRegistry};
pub use report::{FailureReport, FanoutReporter, MemoryReporter, Reporter, TracingReporter};
pub use runtime::{ModuleFactory, ModuleHandle, ModuleLoader, Plugin, StaticModuleLoader};
