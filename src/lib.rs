//! # Chips Plugin Host - 插件宿主
//!
//! 为宿主应用发现、加载和管理可选扩展模块（插件），提供以下功能：
//!
//! - **依赖解析**: 检测循环依赖与缺失依赖，给出确定性的加载顺序
//! - **生命周期编排**: 按依赖安全的顺序加载、启用、停用模块
//! - **故障隔离**: 单个模块的错误或 panic 不影响宿主和其他模块
//! - **事件广播**: 按启用顺序向所有已启用模块投递事件
//! - **配置与日志**: 基于 serde 的配置加载和基于 tracing 的结构化日志
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_plugin_host::{Event, HostConfig, ModuleManager, StaticModuleLoader, TracingReporter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HostConfig::from_file("host.yaml").await?;
//!     let loader = StaticModuleLoader::new();
//!     let manager = ModuleManager::new(config, Arc::new(loader), Arc::new(TracingReporter));
//!
//!     manager.discover_configured().await?;
//!     manager.start().await;
//!
//!     manager.broadcast(&Event::command("console", "help", &[])).await;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块描述、依赖解析与生命周期管理
//! - `event` - 事件与广播
//! - `core` - 宿主配置
//! - `utils` - 错误类型与日志系统

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod event;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use event::{BroadcastOutcome, DispatchStats, Event, EventBroadcaster};

pub use module::{
    Descriptor, Discovery, ExecutionContext, FailureKind, FailureReport, ManifestDiscovery,
    MemoryReporter, ModuleHandle, ModuleLoader, ModuleManager, ModuleState, Plugin, Reporter,
    StaticDiscovery, StaticModuleLoader, TracingReporter,
};

pub use utils::{error_code, LogGuard, Logger, LoggerConfig, PluginError, Result, RotationStrategy};

pub use core::config::{DiscoveryConfig, HostConfig, HostConfigBuilder, LifecycleConfig, LogConfig};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
