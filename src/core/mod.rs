//! 核心模块
//!
//! 包含宿主配置。

pub mod config;

pub use config::{DiscoveryConfig, HostConfig, HostConfigBuilder, LifecycleConfig, LogConfig};
