//! 宿主配置
//!
//! 定义插件宿主的配置结构和加载逻辑。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::module::discovery::DEFAULT_MANIFEST_FILE;
use crate::utils::{PluginError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略（hourly / daily / never）
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// 停用时等待模块任务结束的期限（毫秒）
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// 事件处理钩子超时（毫秒），不设置则不限时
    ///
    /// 启用与停用钩子不受此限制。
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,

    /// 加载后是否自动启用
    #[serde(default = "default_true")]
    pub auto_enable: bool,
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: default_shutdown_grace_ms(),
            handler_timeout_ms: None,
            auto_enable: true,
        }
    }
}

impl LifecycleConfig {
    /// 停用等待期限
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// 事件处理超时
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

/// 发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// 模块目录列表
    #[serde(default)]
    pub module_dirs: Vec<PathBuf>,

    /// 清单文件名
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            module_dirs: vec![],
            manifest_file: default_manifest_file(),
        }
    }
}

/// 宿主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 生命周期配置
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// 发现配置
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl HostConfig {
    /// 创建配置构建器
    pub fn builder() -> HostConfigBuilder {
        HostConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// 扩展名为 `.json` 时按 JSON 解析，否则按 YAML 解析。加载后会执行 [`validate`](Self::validate)。
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PluginError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;

        let mut config: HostConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.validate()?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(PluginError::InvalidConfigValue {
                key: "logging.level".to_string(),
                reason: format!("未知的日志级别 '{}'", self.logging.level),
            });
        }

        if !matches!(self.logging.rotation.as_str(), "hourly" | "daily" | "never") {
            return Err(PluginError::InvalidConfigValue {
                key: "logging.rotation".to_string(),
                reason: format!("未知的轮转策略 '{}'", self.logging.rotation),
            });
        }

        if self.logging.file_output && self.logging.log_dir.is_none() {
            return Err(PluginError::InvalidConfigValue {
                key: "logging.log_dir".to_string(),
                reason: "启用文件日志时必须指定目录".to_string(),
            });
        }

        if self.lifecycle.handler_timeout_ms == Some(0) {
            return Err(PluginError::InvalidConfigValue {
                key: "lifecycle.handler_timeout_ms".to_string(),
                reason: "超时必须大于 0".to_string(),
            });
        }

        if self.discovery.manifest_file.trim().is_empty() {
            return Err(PluginError::InvalidConfigValue {
                key: "discovery.manifest_file".to_string(),
                reason: "清单文件名不能为空".to_string(),
            });
        }

        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct HostConfigBuilder {
    config: HostConfig,
}

impl HostConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 设置停用等待期限
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.lifecycle.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    /// 设置事件处理超时
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.lifecycle.handler_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 加载后不自动启用
    pub fn manual_enable(mut self) -> Self {
        self.config.lifecycle.auto_enable = false;
        self
    }

    /// 添加模块目录
    pub fn module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.discovery.module_dirs.push(dir.into());
        self
    }

    /// 设置清单文件名
    pub fn manifest_file(mut self, name: impl Into<String>) -> Self {
        self.config.discovery.manifest_file = name.into();
        self
    }

    /// 构建配置
    pub fn build(self) -> HostConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.lifecycle.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.lifecycle.handler_timeout(), None);
        assert!(config.lifecycle.auto_enable);
        assert_eq!(config.discovery.manifest_file, "plugin.yaml");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = HostConfig::builder()
            .log_level("debug")
            .handler_timeout(Duration::from_millis(250))
            .manual_enable()
            .module_dir("plugins")
            .build();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.lifecycle.handler_timeout_ms, Some(250));
        assert!(!config.lifecycle.auto_enable);
        assert_eq!(config.discovery.module_dirs, vec![PathBuf::from("plugins")]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = HostConfig::builder().log_level("loud").build();
        assert!(matches!(
            config.validate(),
            Err(PluginError::InvalidConfigValue { ref key, .. }) if key == "logging.level"
        ));

        let mut config = HostConfig::default();
        config.lifecycle.handler_timeout_ms = Some(0);
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.logging.file_output = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "lifecycle:\n  handler_timeout_ms: 100\n";
        let config: HostConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lifecycle.handler_timeout_ms, Some(100));
        assert_eq!(config.lifecycle.shutdown_grace_ms, 5000);
        assert_eq!(config.logging.rotation, "daily");
    }
}
