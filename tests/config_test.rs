//! 宿主配置集成测试
//!
//! 测试从文件加载配置并驱动管理器

use std::sync::Arc;
use std::time::Duration;

use chips_plugin_host::{
    HostConfig, LoggerConfig, PluginError, RotationStrategy, StaticModuleLoader, TracingReporter,
    ModuleManager,
};
use tempfile::TempDir;

/// 测试 YAML 配置加载
#[tokio::test]
async fn test_load_yaml_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("host.yaml");
    tokio::fs::write(
        &path,
        r#"
logging:
  level: debug
  rotation: hourly
lifecycle:
  shutdown_grace_ms: 1500
  handler_timeout_ms: 250
  auto_enable: false
discovery:
  module_dirs:
    - ./plugins
    - /opt/host/plugins
  manifest_file: module.yaml
"#,
    )
    .await
    .unwrap();

    let config = HostConfig::from_file(&path).await.unwrap();

    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.lifecycle.shutdown_grace(), Duration::from_millis(1500));
    assert_eq!(
        config.lifecycle.handler_timeout(),
        Some(Duration::from_millis(250))
    );
    assert!(!config.lifecycle.auto_enable);
    assert_eq!(config.discovery.module_dirs.len(), 2);
    assert_eq!(config.discovery.manifest_file, "module.yaml");

    let logger = LoggerConfig::from_log_config(&config.logging);
    assert_eq!(logger.rotation, RotationStrategy::Hourly);
}

/// 测试 JSON 配置加载（按扩展名识别）
#[tokio::test]
async fn test_load_json_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("host.json");
    tokio::fs::write(
        &path,
        r#"{ "logging": { "level": "warn", "json_format": true }, "lifecycle": { "auto_enable": true } }"#,
    )
    .await
    .unwrap();

    let config = HostConfig::from_file(&path).await.unwrap();
    assert_eq!(config.logging.level, "warn");
    assert!(config.logging.json_format);
    assert_eq!(config.lifecycle.shutdown_grace_ms, 5000);
    assert_eq!(config.discovery.manifest_file, "plugin.yaml");
}

/// 测试缺失文件
#[tokio::test]
async fn test_missing_config_file() {
    let err = HostConfig::from_file("/nonexistent/host.yaml")
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::ConfigLoadFailed(_)));
    assert_eq!(err.error_code(), "CONFIG-001");
}

/// 测试加载时执行验证
#[tokio::test]
async fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("host.yaml");
    tokio::fs::write(&path, "logging:\n  level: shouting\n")
        .await
        .unwrap();

    let err = HostConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(err, PluginError::InvalidConfigValue { .. }));
}

/// 测试格式错误的 YAML
#[tokio::test]
async fn test_malformed_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("host.yaml");
    tokio::fs::write(&path, "lifecycle: [unclosed").await.unwrap();

    let err = HostConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(err, PluginError::Yaml(_)));
}

/// 测试配置传递到管理器
#[tokio::test]
async fn test_manager_uses_config() {
    let config = HostConfig::builder()
        .handler_timeout(Duration::from_millis(50))
        .module_dir("/nonexistent/plugins")
        .build();
    let manager = ModuleManager::new(
        config,
        Arc::new(StaticModuleLoader::new()),
        Arc::new(TracingReporter),
    );

    assert_eq!(manager.config().lifecycle.handler_timeout_ms, Some(50));
    assert_eq!(manager.discover_configured().await.unwrap(), 0);
    assert!(manager.start().await.is_empty());
}
