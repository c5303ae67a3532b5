//! 插件宿主错误类型定义
//!
//! 本模块定义了宿主中使用的所有错误类型，以及模块级失败的分类。

use thiserror::Error;

use crate::module::metadata::FailureKind;

/// 插件宿主核心错误类型
#[derive(Error, Debug)]
pub enum PluginError {
    // ==================== 依赖解析错误 ====================

    /// 循环依赖
    #[error("检测到循环依赖: '{module}' ({path})")]
    CyclicDependency {
        module: String,
        path: String,
    },

    /// 依赖模块不存在
    #[error("依赖模块未找到: '{module}' 需要 '{dependency}'")]
    MissingDependency {
        module: String,
        dependency: String,
    },

    /// 依赖模块加载或启用失败
    #[error("依赖模块不可用: '{module}' 的依赖 '{dependency}' 已失败")]
    DependencyFailed {
        module: String,
        dependency: String,
    },

    // ==================== 生命周期错误 ====================

    /// 模块实例化失败
    #[error("模块实例化失败: '{module}' - {reason}")]
    InstantiationFailure {
        module: String,
        reason: String,
    },

    /// 模块启用钩子失败
    #[error("模块启用失败: '{module}' - {reason}")]
    ActivationFailure {
        module: String,
        reason: String,
    },

    /// 模块停用钩子失败（非致命）
    #[error("模块停用失败: '{module}' - {reason}")]
    DeactivationFailure {
        module: String,
        reason: String,
    },

    /// 模块已存在
    #[error("模块已存在: '{0}'")]
    DuplicateModule(String),

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 无效的模块描述
    #[error("无效的模块描述: {0}")]
    InvalidDescriptor(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 宿主操作结果类型别名
pub type Result<T> = std::result::Result<T, PluginError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-001";
    pub const MODULE_MISSING_DEPENDENCY: &str = "MODULE-002";
    pub const MODULE_DEPENDENCY_FAILED: &str = "MODULE-003";
    pub const MODULE_INSTANTIATION_FAILED: &str = "MODULE-004";
    pub const MODULE_ACTIVATION_FAILED: &str = "MODULE-005";
    pub const MODULE_DEACTIVATION_FAILED: &str = "MODULE-006";
    pub const MODULE_DUPLICATE: &str = "MODULE-007";
    pub const MODULE_NOT_FOUND: &str = "MODULE-008";
    pub const MODULE_INVALID_DESCRIPTOR: &str = "MODULE-009";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 其他
    pub const INTERNAL: &str = "CORE-001";
}

impl PluginError {
    /// 构造实例化失败错误
    pub fn instantiation(module: impl Into<String>, reason: impl ToString) -> Self {
        PluginError::InstantiationFailure {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// 构造启用失败错误
    pub fn activation(module: impl Into<String>, reason: impl ToString) -> Self {
        PluginError::ActivationFailure {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// 构造停用失败错误
    pub fn deactivation(module: impl Into<String>, reason: impl ToString) -> Self {
        PluginError::DeactivationFailure {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// 模块级失败的分类
    ///
    /// 非模块级错误（配置、IO 等）返回 `None`。
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            PluginError::CyclicDependency { .. } => Some(FailureKind::CyclicDependency),
            PluginError::MissingDependency { .. } => Some(FailureKind::MissingDependency),
            PluginError::DependencyFailed { .. } => Some(FailureKind::DependencyFailed),
            PluginError::InstantiationFailure { .. } => Some(FailureKind::InstantiationFailure),
            PluginError::ActivationFailure { .. } => Some(FailureKind::ActivationFailure),
            PluginError::DeactivationFailure { .. } => Some(FailureKind::DeactivationFailure),
            PluginError::DuplicateModule(_) => Some(FailureKind::DuplicateModule),
            _ => None,
        }
    }

    /// 出错的模块名（如果错误与单个模块相关）
    pub fn module(&self) -> Option<&str> {
        match self {
            PluginError::CyclicDependency { module, .. }
            | PluginError::MissingDependency { module, .. }
            | PluginError::DependencyFailed { module, .. }
            | PluginError::InstantiationFailure { module, .. }
            | PluginError::ActivationFailure { module, .. }
            | PluginError::DeactivationFailure { module, .. } => Some(module),
            PluginError::DuplicateModule(name) | PluginError::ModuleNotFound(name) => Some(name),
            _ => None,
        }
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            PluginError::CyclicDependency { .. } => error_code::MODULE_CIRCULAR_DEPENDENCY,
            PluginError::MissingDependency { .. } => error_code::MODULE_MISSING_DEPENDENCY,
            PluginError::DependencyFailed { .. } => error_code::MODULE_DEPENDENCY_FAILED,
            PluginError::InstantiationFailure { .. } => error_code::MODULE_INSTANTIATION_FAILED,
            PluginError::ActivationFailure { .. } => error_code::MODULE_ACTIVATION_FAILED,
            PluginError::DeactivationFailure { .. } => error_code::MODULE_DEACTIVATION_FAILED,
            PluginError::DuplicateModule(_) => error_code::MODULE_DUPLICATE,
            PluginError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            PluginError::InvalidDescriptor(_) => error_code::MODULE_INVALID_DESCRIPTOR,
            PluginError::ConfigLoadFailed(_)
            | PluginError::Yaml(_)
            | PluginError::Json(_) => error_code::CONFIG_LOAD_FAILED,
            PluginError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            _ => error_code::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PluginError::MissingDependency {
            module: "economy".to_string(),
            dependency: "vault".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("economy"));
        assert!(text.contains("vault"));
    }

    #[test]
    fn test_error_kind() {
        let err = PluginError::activation("chat", "boom");
        assert_eq!(err.kind(), Some(FailureKind::ActivationFailure));
        assert_eq!(err.module(), Some("chat"));

        let err = PluginError::ConfigLoadFailed("bad".to_string());
        assert_eq!(err.kind(), None);
        assert_eq!(err.module(), None);
    }

    #[test]
    fn test_error_code() {
        let err = PluginError::CyclicDependency {
            module: "a".to_string(),
            path: "a -> b -> a".to_string(),
        };
        assert_eq!(err.error_code(), error_code::MODULE_CIRCULAR_DEPENDENCY);

        let err = PluginError::instantiation("a", "no entry point");
        assert_eq!(err.error_code(), error_code::MODULE_INSTANTIATION_FAILED);
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: PluginError = anyhow::anyhow!("hook exploded").into();
        assert!(matches!(err, PluginError::Other(_)));
        assert_eq!(err.to_string(), "hook exploded");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PluginError = io_err.into();
        assert!(matches!(err, PluginError::Io(_)));
    }
}
