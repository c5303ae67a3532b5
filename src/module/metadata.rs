//! 模块元数据定义
//!
//! 定义模块描述 (Descriptor)、生命周期状态以及失败分类。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 将模块名规范化为注册表键
///
/// 模块名大小写不敏感，所有查找都使用小写键。
pub fn module_key(name: &str) -> String {
    name.to_lowercase()
}

/// 模块描述
///
/// 由发现阶段产出的不可变值，描述一个尚未实例化的模块。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// 模块名（唯一，大小写不敏感）
    pub name: String,

    /// 版本号（semver 格式）
    pub version: String,

    /// 作者
    #[serde(default)]
    pub author: String,

    /// 简要说明
    #[serde(default, alias = "description")]
    pub info: String,

    /// 硬依赖（按声明顺序）
    #[serde(default, alias = "depend")]
    pub dependencies: Vec<String>,

    /// 软排序提示：本模块应先于这些模块加载
    #[serde(default, alias = "loadbefore")]
    pub load_before: Vec<String>,

    /// 制品位置（由发现阶段填写，对核心不透明）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl Descriptor {
    /// 创建新的模块描述
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            author: String::new(),
            info: String::new(),
            dependencies: Vec::new(),
            load_before: Vec::new(),
            artifact: None,
        }
    }

    /// 注册表键
    pub fn key(&self) -> String {
        module_key(&self.name)
    }

    /// 添加硬依赖
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// 添加软排序提示
    pub fn with_load_before(mut self, name: impl Into<String>) -> Self {
        self.load_before.push(name.into());
        self
    }

    /// 设置作者
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// 设置说明
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// 设置制品位置
    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// 是否声明了对指定模块的硬依赖
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
}

/// 模块生命周期状态
///
/// `Discovered -> Loaded -> Enabled -> Disabled` 为主路径，
/// `LoadFailed` 为终态，不会被自动重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 已发现但尚未加载
    Discovered,
    /// 已实例化
    Loaded,
    /// 已启用
    Enabled,
    /// 已停用（终态）
    Disabled,
    /// 加载失败（终态）
    LoadFailed,
}

impl Default for ModuleState {
    fn default() -> Self {
        ModuleState::Discovered
    }
}

impl ModuleState {
    /// 是否可以启用
    pub fn can_enable(&self) -> bool {
        matches!(self, ModuleState::Loaded)
    }

    /// 是否可以停用
    pub fn can_disable(&self) -> bool {
        matches!(self, ModuleState::Enabled)
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleState::Disabled | ModuleState::LoadFailed)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Discovered => "discovered",
            ModuleState::Loaded => "loaded",
            ModuleState::Enabled => "enabled",
            ModuleState::Disabled => "disabled",
            ModuleState::LoadFailed => "load_failed",
        };
        f.write_str(s)
    }
}

/// 模块级失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 处于或依赖于一个依赖环
    CyclicDependency,
    /// 依赖的模块不存在
    MissingDependency,
    /// 依赖的模块加载或启用失败
    DependencyFailed,
    /// 实例化失败
    InstantiationFailure,
    /// 启用钩子失败
    ActivationFailure,
    /// 停用钩子失败（非致命）
    DeactivationFailure,
    /// 同名模块已存在（视为无操作）
    DuplicateModule,
}

impl FailureKind {
    /// 该失败是否阻止模块继续推进生命周期
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            FailureKind::DeactivationFailure | FailureKind::DuplicateModule
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::CyclicDependency => "cyclic_dependency",
            FailureKind::MissingDependency => "missing_dependency",
            FailureKind::DependencyFailed => "dependency_failed",
            FailureKind::InstantiationFailure => "instantiation_failure",
            FailureKind::ActivationFailure => "activation_failure",
            FailureKind::DeactivationFailure => "deactivation_failure",
            FailureKind::DuplicateModule => "duplicate_module",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_key_is_case_insensitive() {
        assert_eq!(module_key("WorldEdit"), module_key("worldedit"));
        assert_eq!(Descriptor::new("Vault", "1.0.0").key(), "vault");
    }

    #[test]
    fn test_descriptor_builder() {
        let d = Descriptor::new("economy", "1.2.0")
            .with_dependency("Vault")
            .with_load_before("shop")
            .with_author("chips")
            .with_artifact("/plugins/economy");

        assert!(d.depends_on("vault"));
        assert!(!d.depends_on("shop"));
        assert_eq!(d.load_before, vec!["shop".to_string()]);
        assert_eq!(d.artifact, Some(PathBuf::from("/plugins/economy")));
    }

    #[test]
    fn test_descriptor_deserialize_aliases() {
        let yaml = r#"
name: chat
version: 0.3.0
description: chat formatting
depend: [permissions]
loadbefore: [essentials]
"#;
        let d: Descriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.info, "chat formatting");
        assert_eq!(d.dependencies, vec!["permissions".to_string()]);
        assert_eq!(d.load_before, vec!["essentials".to_string()]);
        assert!(d.artifact.is_none());
    }

    #[test]
    fn test_state_transitions() {
        assert!(ModuleState::Loaded.can_enable());
        assert!(!ModuleState::Enabled.can_enable());
        assert!(ModuleState::Enabled.can_disable());
        assert!(!ModuleState::Loaded.can_disable());
        assert!(ModuleState::LoadFailed.is_terminal());
        assert!(ModuleState::Disabled.is_terminal());
        assert_eq!(ModuleState::default(), ModuleState::Discovered);
    }

    #[test]
    fn test_failure_kind_blocking() {
        assert!(FailureKind::CyclicDependency.is_blocking());
        assert!(FailureKind::ActivationFailure.is_blocking());
        assert!(!FailureKind::DeactivationFailure.is_blocking());
        assert!(!FailureKind::DuplicateModule.is_blocking());
        assert_eq!(FailureKind::MissingDependency.to_string(), "missing_dependency");
    }
}
