//! 模块描述解析器
//!
//! 负责从 plugin.yaml 清单解析并验证模块描述。

use std::path::Path;

use crate::module::metadata::Descriptor;
use crate::utils::{PluginError, Result};

/// 模块描述解析器
#[derive(Debug, Clone, Default)]
pub struct DescriptorParser;

impl DescriptorParser {
    /// 创建新的解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 从文件解析模块描述
    ///
    /// # Errors
    ///
    /// - 文件不存在或无法读取时返回 IO 错误
    /// - 文件内容不符合 YAML 格式时返回 YAML 错误
    /// - 描述验证失败时返回 `InvalidDescriptor` 错误
    pub async fn parse_file(path: &Path) -> Result<Descriptor> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_string(&content)
    }

    /// 从文件同步解析模块描述
    pub fn parse_file_sync(path: &Path) -> Result<Descriptor> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_string(&content)
    }

    /// 从 YAML 字符串解析模块描述
    pub fn parse_string(content: &str) -> Result<Descriptor> {
        let descriptor: Descriptor = serde_yaml::from_str(content)?;
        Self::validate(&descriptor)?;
        Ok(descriptor)
    }

    /// 验证模块描述
    ///
    /// 执行以下验证：
    /// - 模块名非空且格式有效
    /// - 版本号为 semver 格式
    /// - 依赖名非空且格式有效，load_before 中没有空名称
    ///
    /// 所有问题合并为一个 `InvalidDescriptor` 错误返回。
    pub fn validate(descriptor: &Descriptor) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if descriptor.name.is_empty() {
            errors.push("模块名不能为空".to_string());
        } else if !Self::is_valid_module_name(&descriptor.name) {
            errors.push(format!(
                "模块名 '{}' 格式无效，只允许字母开头的字母、数字、下划线和连字符",
                descriptor.name
            ));
        }

        if descriptor.version.is_empty() {
            errors.push("模块版本号不能为空".to_string());
        } else if semver::Version::parse(&descriptor.version).is_err() {
            errors.push(format!(
                "无效的版本号格式 '{}', 请使用 semver 格式 (如 1.0.0)",
                descriptor.version
            ));
        }

        for (index, dep) in descriptor.dependencies.iter().enumerate() {
            if dep.trim().is_empty() {
                errors.push(format!("第 {} 个依赖的模块名不能为空", index + 1));
            } else if !Self::is_valid_module_name(dep) {
                errors.push(format!("依赖 '{}' 的模块名格式无效", dep));
            }
        }

        for (index, name) in descriptor.load_before.iter().enumerate() {
            if name.trim().is_empty() {
                errors.push(format!("第 {} 个 load_before 条目不能为空", index + 1));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PluginError::InvalidDescriptor(format!(
                "{}: {}",
                descriptor.name,
                errors.join("; ")
            )))
        }
    }

    /// 检查模块名格式是否有效
    ///
    /// 有效格式：字母开头，只包含字母、数字、下划线和连字符
    fn is_valid_module_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}
