//! 模块发现
//!
//! 发现阶段从环境中产出一组模块描述。核心只消费 [`Discovery`] 接口，
//! 描述从哪里来（目录清单、内置列表或远程仓库）由实现决定。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use super::metadata::Descriptor;
use super::parser::DescriptorParser;
use crate::utils::Result;

/// 默认清单文件名
pub const DEFAULT_MANIFEST_FILE: &str = "plugin.yaml";

/// 发现接口
#[async_trait]
pub trait Discovery: Send + Sync {
    /// 产出一次发现的所有描述
    ///
    /// 返回顺序即发现顺序，解析器用它作为无依赖关系模块之间的稳定顺序。
    async fn discover(&self) -> Result<Vec<Descriptor>>;
}

/// 固定列表发现
///
/// 直接返回预先给定的描述，适用于内置模块和测试。
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    descriptors: Vec<Descriptor>,
}

impl StaticDiscovery {
    /// 创建发现器
    pub fn new(descriptors: Vec<Descriptor>) -> Self {
        Self { descriptors }
    }

    /// 追加描述
    pub fn with(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover(&self) -> Result<Vec<Descriptor>> {
        Ok(self.descriptors.clone())
    }
}

/// 清单目录发现
///
/// 扫描每个模块目录下的子目录，子目录中存在清单文件即视为一个模块。
/// 清单无效的模块只记录警告并跳过；描述的 `artifact` 指向模块子目录。
#[derive(Debug, Clone)]
pub struct ManifestDiscovery {
    module_dirs: Vec<PathBuf>,
    manifest_file: String,
}

impl ManifestDiscovery {
    /// 创建发现器
    pub fn new(module_dirs: Vec<PathBuf>) -> Self {
        Self {
            module_dirs,
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
        }
    }

    /// 设置清单文件名
    pub fn with_manifest_file(mut self, manifest_file: impl Into<String>) -> Self {
        self.manifest_file = manifest_file.into();
        self
    }

    /// 扫描单个模块目录
    ///
    /// 子目录按路径排序，保证发现顺序在不同平台上一致。
    async fn scan_dir(&self, dir: &Path) -> Vec<Descriptor> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "无法读取模块目录");
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                candidates.push(path);
            }
        }
        candidates.sort();

        let mut descriptors = Vec::new();
        for path in candidates {
            let manifest = path.join(&self.manifest_file);
            if !manifest.is_file() {
                trace!(dir = ?path, "未找到清单文件，跳过");
                continue;
            }

            match DescriptorParser::parse_file(&manifest).await {
                Ok(descriptor) => {
                    debug!(module = %descriptor.name, dir = ?path, "发现模块");
                    descriptors.push(descriptor.with_artifact(path));
                }
                Err(e) => {
                    warn!(manifest = ?manifest, error = %e, "模块清单无效，跳过");
                }
            }
        }
        descriptors
    }
}

#[async_trait]
impl Discovery for ManifestDiscovery {
    async fn discover(&self) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();

        for dir in &self.module_dirs {
            if !dir.exists() {
                debug!(dir = ?dir, "模块目录不存在，跳过");
                continue;
            }
            descriptors.extend(self.scan_dir(dir).await);
        }

        info!(count = descriptors.len(), "模块发现完成");
        Ok(descriptors)
    }
}
