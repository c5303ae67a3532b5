//! 模块实例注册表
//!
//! 模块名（大小写不敏感）到模块记录的映射，是"某模块是否已加载/启用"的唯一事实来源。
//! 注册表不包含业务逻辑，只保证键唯一以及状态变化对并发读者原子可见。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::context::ExecutionContext;
use super::metadata::{module_key, Descriptor, ModuleState};
use super::runtime::ModuleHandle;

/// 模块记录
///
/// 每个成功实例化的模块对应一条记录，由注册表独占；
/// 读取方拿到的是克隆（描述、句柄和上下文均为共享引用）。
#[derive(Clone)]
pub struct ModuleRecord {
    /// 模块描述
    pub descriptor: Arc<Descriptor>,
    /// 模块实例
    pub handle: ModuleHandle,
    /// 模块执行上下文
    pub context: ExecutionContext,
    /// 当前状态
    pub state: ModuleState,
    /// 加载时间
    pub loaded_at: DateTime<Utc>,
    /// 启用时间
    pub enabled_at: Option<DateTime<Utc>>,
}

impl ModuleRecord {
    /// 创建处于 Loaded 状态的记录
    pub fn loaded(
        descriptor: Arc<Descriptor>,
        handle: ModuleHandle,
        context: ExecutionContext,
    ) -> Self {
        Self {
            descriptor,
            handle,
            context,
            state: ModuleState::Loaded,
            loaded_at: Utc::now(),
            enabled_at: None,
        }
    }

    /// 模块名
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.descriptor.name)
            .field("version", &self.descriptor.version)
            .field("state", &self.state)
            .field("loaded_at", &self.loaded_at)
            .field("enabled_at", &self.enabled_at)
            .finish()
    }
}

/// 模块实例注册表
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    /// 模块键 -> 模块记录
    records: RwLock<HashMap<String, ModuleRecord>>,
}

impl ModuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入记录
    ///
    /// 同名记录已存在时不覆盖，返回 `false`。
    pub async fn put(&self, record: ModuleRecord) -> bool {
        let key = record.descriptor.key();
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return false;
        }
        records.insert(key, record);
        true
    }

    /// 获取记录
    pub async fn get(&self, name: &str) -> Option<ModuleRecord> {
        let records = self.records.read().await;
        records.get(&module_key(name)).cloned()
    }

    /// 移除记录
    pub async fn remove(&self, name: &str) -> Option<ModuleRecord> {
        let mut records = self.records.write().await;
        records.remove(&module_key(name))
    }

    /// 是否包含模块
    pub async fn contains(&self, name: &str) -> bool {
        let records = self.records.read().await;
        records.contains_key(&module_key(name))
    }

    /// 获取模块状态
    pub async fn state(&self, name: &str) -> Option<ModuleState> {
        let records = self.records.read().await;
        records.get(&module_key(name)).map(|r| r.state)
    }

    /// 获取处于指定状态的记录
    pub async fn all_by_state(&self, state: ModuleState) -> Vec<ModuleRecord> {
        let records = self.records.read().await;
        records
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect()
    }

    /// 条件状态转换
    ///
    /// 仅当当前状态属于 `from` 时转换为 `to`，返回转换前的记录。
    /// 检查与写入在同一把写锁内完成，并发的重复转换只有一个会成功。
    pub async fn transition(
        &self,
        name: &str,
        from: &[ModuleState],
        to: ModuleState,
    ) -> Option<ModuleRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&module_key(name))?;
        if !from.contains(&record.state) {
            return None;
        }

        let previous = record.clone();
        record.state = to;
        if to == ModuleState::Enabled {
            record.enabled_at = Some(Utc::now());
        }
        Some(previous)
    }

    /// 所有模块名
    pub async fn names(&self) -> Vec<String> {
        let records = self.records.read().await;
        let mut names: Vec<String> = records.values().map(|r| r.name().to_string()).collect();
        names.sort_unstable();
        names
    }

    /// 记录数量
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// 是否为空
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::runtime::Plugin;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        async fn on_enable(&self, _context: &ExecutionContext) -> anyhow::Result<()> {
            Ok(())
        }

        async fn on_disable(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn record(name: &str) -> ModuleRecord {
        let root = CancellationToken::new();
        ModuleRecord::loaded(
            Arc::new(Descriptor::new(name, "1.0.0")),
            Arc::new(Noop),
            ExecutionContext::new(name, &root),
        )
    }

    #[tokio::test]
    async fn test_put_and_get_case_insensitive() {
        let registry = ModuleRegistry::new();
        assert!(registry.put(record("WorldGuard")).await);

        assert!(registry.contains("worldguard").await);
        let found = registry.get("WORLDGUARD").await.unwrap();
        assert_eq!(found.name(), "WorldGuard");
        assert_eq!(found.state, ModuleState::Loaded);
    }

    #[tokio::test]
    async fn test_put_keeps_existing() {
        let registry = ModuleRegistry::new();
        assert!(registry.put(record("a")).await);
        assert!(!registry.put(record("A")).await);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("a").await.unwrap().name(), "a");
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = ModuleRegistry::new();
        registry.put(record("a")).await;
        assert!(registry.remove("A").await.is_some());
        assert!(registry.remove("a").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let registry = ModuleRegistry::new();
        registry.put(record("a")).await;

        let previous = registry
            .transition("a", &[ModuleState::Loaded], ModuleState::Enabled)
            .await
            .unwrap();
        assert_eq!(previous.state, ModuleState::Loaded);
        assert!(registry.get("a").await.unwrap().enabled_at.is_some());

        assert!(registry
            .transition("a", &[ModuleState::Loaded], ModuleState::Enabled)
            .await
            .is_none());
        assert!(registry
            .transition("missing", &[ModuleState::Loaded], ModuleState::Enabled)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_all_by_state() {
        let registry = ModuleRegistry::new();
        registry.put(record("a")).await;
        registry.put(record("b")).await;
        registry.put(record("c")).await;
        registry
            .transition("b", &[ModuleState::Loaded], ModuleState::Enabled)
            .await;

        assert_eq!(registry.all_by_state(ModuleState::Loaded).await.len(), 2);
        let enabled = registry.all_by_state(ModuleState::Enabled).await;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name(), "b");
        assert_eq!(registry.names().await, vec!["a", "b", "c"]);
    }
}
