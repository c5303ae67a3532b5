//! 活动序列
//!
//! 已启用模块按实际启用顺序组成的有序列表。广播按此顺序投递，
//! 全量关闭时按其逆序拆除，使依赖方先于被依赖方停用。
//!
//! 遍历通过快照进行：读者拿到某一时刻的名单副本，期间发生的追加或移除
//! 不会破坏正在进行的遍历。

use tokio::sync::RwLock;

use super::metadata::module_key;

/// 活动序列
#[derive(Debug, Default)]
pub struct ActiveSequence {
    names: RwLock<Vec<String>>,
}

impl ActiveSequence {
    /// 创建空序列
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加模块名
    ///
    /// 名称已存在（大小写不敏感）时不重复追加，返回 `false`。
    pub async fn push(&self, name: &str) -> bool {
        let mut names = self.names.write().await;
        let key = module_key(name);
        if names.iter().any(|n| module_key(n) == key) {
            return false;
        }
        names.push(name.to_string());
        true
    }

    /// 按值移除
    pub async fn remove(&self, name: &str) -> bool {
        let mut names = self.names.write().await;
        let before = names.len();
        let key = module_key(name);
        names.retain(|n| module_key(n) != key);
        names.len() != before
    }

    /// 是否包含
    pub async fn contains(&self, name: &str) -> bool {
        let names = self.names.read().await;
        let key = module_key(name);
        names.iter().any(|n| module_key(n) == key)
    }

    /// 启用顺序快照
    pub async fn snapshot(&self) -> Vec<String> {
        self.names.read().await.clone()
    }

    /// 拆除顺序快照（启用顺序的逆序）
    pub async fn teardown_order(&self) -> Vec<String> {
        let mut names = self.snapshot().await;
        names.reverse();
        names
    }

    /// 长度
    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    /// 是否为空
    pub async fn is_empty(&self) -> bool {
        self.names.read().await.is_empty()
    }
}
