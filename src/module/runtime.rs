//! 模块运行时接口
//!
//! 定义外部协作者的接口边界：模块加载器负责把描述变成可执行的模块实例，
//! 模块实例暴露启用、停用和事件处理钩子。核心不关心实例的具体来源
//! （动态库、脚本引擎或内置代码）。

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use super::context::ExecutionContext;
use super::metadata::{module_key, Descriptor};
use crate::event::Event;
use crate::utils::{PluginError, Result};

/// 模块实例钩子
///
/// 钩子返回 `anyhow::Result`，错误和 panic 都会被编排器捕获并按模块隔离。
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 启用钩子
    async fn on_enable(&self, context: &ExecutionContext) -> anyhow::Result<()>;

    /// 停用钩子
    async fn on_disable(&self) -> anyhow::Result<()>;

    /// 事件处理钩子，默认忽略事件
    async fn on_event(&self, _event: &Event) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 模块句柄
pub type ModuleHandle = Arc<dyn Plugin>;

/// 模块加载器接口
///
/// 平台相关的实例化机制实现此接口。
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// 把描述实例化为模块句柄
    ///
    /// `context` 为该模块专属的执行上下文，实例可以保留其克隆。
    async fn instantiate(
        &self,
        descriptor: &Descriptor,
        context: &ExecutionContext,
    ) -> Result<ModuleHandle>;
}

/// 模块工厂函数类型
pub type ModuleFactory =
    Arc<dyn Fn(&Descriptor, &ExecutionContext) -> anyhow::Result<ModuleHandle> + Send + Sync>;

/// 内置模块加载器
///
/// 按模块名查找预先注册的工厂函数，适用于编译进宿主的模块和测试。
#[derive(Default, Clone)]
pub struct StaticModuleLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl StaticModuleLoader {
    /// 创建空加载器
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工厂函数
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Descriptor, &ExecutionContext) -> anyhow::Result<ModuleHandle>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(module_key(name), Arc::new(factory));
        self
    }

    /// 注册一个始终返回同一实例的工厂
    pub fn register_instance(&mut self, name: &str, handle: ModuleHandle) -> &mut Self {
        self.register(name, move |_, _| Ok(handle.clone()))
    }

    /// 是否存在工厂
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&module_key(name))
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn instantiate(
        &self,
        descriptor: &Descriptor,
        context: &ExecutionContext,
    ) -> Result<ModuleHandle> {
        let factory = self
            .factories
            .get(&descriptor.key())
            .ok_or_else(|| PluginError::instantiation(&descriptor.name, "未注册的模块工厂"))?;

        factory(descriptor, context).map_err(|e| PluginError::instantiation(&descriptor.name, e))
    }
}

/// 隔离执行一个钩子
///
/// 钩子返回的错误与钩子内部的 panic 都被转换为失败原因，不会越过调用方。
pub(crate) async fn isolate<F>(hook: F) -> std::result::Result<(), String>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

/// 提取 panic 载荷中的消息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn test_static_loader_instantiates() {
        let mut loader = StaticModuleLoader::new();
        loader.register("Noop", |_, _| Ok(Arc::new(Noop) as ModuleHandle));
        assert!(loader.contains("noop"));

        let root = CancellationToken::new();
        let descriptor = Descriptor::new("noop", "1.0.0");
        let ctx = ExecutionContext::new("noop", &root);
        let handle = loader.instantiate(&descriptor, &ctx).await.unwrap();
        assert!(handle.on_event(&Event::new("ping", "test", serde_json::json!({}))).await.is_ok());
    }

    #[tokio::test]
    async fn test_isolate_catches_error_and_panic() {
        assert!(isolate(async { Ok(()) }).await.is_ok());

        let err = isolate(async { Err(anyhow::anyhow!("disk full")) }).await.unwrap_err();
        assert_eq!(err, "disk full");

        let err = isolate(async {
            if true {
                panic!("listener exploded");
            }
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err, "panic: listener exploded");
    }

    #[tokio::test]
    async fn test_static_loader_unknown_module() {
        let loader = StaticModuleLoader::new();
        let root = CancellationToken::new();
        let descriptor = Descriptor::new("ghost", "1.0.0");
        let ctx = ExecutionContext::new("ghost", &root);

        let err = loader.instantiate(&descriptor, &ctx).await.err().unwrap();
        assert!(matches!(err, PluginError::InstantiationFailure { .. }));
    }

    #[tokio::test]
    async fn test_static_loader_factory_error() {
        let mut loader = StaticModuleLoader::new();
        loader.register("broken", |_, _| Err(anyhow::anyhow!("missing entry class")));

        let root = CancellationToken::new();
        let descriptor = Descriptor::new("broken", "1.0.0");
        let ctx = ExecutionContext::new("broken", &root);

        let err = loader.instantiate(&descriptor, &ctx).await.err().unwrap();
        assert!(err.to_string().contains("missing entry class"));
    }
}
