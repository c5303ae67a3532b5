//! 模块执行上下文
//!
//! 每个模块在加载时获得一个独立的执行上下文：一个取消令牌、一个任务跟踪器
//! 和一个 tracing span。模块内部派生的后台任务都应通过上下文派生，
//! 停用时由编排器统一取消并等待。

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info_span, warn, Instrument, Span};

/// 模块执行上下文
///
/// 由编排器拥有，模块只持有其克隆；克隆共享同一个取消范围。
/// 上下文的令牌是宿主根令牌的子令牌，宿主关闭时所有模块一并取消。
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    module: String,
    token: CancellationToken,
    tracker: TaskTracker,
    span: Span,
}

impl ExecutionContext {
    /// 在父令牌之下创建模块上下文
    pub fn new(module: impl Into<String>, parent: &CancellationToken) -> Self {
        let module = module.into();
        let span = info_span!("module", module = %module);
        Self {
            module,
            token: parent.child_token(),
            tracker: TaskTracker::new(),
            span,
        }
    }

    /// 所属模块名
    pub fn module(&self) -> &str {
        &self.module
    }

    /// 取消令牌（模块可在自己的 select! 中监听）
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 模块 span
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// 是否已被取消
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 在模块上下文中派生后台任务
    ///
    /// 任务在上下文取消时被中断，并计入停用时的等待范围。
    pub fn spawn<F>(&self, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => None,
                    out = future => Some(out),
                }
            }
            .instrument(self.span.clone()),
        )
    }

    /// 仍在运行的任务数
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// 取消上下文并等待模块任务结束
    ///
    /// 超过 `grace` 仍未结束的任务会被放弃等待（它们已收到取消信号）。
    /// 返回是否在期限内全部结束。
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.token.cancel();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                debug!(module = %self.module, "模块任务已全部结束");
                true
            }
            Err(_) => {
                warn!(
                    module = %self.module,
                    remaining = self.tracker.len(),
                    "模块任务未在期限内结束"
                );
                false
            }
        }
    }
}
