//! 事件广播器
//!
//! 按活动序列顺序把事件投递给每个已启用模块。
//!
//! - **顺序投递**: 严格按启用顺序，一次一个模块
//! - **订阅者隔离**: 单个模块的错误或 panic 只被记录，不影响后续模块
//! - **快照语义**: 投递名单在广播开始时确定，期间的启用/停用不破坏遍历

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::event::Event;
use crate::module::active::ActiveSequence;
use crate::module::metadata::ModuleState;
use crate::module::registry::ModuleRegistry;
use crate::module::runtime::isolate;

/// 分发统计信息
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// 总分发次数
    pub total_dispatched: u64,

    /// 成功分发次数
    pub successful: u64,

    /// 失败分发次数
    pub failed: u64,

    /// 超时次数
    pub timeouts: u64,

    /// 最后分发时间
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// 单次广播结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// 广播开始时活动序列的长度
    pub recipients: usize,
    /// 成功处理的模块
    pub delivered: Vec<String>,
    /// 处理失败的模块
    pub failed: Vec<String>,
    /// 处理超时的模块
    pub timed_out: Vec<String>,
    /// 广播期间已被停用而跳过的模块
    pub skipped: Vec<String>,
}

impl BroadcastOutcome {
    /// 实际调用了处理钩子的次数
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len() + self.timed_out.len()
    }
}

/// 事件广播器
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<ModuleRegistry>,
    active: Arc<ActiveSequence>,
    handler_timeout: Option<Duration>,
    stats: Arc<RwLock<DispatchStats>>,
}

impl EventBroadcaster {
    /// 创建广播器
    ///
    /// `handler_timeout` 仅约束事件处理钩子，`None` 表示不设超时。
    pub fn new(
        registry: Arc<ModuleRegistry>,
        active: Arc<ActiveSequence>,
        handler_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            active,
            handler_timeout,
            stats: Arc::new(RwLock::new(DispatchStats::default())),
        }
    }

    /// 广播事件
    pub async fn broadcast(&self, event: &Event) -> BroadcastOutcome {
        let recipients = self.active.snapshot().await;
        trace!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            sender = %event.sender,
            recipients = recipients.len(),
            "广播事件"
        );

        let mut outcome = BroadcastOutcome {
            recipients: recipients.len(),
            ..Default::default()
        };

        for name in recipients {
            let record = match self.registry.get(&name).await {
                Some(record) if record.state == ModuleState::Enabled => record,
                _ => {
                    debug!(module = %name, "模块已不在启用状态，跳过");
                    outcome.skipped.push(name);
                    continue;
                }
            };

            let handler = isolate(record.handle.on_event(event));
            let result = match self.handler_timeout {
                Some(limit) => match timeout(limit, handler).await {
                    Ok(result) => result.map_err(Some),
                    Err(_) => Err(None),
                },
                None => handler.await.map_err(Some),
            };

            match result {
                Ok(()) => outcome.delivered.push(name),
                Err(Some(reason)) => {
                    warn!(
                        module = %name,
                        event_type = %event.event_type,
                        error = %reason,
                        "事件处理失败"
                    );
                    outcome.failed.push(name);
                }
                Err(None) => {
                    warn!(module = %name, event_type = %event.event_type, "事件处理超时");
                    outcome.timed_out.push(name);
                }
            }
        }

        self.record(&outcome).await;
        outcome
    }

    async fn record(&self, outcome: &BroadcastOutcome) {
        let mut stats = self.stats.write().await;
        stats.total_dispatched += outcome.attempted() as u64;
        stats.successful += outcome.delivered.len() as u64;
        stats.failed += outcome.failed.len() as u64;
        stats.timeouts += outcome.timed_out.len() as u64;
        stats.last_dispatch_at = Some(Utc::now());
    }

    /// 获取统计信息
    pub async fn stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }

    /// 重置统计信息
    pub async fn reset_stats(&self) {
        *self.stats.write().await = DispatchStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::context::ExecutionContext;
    use crate::module::metadata::Descriptor;
    use crate::module::registry::ModuleRecord;
    use crate::module::runtime::{ModuleHandle, Plugin};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Listener {
        received: AtomicUsize,
        fail: bool,
        panic: bool,
        stall: bool,
    }

    #[async_trait]
    impl Plugin for Listener {
        async fn on_enable(&self, _context: &ExecutionContext) -> anyhow::Result<()> {
            Ok(())
        }

        async fn on_disable(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn on_event(&self, _event: &Event) -> anyhow::Result<()> {
            self.received.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("listener panicked");
            }
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail {
                anyhow::bail!("listener failed");
            }
            Ok(())
        }
    }

    async fn enable(
        registry: &ModuleRegistry,
        active: &ActiveSequence,
        name: &str,
        listener: Arc<Listener>,
    ) {
        let root = CancellationToken::new();
        let handle: ModuleHandle = listener;
        let mut record = ModuleRecord::loaded(
            Arc::new(Descriptor::new(name, "1.0.0")),
            handle,
            ExecutionContext::new(name, &root),
        );
        record.state = ModuleState::Enabled;
        registry.put(record).await;
        active.push(name).await;
    }

    fn setup() -> (Arc<ModuleRegistry>, Arc<ActiveSequence>) {
        (Arc::new(ModuleRegistry::new()), Arc::new(ActiveSequence::new()))
    }

    #[tokio::test]
    async fn test_broadcast_in_activation_order() {
        let (registry, active) = setup();
        let a = Arc::new(Listener::default());
        let b = Arc::new(Listener::default());
        enable(&registry, &active, "b", b.clone()).await;
        enable(&registry, &active, "a", a.clone()).await;

        let broadcaster = EventBroadcaster::new(registry, active, None);
        let outcome = broadcaster
            .broadcast(&Event::new("server.tick", "host", json!({})))
            .await;

        assert_eq!(outcome.recipients, 2);
        assert_eq!(outcome.delivered, vec!["b", "a"]);
        assert_eq!(a.received.load(Ordering::SeqCst), 1);
        assert_eq!(b.received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_isolation() {
        let (registry, active) = setup();
        let failing = Arc::new(Listener {
            fail: true,
            ..Default::default()
        });
        let panicking = Arc::new(Listener {
            panic: true,
            ..Default::default()
        });
        let healthy = Arc::new(Listener::default());
        enable(&registry, &active, "failing", failing).await;
        enable(&registry, &active, "panicking", panicking).await;
        enable(&registry, &active, "healthy", healthy.clone()).await;

        let broadcaster = EventBroadcaster::new(registry.clone(), active.clone(), None);
        let outcome = broadcaster
            .broadcast(&Event::command("console", "list", &[]))
            .await;

        assert_eq!(outcome.attempted(), 3);
        assert_eq!(outcome.failed, vec!["failing", "panicking"]);
        assert_eq!(outcome.delivered, vec!["healthy"]);
        assert_eq!(healthy.received.load(Ordering::SeqCst), 1);

        // 失败不影响模块状态
        assert_eq!(registry.state("failing").await, Some(ModuleState::Enabled));
        assert_eq!(active.len().await, 3);

        let stats = broadcaster.stats().await;
        assert_eq!(stats.total_dispatched, 3);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let (registry, active) = setup();
        let slow = Arc::new(Listener {
            stall: true,
            ..Default::default()
        });
        let fast = Arc::new(Listener::default());
        enable(&registry, &active, "slow", slow).await;
        enable(&registry, &active, "fast", fast.clone()).await;

        let broadcaster =
            EventBroadcaster::new(registry, active, Some(Duration::from_millis(20)));
        let outcome = broadcaster
            .broadcast(&Event::new("server.tick", "host", json!({})))
            .await;

        assert_eq!(outcome.timed_out, vec!["slow"]);
        assert_eq!(outcome.delivered, vec!["fast"]);
        assert_eq!(broadcaster.stats().await.timeouts, 1);
    }

    #[tokio::test]
    async fn test_skips_modules_no_longer_enabled() {
        let (registry, active) = setup();
        enable(&registry, &active, "a", Arc::new(Listener::default())).await;
        active.push("ghost").await;

        let broadcaster = EventBroadcaster::new(registry, active, None);
        let outcome = broadcaster
            .broadcast(&Event::new("server.tick", "host", json!({})))
            .await;

        assert_eq!(outcome.recipients, 2);
        assert_eq!(outcome.delivered, vec!["a"]);
        assert_eq!(outcome.skipped, vec!["ghost"]);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let (registry, active) = setup();
        enable(&registry, &active, "a", Arc::new(Listener::default())).await;
        let broadcaster = EventBroadcaster::new(registry, active, None);

        broadcaster
            .broadcast(&Event::new("server.tick", "host", json!({})))
            .await;
        assert_eq!(broadcaster.stats().await.total_dispatched, 1);

        broadcaster.reset_stats().await;
        let stats = broadcaster.stats().await;
        assert_eq!(stats.total_dispatched, 0);
        assert!(stats.last_dispatch_at.is_none());
    }
}
