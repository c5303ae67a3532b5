//! 事件数据结构
//!
//! 事件对核心是不透明的：类型和载荷只由模块的事件钩子解释。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识
    pub event_id: String,

    /// 事件类型（如 command.execute）
    pub event_type: String,

    /// 发送方（宿主或模块名）
    pub sender: String,

    /// 事件载荷
    #[serde(default)]
    pub payload: Value,

    /// 事件时间戳
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// 创建新事件
    pub fn new(event_type: impl Into<String>, sender: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            sender: sender.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// 创建命令事件
    ///
    /// 载荷为 `{"command": ..., "args": [...]}`。
    pub fn command(sender: impl Into<String>, command: &str, args: &[&str]) -> Self {
        Self::new(
            "command.execute",
            sender,
            serde_json::json!({ "command": command, "args": args }),
        )
    }

    /// 命令名（仅命令事件）
    pub fn command_name(&self) -> Option<&str> {
        if self.event_type != "command.execute" {
            return None;
        }
        self.payload.get("command").and_then(Value::as_str)
    }
}
