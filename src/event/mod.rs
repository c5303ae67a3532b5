//! 事件模块
//!
//! 包含事件值和按活动序列投递事件的广播器。

pub mod broadcaster;
pub mod event;

pub use broadcaster::{BroadcastOutcome, DispatchStats, EventBroadcaster};
pub use event::Event;
