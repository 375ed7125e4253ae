//! EventSink port - タスクイベント記録の抽象化
//!
//! # 実装
//! - NoopEventSink: 何もしない（デフォルト）
//! - TracingEventSink: `tracing` に出力
//! - ChannelEventSink: mpsc で呼び出し元に転送（テストや監視ループ用）
//!
//! worker から同期的に呼ばれるので、emit はブロックしてはいけません。

use tokio::sync::mpsc;

use crate::domain::{TaskEvent, TaskEventKind};

/// EventSink はタスクイベントを記録
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: TaskEvent) {}
}

/// Logs every event at `info` as structured fields.
///
/// action の失敗は worker 側でも `warn` で出力される。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: TaskEvent) {
        let task_id = event.task_id.to_string();
        match &event.kind {
            TaskEventKind::ActionFailed { tick, message }
            | TaskEventKind::ActionPanicked { tick, message } => {
                tracing::info!(%task_id, tick, failure = %message, "task event: action failure");
            }
            TaskEventKind::Stopped { reason } => {
                tracing::info!(%task_id, ?reason, "task event: stopped");
            }
            kind => tracing::info!(%task_id, ?kind, "task event"),
        }
    }
}

/// Forwards events over an unbounded channel.
///
/// 受信側が drop されていたら黙って捨てる。
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: TaskEvent) {
        // ignore send error: receiver may already be dropped
        let _ = self.tx.send(event);
    }
}
