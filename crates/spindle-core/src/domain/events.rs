//! Events - ControllableTask のライフサイクルイベント
//!
//! イベントは [`crate::ports::EventSink`] に送られます。
//! action の失敗（Err / panic）は呼び出し元へのイベントとして報告され、
//! プロセスをクラッシュさせません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// Why a task's worker exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// An action failure under `FailurePolicy::StopTask`.
    FailFast,
    /// Every handle to the task was dropped.
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEventKind {
    Started,
    Paused,
    Resumed,
    /// The action returned an error on `tick`.
    ActionFailed { tick: u64, message: String },
    /// The action panicked on `tick`.
    ActionPanicked { tick: u64, message: String },
    Stopped { reason: StopReason },
}

/// TaskEvent はタスクで発生したイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TaskEventKind,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, kind: TaskEventKind) -> Self {
        Self {
            task_id,
            at: Utc::now(),
            kind,
        }
    }
}
