//! State - ControllableTask の制御状態
//!
//! 制御状態は独立した bool（stop / pause）ではなく単一の enum で表現し、
//! 書き込みはすべて [`TaskState::transition`] を通します。

use serde::{Deserialize, Serialize};

/// TaskState は ControllableTask の制御状態
///
/// # 状態遷移
/// - Created → Running: start
/// - Running → Paused: pause
/// - Paused → Running: restart（または start）
/// - Created / Running / Paused → Stopped: stop
/// - Stopped: 終端状態（遷移なし）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Running,
    Paused,
    Stopped,
}

/// Control request applied to a [`TaskState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start,
    Pause,
    Restart,
    Stop,
}

impl TaskState {
    /// Next state for `control`, or `None` when the request leaves the state unchanged.
    pub fn transition(self, control: Control) -> Option<TaskState> {
        use TaskState::*;
        match (self, control) {
            (Stopped, _) => None,
            (_, Control::Stop) => Some(Stopped),
            (Created | Paused, Control::Start) => Some(Running),
            (Running, Control::Pause) => Some(Paused),
            (Paused, Control::Restart) => Some(Running),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == TaskState::Stopped
    }

    /// Whether a tick observed in this state invokes the action.
    pub fn runs_action(self) -> bool {
        self == TaskState::Running
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Created => "created",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
