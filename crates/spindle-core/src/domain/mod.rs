//! Domain model (ids, control state, events, stats).

pub mod events;
pub mod ids;
pub mod state;
pub mod stats;

pub use self::events::{StopReason, TaskEvent, TaskEventKind};
pub use self::ids::{QueueId, TaskId};
pub use self::state::{Control, TaskState};
pub use self::stats::TaskStats;
