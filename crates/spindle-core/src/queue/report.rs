use serde::{Deserialize, Serialize};

use crate::domain::QueueId;

/// Why a queue worker exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Every producer handle was dropped. Normal shutdown.
    InputClosed,
    /// The consumer dropped its receiver; nothing could be delivered anymore.
    OutputClosed,
}

/// Summary returned by the queue worker when it exits.
///
/// `accepted == delivered + dropped` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReport {
    pub queue_id: QueueId,
    pub accepted: u64,
    pub delivered: u64,
    /// Items still buffered at exit. These are discarded, not flushed.
    pub dropped: u64,
    pub reason: ExitReason,
}
