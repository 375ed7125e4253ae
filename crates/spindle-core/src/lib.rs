//! spindle-core
//!
//! Concurrency primitives for the wallet toolkit.
//!
//! # モジュール構成
//! - **queue**: AsyncQueue（無制限 FIFO バッファで producer と consumer を分離）
//! - **task**: ControllableTask（start / pause / restart / stop 可能な定期実行）
//! - **domain**: ids, 制御状態, イベント, 統計
//! - **ports**: EventSink（イベントの送り先）
//! - **config**: JSON 設定
//! - **error**: エラー型
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the binary.

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod queue;
pub mod task;

pub use self::config::{FailurePolicy, MissedTick, QueueConfig, SpindleConfig, TaskConfig};
pub use self::domain::{TaskEvent, TaskEventKind, TaskId, TaskState, TaskStats};
pub use self::error::{ConfigError, SpindleError, TaskError};
pub use self::queue::{AsyncQueue, ExitReason, QueueReport};
pub use self::task::{ControllableTask, TaskBuilder};
