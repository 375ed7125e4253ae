//! The per-task worker loop.
//!
//! - 制御状態は watch channel で受け取る（Sender が drop されたら終了）
//! - tick と状態変化を select で競合させるので、stop は次の tick を待たない
//! - action は spawn_blocking で実行し、完了を待ってから次の tick を観測する
//!   （同じタスクの action が並行に走ることはない）

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use super::action::{Action, panic_message};
use crate::config::FailurePolicy;
use crate::domain::stats::TaskCounters;
use crate::domain::{StopReason, TaskEvent, TaskEventKind, TaskId, TaskState, TaskStats};
use crate::ports::EventSink;

pub(crate) struct Worker {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) missed_tick: MissedTickBehavior,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) action: Action,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) counters: Arc<TaskCounters>,
    /// Weak so that dropping every task handle closes the channel.
    pub(crate) control: Weak<watch::Sender<TaskState>>,
    pub(crate) state_rx: watch::Receiver<TaskState>,
}

impl Worker {
    pub(crate) async fn run(mut self) -> TaskStats {
        // Duration::MAX などでも overflow しない（first tick は実質来ない）
        let first_tick = Instant::now()
            .checked_add(self.interval)
            .unwrap_or_else(far_future);
        let mut ticker = tokio::time::interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(self.missed_tick);

        tracing::debug!(
            task_id = %self.id,
            task = %self.name,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "task worker started"
        );

        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break StopReason::Detached;
                    }
                    if self.state_rx.borrow_and_update().is_terminal() {
                        break StopReason::Requested;
                    }
                    continue;
                }
            }

            let tick = self.counters.tick();
            let state = *self.state_rx.borrow_and_update();
            if state.is_terminal() {
                break StopReason::Requested;
            }
            if state.runs_action() {
                if !self.invoke(tick).await {
                    break StopReason::FailFast;
                }
            } else {
                self.counters.skip();
                tracing::trace!(task_id = %self.id, tick, "tick skipped while paused");
            }
        };

        // ticker は self と一緒にここで drop される
        let stats = self.counters.snapshot();
        tracing::debug!(
            task_id = %self.id,
            task = %self.name,
            ?reason,
            ticks = stats.ticks,
            runs = stats.runs,
            failures = stats.failures,
            "task worker exited"
        );
        self.sink
            .emit(TaskEvent::new(self.id, TaskEventKind::Stopped { reason }));
        stats
    }

    /// Run the action once. Returns `false` when the worker must stop.
    async fn invoke(&self, tick: u64) -> bool {
        let action = Arc::clone(&self.action);
        let outcome = tokio::task::spawn_blocking(move || action()).await;
        self.counters.run();

        let kind = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(message)) => {
                tracing::warn!(task_id = %self.id, task = %self.name, tick, error = %message, "task action failed");
                TaskEventKind::ActionFailed { tick, message }
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    join_err.to_string()
                };
                tracing::warn!(task_id = %self.id, task = %self.name, tick, panic = %message, "task action panicked");
                TaskEventKind::ActionPanicked { tick, message }
            }
        };

        self.counters.fail();
        self.sink.emit(TaskEvent::new(self.id, kind));

        match self.failure_policy {
            FailurePolicy::Isolate => true,
            FailurePolicy::StopTask => {
                if let Some(control) = self.control.upgrade() {
                    control.send_replace(TaskState::Stopped);
                }
                false
            }
        }
    }
}

/// Roughly 30 years from now.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}
