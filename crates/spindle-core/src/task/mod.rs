//! ControllableTask: run an action on a fixed interval with pause / restart / stop.
//!
//! # 状態遷移
//! Created → Running (start) → Paused (pause) → Running (restart) → ... → Stopped (stop)
//!
//! Stopped は終端状態。stop 後の start / restart は `TaskError::Stopped` を返し、
//! タスクは再開しない。
//!
//! # 並行性
//! - 制御状態は単一の enum を watch channel に保持（独立した bool は持たない）
//! - worker はタスクごとに 1 つ。action の呼び出しは重ならない
//! - pause / stop は実行中の action を中断しない
//! - action の panic は tick 単位で隔離される（`FailurePolicy`）

mod action;
mod worker;

pub use self::action::IntoActionResult;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use self::action::Action;
use self::worker::Worker;
use crate::config::{FailurePolicy, MissedTick, TaskConfig};
use crate::domain::stats::TaskCounters;
use crate::domain::{Control, StopReason, TaskEvent, TaskEventKind, TaskId, TaskState, TaskStats};
use crate::error::TaskError;
use crate::ports::{EventSink, NoopEventSink};

/// Builder for [`ControllableTask`].
///
/// # 使用例
/// ```ignore
/// let task = ControllableTask::builder(Duration::from_secs(5))
///     .name("balance-refresh")
///     .failure_policy(FailurePolicy::StopTask)
///     .build(|| refresh_balances())?;
/// task.start()?;
/// ```
pub struct TaskBuilder {
    interval: Duration,
    name: Option<String>,
    failure_policy: FailurePolicy,
    missed_tick: MissedTick,
    sink: Arc<dyn EventSink>,
}

impl TaskBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn missed_tick(mut self, missed_tick: MissedTick) -> Self {
        self.missed_tick = missed_tick;
        self
    }

    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Build the task. Nothing ticks until [`ControllableTask::start`].
    ///
    /// # Errors
    /// `TaskError::InvalidInterval` if the interval is zero.
    pub fn build<F, R>(self, action: F) -> Result<ControllableTask, TaskError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoActionResult,
    {
        if self.interval.is_zero() {
            return Err(TaskError::InvalidInterval);
        }

        let id = TaskId::generate();
        let (state, _) = watch::channel(TaskState::Created);
        Ok(ControllableTask {
            id,
            name: self.name.unwrap_or_else(|| id.to_string()),
            interval: self.interval,
            failure_policy: self.failure_policy,
            missed_tick: self.missed_tick,
            action: action::erase(action),
            sink: self.sink,
            state: Arc::new(state),
            counters: Arc::new(TaskCounters::default()),
            worker: Mutex::new(None),
        })
    }
}

/// A periodic task with runtime pause / restart / stop control.
///
/// All control methods take `&self`; share the task across threads with `Arc`.
/// Dropping the last handle stops the worker.
pub struct ControllableTask {
    id: TaskId,
    name: String,
    interval: Duration,
    failure_policy: FailurePolicy,
    missed_tick: MissedTick,
    action: Action,
    sink: Arc<dyn EventSink>,
    state: Arc<watch::Sender<TaskState>>,
    counters: Arc<TaskCounters>,
    worker: Mutex<Option<JoinHandle<TaskStats>>>,
}

impl ControllableTask {
    /// Create a task with default settings. Does not start ticking.
    pub fn new<F, R>(interval: Duration, action: F) -> Result<Self, TaskError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoActionResult,
    {
        Self::builder(interval).build(action)
    }

    pub fn builder(interval: Duration) -> TaskBuilder {
        TaskBuilder {
            interval,
            name: None,
            failure_policy: FailurePolicy::default(),
            missed_tick: MissedTick::default(),
            sink: Arc::new(NoopEventSink),
        }
    }

    /// Builder pre-filled from a [`TaskConfig`].
    pub fn builder_from_config(config: &TaskConfig) -> TaskBuilder {
        Self::builder(config.interval())
            .name(config.name.clone())
            .failure_policy(config.failure_policy)
            .missed_tick(config.missed_tick)
    }

    pub fn from_config<F, R>(config: &TaskConfig, action: F) -> Result<Self, TaskError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoActionResult,
    {
        Self::builder_from_config(config).build(action)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking.
    ///
    /// The first call spawns the worker on the current tokio runtime. Later
    /// calls never spawn a second worker; on a paused task they resume it.
    ///
    /// # Errors
    /// - `TaskError::Stopped` if the task was stopped
    /// - `TaskError::NoRuntime` if called outside a tokio runtime before the first start
    pub fn start(&self) -> Result<(), TaskError> {
        let runtime = Handle::try_current();
        if runtime.is_err() && self.state() == TaskState::Created {
            return Err(TaskError::NoRuntime);
        }

        match self.apply(Control::Start)? {
            TaskState::Created => {
                let runtime = runtime.map_err(|_| TaskError::NoRuntime)?;
                self.spawn_worker(&runtime);
                tracing::info!(task_id = %self.id, task = %self.name, "task started");
                self.emit(TaskEventKind::Started);
            }
            TaskState::Paused => self.emit(TaskEventKind::Resumed),
            _ => {}
        }
        Ok(())
    }

    /// Stop invoking the action on subsequent ticks. The trigger keeps firing.
    ///
    /// # Errors
    /// `TaskError::Stopped` if the task was stopped.
    pub fn pause(&self) -> Result<(), TaskError> {
        if self.apply(Control::Pause)? == TaskState::Running {
            tracing::debug!(task_id = %self.id, task = %self.name, "task paused");
            self.emit(TaskEventKind::Paused);
        }
        Ok(())
    }

    /// Resume a paused task from the next tick. No effect unless paused.
    ///
    /// # Errors
    /// `TaskError::Stopped` if the task was stopped.
    pub fn restart(&self) -> Result<(), TaskError> {
        if self.apply(Control::Restart)? == TaskState::Paused {
            tracing::debug!(task_id = %self.id, task = %self.name, "task resumed");
            self.emit(TaskEventKind::Resumed);
        }
        Ok(())
    }

    /// Stop the task permanently. Idempotent.
    ///
    /// The worker exits as soon as it observes the change; an action that is
    /// already running finishes first.
    pub fn stop(&self) {
        let previous = *self.state.borrow();
        if previous.is_terminal() {
            return;
        }
        if let Ok(TaskState::Created) = self.apply(Control::Stop) {
            // no worker to report the stop
            self.emit(TaskEventKind::Stopped {
                reason: StopReason::Requested,
            });
        }
        tracing::info!(task_id = %self.id, task = %self.name, "task stop requested");
    }

    /// `false` when paused or stopped, `true` otherwise. Best-effort read.
    pub fn running(&self) -> bool {
        !matches!(self.state(), TaskState::Paused | TaskState::Stopped)
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> TaskStats {
        self.counters.snapshot()
    }

    /// Wait for the worker to exit. Returns `None` if the task never started
    /// or was already joined.
    pub async fn join(&self) -> Option<TaskStats> {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        handle?.await.ok()
    }

    pub async fn stop_and_join(&self) -> Option<TaskStats> {
        self.stop();
        self.join().await
    }

    /// Apply `control` atomically, returning the state it was applied to.
    fn apply(&self, control: Control) -> Result<TaskState, TaskError> {
        let mut previous = TaskState::Created;
        self.state.send_if_modified(|state| {
            previous = *state;
            match state.transition(control) {
                Some(next) => {
                    *state = next;
                    true
                }
                None => false,
            }
        });

        if previous.is_terminal() {
            return Err(TaskError::Stopped(self.id));
        }
        Ok(previous)
    }

    fn spawn_worker(&self, runtime: &Handle) {
        let worker = Worker {
            id: self.id,
            name: self.name.clone(),
            interval: self.interval,
            missed_tick: self.missed_tick.into(),
            failure_policy: self.failure_policy,
            action: Arc::clone(&self.action),
            sink: Arc::clone(&self.sink),
            counters: Arc::clone(&self.counters),
            control: Arc::downgrade(&self.state),
            state_rx: self.state.subscribe(),
        };
        let join = runtime.spawn(worker.run());
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(join);
    }

    fn emit(&self, kind: TaskEventKind) {
        self.sink.emit(TaskEvent::new(self.id, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ChannelEventSink;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    const TICK: Duration = Duration::from_millis(100);

    fn counting_task() -> (ControllableTask, Arc<AtomicU64>) {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let task = ControllableTask::new(TICK, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (task, counter)
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = ControllableTask::new(Duration::ZERO, || {}).err();
        assert_eq!(err, Some(TaskError::InvalidInterval));
    }

    #[test]
    fn start_outside_runtime_fails_without_side_effects() {
        let (task, _) = counting_task();
        assert_eq!(task.start(), Err(TaskError::NoRuntime));
        assert_eq!(task.state(), TaskState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn new_task_is_inert_until_started() {
        let (task, counter) = counting_task();
        tokio::time::sleep(TICK * 5).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(task.state(), TaskState::Created);
        assert!(task.running());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_interval() {
        let (task, counter) = counting_task();
        task.start().unwrap();

        tokio::time::sleep(Duration::from_millis(1050)).await;

        let count = counter.load(Ordering::SeqCst);
        assert!((9..=11).contains(&count), "count = {count}");
        assert_eq!(task.stats().runs, count);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_suppresses_action_and_restart_resumes() {
        let (task, counter) = counting_task();
        task.start().unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        task.pause().unwrap();
        assert!(!task.running());
        let paused_at = counter.load(Ordering::SeqCst);
        assert_eq!(paused_at, 2);

        tokio::time::sleep(TICK * 3).await;
        assert_eq!(counter.load(Ordering::SeqCst), paused_at);
        assert!(task.stats().skipped >= 2);

        task.restart().unwrap();
        assert!(task.running());
        tokio::time::sleep(TICK * 3).await;
        assert!(counter.load(Ordering::SeqCst) > paused_at);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_terminal() {
        let (task, counter) = counting_task();
        task.start().unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        task.stop();
        let stopped_at = counter.load(Ordering::SeqCst);
        assert!(!task.running());

        assert_eq!(task.start(), Err(TaskError::Stopped(task.id())));
        assert_eq!(task.restart(), Err(TaskError::Stopped(task.id())));
        assert_eq!(task.pause(), Err(TaskError::Stopped(task.id())));

        tokio::time::sleep(TICK * 5).await;
        assert_eq!(counter.load(Ordering::SeqCst), stopped_at);
        assert_eq!(task.state(), TaskState::Stopped);
        assert!(!task.running());

        let stats = task.join().await.expect("worker joins after stop");
        assert_eq!(stats.runs, stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_never_spawns() {
        let (task, counter) = counting_task();
        task.stop();
        assert_eq!(task.start(), Err(TaskError::Stopped(task.id())));

        tokio::time::sleep(TICK * 3).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(task.join().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_spawns_one_worker() {
        let (task, counter) = counting_task();
        task.start().unwrap();
        task.start().unwrap();
        task.start().unwrap();

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn start_resumes_a_paused_task() {
        let (task, counter) = counting_task();
        task.start().unwrap();
        task.pause().unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        task.start().unwrap();
        assert_eq!(task.state(), TaskState::Running);
        tokio::time::sleep(TICK * 2).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_action_is_isolated() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let (sink, mut events) = ChannelEventSink::new();
        let task = ControllableTask::builder(TICK)
            .event_sink(sink)
            .build(move || {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first tick blows up");
                }
            })
            .unwrap();

        task.start().unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(task.state(), TaskState::Running);
        assert_eq!(task.stats().failures, 1);

        assert_eq!(events.recv().await.unwrap().kind, TaskEventKind::Started);
        assert_eq!(
            events.recv().await.unwrap().kind,
            TaskEventKind::ActionPanicked {
                tick: 1,
                message: "first tick blows up".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_action_with_stop_task_policy_stops() {
        let (sink, mut events) = ChannelEventSink::new();
        let task = ControllableTask::builder(TICK)
            .failure_policy(FailurePolicy::StopTask)
            .event_sink(sink)
            .build(|| -> Result<(), String> { Err("rpc unreachable".to_string()) })
            .unwrap();

        task.start().unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(1), task.join())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.runs, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(task.state(), TaskState::Stopped);
        assert!(!task.running());

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TaskEventKind::Started,
                TaskEventKind::ActionFailed {
                    tick: 1,
                    message: "rpc unreachable".to_string(),
                },
                TaskEventKind::Stopped {
                    reason: StopReason::FailFast,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_worker() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let (sink, mut events) = ChannelEventSink::new();
        let task = ControllableTask::builder(TICK)
            .event_sink(sink)
            .build(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        task.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(task);

        tokio::time::sleep(TICK * 3).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
        assert_eq!(
            last.kind,
            TaskEventKind::Stopped {
                reason: StopReason::Detached,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn control_from_other_threads() {
        let (task, counter) = counting_task();
        let task = Arc::new(task);
        task.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let remote = Arc::clone(&task);
        std::thread::spawn(move || remote.pause().unwrap())
            .join()
            .unwrap();
        assert_eq!(task.state(), TaskState::Paused);

        let before = counter.load(Ordering::SeqCst);
        tokio::time::sleep(TICK * 2).await;
        assert_eq!(counter.load(Ordering::SeqCst), before);

        let remote = Arc::clone(&task);
        std::thread::spawn(move || remote.stop()).join().unwrap();
        assert_eq!(task.stop_and_join().await.map(|s| s.runs), Some(before));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_interval_keeps_worker_alive() {
        let (sink, mut events) = ChannelEventSink::new();
        let task = ControllableTask::builder(Duration::MAX)
            .event_sink(sink)
            .build(|| {})
            .unwrap();
        task.start().unwrap();

        tokio::time::sleep(TICK).await;
        assert_eq!(task.state(), TaskState::Running);

        let stats = task
            .stop_and_join()
            .await
            .expect("worker must still be alive to join");
        assert_eq!(stats.ticks, 0);

        let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
        assert_eq!(
            last.kind,
            TaskEventKind::Stopped {
                reason: StopReason::Requested,
            }
        );
    }

    // 70ms の action を 20ms 間隔で回す（real time）
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_action_never_overlaps_and_is_not_interrupted_by_stop() {
        let in_flight = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicU64::new(0));
        let started = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicU64::new(0));

        let task = {
            let (in_flight, overlaps) = (Arc::clone(&in_flight), Arc::clone(&overlaps));
            let (started, finished) = (Arc::clone(&started), Arc::clone(&finished));
            ControllableTask::new(Duration::from_millis(20), move || {
                started.fetch_add(1, Ordering::SeqCst);
                if in_flight.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(70));
                in_flight.store(false, Ordering::SeqCst);
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };
        task.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // stop while a call is in flight
        tokio::time::timeout(Duration::from_secs(1), async {
            while !in_flight.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("an action should be running");
        task.stop();
        assert!(in_flight.load(Ordering::SeqCst));

        let stats = task.join().await.expect("worker joins after stop");
        assert!(!in_flight.load(Ordering::SeqCst));
        assert_eq!(finished.load(Ordering::SeqCst), started.load(Ordering::SeqCst));
        assert_eq!(stats.runs, started.load(Ordering::SeqCst));

        let started_at_join = started.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(started.load(Ordering::SeqCst), started_at_join);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn from_config_uses_name_and_interval() {
        let config = TaskConfig {
            name: "sync-headers".to_string(),
            interval_ms: 250,
            ..TaskConfig::default_heartbeat()
        };
        let task = ControllableTask::from_config(&config, || {}).unwrap();
        assert_eq!(task.name(), "sync-headers");
        assert_eq!(task.interval(), Duration::from_millis(250));
    }
}
