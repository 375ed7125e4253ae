//! Configuration for periodic tasks and queue bridges.
//!
//! Everything here deserializes from JSON. Missing fields fall back to the
//! defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the worker does after an action returns an error or panics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failure and keep ticking.
    #[default]
    Isolate,
    /// Report the failure and stop the task.
    StopTask,
}

/// How the trigger behaves when ticks are missed (slow action, stalled runtime).
///
/// Maps onto `tokio::time::MissedTickBehavior`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedTick {
    /// Fire missed ticks immediately until caught up.
    Burst,
    /// Push the schedule back so the next tick is one interval from now.
    #[default]
    Delay,
    /// Drop missed ticks and stay on the original grid.
    Skip,
}

impl From<MissedTick> for tokio::time::MissedTickBehavior {
    fn from(value: MissedTick) -> Self {
        match value {
            MissedTick::Burst => tokio::time::MissedTickBehavior::Burst,
            MissedTick::Delay => tokio::time::MissedTickBehavior::Delay,
            MissedTick::Skip => tokio::time::MissedTickBehavior::Skip,
        }
    }
}

/// Settings for one `ControllableTask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Name used in log fields.
    pub name: String,
    pub interval_ms: u64,
    pub failure_policy: FailurePolicy,
    pub missed_tick: MissedTick,
}

impl TaskConfig {
    /// Default heartbeat: one tick per second, failures isolated.
    pub fn default_heartbeat() -> Self {
        Self {
            name: "heartbeat".to_string(),
            interval_ms: 1_000,
            failure_policy: FailurePolicy::Isolate,
            missed_tick: MissedTick::Delay,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "task `{}`: interval_ms must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::default_heartbeat()
    }
}

/// Settings for an `AsyncQueue` bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of each endpoint channel. The queue's own buffer is unbounded
    /// regardless of this value.
    pub channel_capacity: usize,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue: channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1,
        }
    }
}

/// Top-level config file shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpindleConfig {
    pub queue: QueueConfig,
    pub tasks: Vec<TaskConfig>,
}

impl SpindleConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue.validate()?;
        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }
}
