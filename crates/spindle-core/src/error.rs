use thiserror::Error;

use crate::domain::TaskId;

/// Errors returned by `ControllableTask` construction and control calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task interval must be greater than zero")]
    InvalidInterval,

    #[error("no tokio runtime available to spawn the task worker")]
    NoRuntime,

    #[error("task {0} is stopped")]
    Stopped(TaskId),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SpindleError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
