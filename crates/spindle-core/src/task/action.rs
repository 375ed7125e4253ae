//! Type erasure for tick actions.
//!
//! An action is any `Fn() -> R` where `R` is `()` or `Result<(), E: Display>`.
//! Both are normalised to `Result<(), String>` so the worker handles one shape.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub(crate) type Action = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Return types accepted from a tick action.
pub trait IntoActionResult {
    fn into_action_result(self) -> Result<(), String>;
}

impl IntoActionResult for () {
    fn into_action_result(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> IntoActionResult for Result<(), E> {
    fn into_action_result(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

pub(crate) fn erase<F, R>(action: F) -> Action
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoActionResult,
{
    Arc::new(move || action().into_action_result())
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
