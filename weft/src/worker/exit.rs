//! Worker exit by unwinding.
//!
//! `WorkerScope::exit` unwinds the worker thread with an `ExitSignal`. The thread
//! root catches it and turns it into the exit code; any other unwind payload is a
//! panic and becomes an uncaught exception.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Unwind payload carrying an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExitSignal(pub(crate) i32);

/// How a guarded closure stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Unwound {
    Exit(i32),
    Panic(String),
}

/// Unwind the current thread with `code`. `resume_unwind` skips the panic hook.
pub(crate) fn raise(code: i32) -> ! {
    panic::resume_unwind(Box::new(ExitSignal(code)))
}

/// Run `f`, catching both exit signals and panics.
pub(crate) fn guard<R>(f: impl FnOnce() -> R) -> Result<R, Unwound> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(classify)
}

fn classify(payload: Box<dyn Any + Send>) -> Unwound {
    match payload.downcast::<ExitSignal>() {
        Ok(signal) => Unwound::Exit(signal.0),
        Err(payload) => Unwound::Panic(panic_message(payload.as_ref())),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}
