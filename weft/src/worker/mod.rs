//! # Worker Side
//!
//! Everything that runs on a worker thread: the entry point trait, the
//! definitions a worker dispatches to, the scope handed to task bodies, and the
//! task and service protocol loops.
//!
//! ## Key Concepts
//! - `WorkerEntry`: what a worker thread runs. `Definitions` and `DefinitionSet`
//!   implement it; a custom entry can take over the whole thread.
//! - Task worker: runs one named task, reports `TaskReturn` or `TaskError` and ends.
//! - Service worker: runs the init hook, reports `Initialized`, then answers `Call`s
//!   until terminated. A panic inside a call is reported as `WorkerException` and
//!   the worker keeps serving.
//! - Exit: `WorkerScope::exit(code)` ends the thread from anywhere in the worker.

mod data;
mod definitions;
pub(crate) mod exit;
mod runner;
mod scope;

pub use data::WorkerData;
pub use definitions::{DefinitionSet, Definitions, HookFn, InitFn, MessageFn, TaskFn};
pub use scope::WorkerScope;

/// Code run on a freshly spawned worker thread.
pub trait WorkerEntry: Send + Sync + 'static {
    fn run(&self, scope: &WorkerScope);
}
