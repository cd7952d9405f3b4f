//! # Shared-Memory Synchronization
//!
//! Primitives that live in memory shared by every thread holding a clone:
//! a 32-bit mutex word and a 32-bit counter guarded by one.
//!
//! ## Key Concepts
//! - The mutex is a single `AtomicU32` slot. Contended lockers park on the slot's
//!   address and are woken one at a time by `unlock`.
//! - Cloning a handle attaches to the same slot; nothing is copied.

mod counter;
mod mutex;

pub use counter::Counter;
pub use mutex::{Mutex, MutexGuard, LOCKED, UNLOCKED};
