use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use super::mutex::Mutex;

/// Shared 32-bit integer whose every mutation is a read-modify-write under a `Mutex`.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    value: Arc<AtomicI32>,
    mutex: Mutex,
}

impl Counter {
    pub fn new(initial: i32) -> Self {
        Self {
            value: Arc::new(AtomicI32::new(initial)),
            mutex: Mutex::new(),
        }
    }

    pub fn get(&self) -> i32 {
        let _guard = self.mutex.guard();
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: i32) {
        let _guard = self.mutex.guard();
        self.value.store(value, Ordering::Relaxed);
    }

    /// Add `delta` and return the new value.
    pub fn add(&self, delta: i32) -> i32 {
        let _guard = self.mutex.guard();
        let next = self.value.load(Ordering::Relaxed).wrapping_add(delta);
        self.value.store(next, Ordering::Relaxed);
        next
    }

    pub fn increment(&self) -> i32 {
        self.add(1)
    }

    pub fn decrement(&self) -> i32 {
        self.add(-1)
    }

    /// Apply `f` to the current value while holding the lock; returns the new value.
    pub fn update(&self, f: impl FnOnce(i32) -> i32) -> i32 {
        let _guard = self.mutex.guard();
        let next = f(self.value.load(Ordering::Relaxed));
        self.value.store(next, Ordering::Relaxed);
        next
    }
}
