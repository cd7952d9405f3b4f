use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

use crate::error::MutexError;

pub const UNLOCKED: u32 = 0;
pub const LOCKED: u32 = 1;

/// Lock over one shared 32-bit slot.
///
/// `lock` blocks the calling OS thread (it parks, it does not poll) until it moves the
/// slot from `UNLOCKED` to `LOCKED`. `unlock` wakes exactly one parked locker.
/// Waiters are admitted in no particular order.
///
/// Unlike `std::sync::Mutex` this lock has no owner: any holder of a clone may unlock
/// it, which is what lets a read-modify-write sequence span helper functions and
/// threads. Unlocking an unlocked slot is reported as `MutexError::NotLocked`.
#[derive(Clone, Default)]
pub struct Mutex {
    slot: Arc<AtomicU32>,
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(AtomicU32::new(UNLOCKED)),
        }
    }

    /// Address of the shared slot; the key waiters park on.
    fn key(&self) -> usize {
        Arc::as_ptr(&self.slot) as usize
    }

    pub fn lock(&self) {
        loop {
            if self.try_lock() {
                return;
            }

            // SAFETY: the key is the address of the slot, which stays alive while
            // `self` holds its Arc; the callbacks neither park nor panic.
            unsafe {
                parking_lot_core::park(
                    self.key(),
                    || self.slot.load(Ordering::Acquire) == LOCKED,
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
        }
    }

    /// Take the lock if it is free, without blocking.
    pub fn try_lock(&self) -> bool {
        self.slot
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn unlock(&self) -> Result<(), MutexError> {
        self.slot
            .compare_exchange(LOCKED, UNLOCKED, Ordering::Release, Ordering::Relaxed)
            .map_err(MutexError::NotLocked)?;

        // SAFETY: same key as in `lock`; the callback is trivial.
        unsafe {
            parking_lot_core::unpark_one(self.key(), |_| DEFAULT_UNPARK_TOKEN);
        }
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.slot.load(Ordering::Acquire) == LOCKED
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard { mutex: self }
    }

    /// Whether both handles are attached to the same slot.
    pub fn same_slot(&self, other: &Mutex) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

/// Holds a `Mutex` locked until dropped.
#[must_use = "the mutex unlocks as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.unlock() {
            // Someone unlocked a slot this guard owns.
            tracing::error!(error = %err, "mutex guard released an unlocked slot");
        }
    }
}
