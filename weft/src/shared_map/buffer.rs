use std::cell::UnsafeCell;

use crate::sync::{Mutex, MutexGuard};

/// The two byte buffers of a SharedMap and the mutex guarding them.
///
/// Buffer contents are only reachable through `Locked`, which holds the mutex, so at
/// most one thread reads or writes the bytes at a time. Capacities are fixed at
/// construction and stored outside the cells.
pub(crate) struct Region {
    keys: UnsafeCell<Box<[u8]>>,
    values: UnsafeCell<Box<[u8]>>,
    keys_capacity: usize,
    values_capacity: usize,
    mutex: Mutex,
}

// SAFETY: the cells are only dereferenced while `mutex` is held (see `Region::lock`).
unsafe impl Sync for Region {}
unsafe impl Send for Region {}

impl Region {
    pub fn new(keys: Box<[u8]>, values: Box<[u8]>) -> Self {
        Self {
            keys_capacity: keys.len(),
            values_capacity: values.len(),
            keys: UnsafeCell::new(keys),
            values: UnsafeCell::new(values),
            mutex: Mutex::new(),
        }
    }

    pub fn keys_capacity(&self) -> usize {
        self.keys_capacity
    }

    pub fn values_capacity(&self) -> usize {
        self.values_capacity
    }

    pub fn mutex(&self) -> &Mutex {
        &self.mutex
    }

    /// Block until the region's mutex is held.
    pub fn lock(&self) -> Locked<'_> {
        let guard = self.mutex.guard();
        Locked {
            region: self,
            _guard: guard,
        }
    }
}

/// Exclusive access to the buffers for as long as it lives.
pub(crate) struct Locked<'a> {
    region: &'a Region,
    _guard: MutexGuard<'a>,
}

impl Locked<'_> {
    pub fn keys(&self) -> &[u8] {
        // SAFETY: the mutex is held for the lifetime of `self`.
        unsafe { &*self.region.keys.get() }
    }

    pub fn values(&self) -> &[u8] {
        // SAFETY: as above.
        unsafe { &*self.region.values.get() }
    }

    pub fn keys_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` prevents overlapping borrows through this guard.
        unsafe { &mut *self.region.keys.get() }
    }

    pub fn values_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above.
        unsafe { &mut *self.region.values.get() }
    }
}
