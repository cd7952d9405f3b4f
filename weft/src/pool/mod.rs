//! # Pool
//!
//! Admission control for worker creation.
//!
//! ## Key Concepts
//! - Ceiling: at most `ceiling()` workers created through the pool run at once.
//!   Defaults to one per logical core, scaled by `Concurrency`.
//! - Queue: requests over the ceiling wait in FIFO order; priority requests go to
//!   the front.
//! - Accounting: the active count lives in a `Counter`. It is incremented on
//!   admission and decremented on the worker thread as it exits, which then admits
//!   the next queued request.
//!
//! ## Design Principles
//! - Only orchestrating threads enqueue; worker threads are refused without any
//!   state change.
//! - A creation failure is reported to its requester only, and the pool keeps
//!   admitting.

mod item;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::config::{Concurrency, RuntimeConfig, WorkerOptions};
use crate::error::PoolError;
use crate::host::{self, ExitCallback, Host, WorkerHandle, WorkerId};
use crate::sync::Counter;
use crate::worker::{WorkerData, WorkerEntry};

pub use item::{PoolItem, Ticket};

struct PoolInner {
    host: Host,
    config: RuntimeConfig,
    queue: Mutex<VecDeque<PoolItem>>,
    active: Counter,
    ceiling: AtomicUsize,
    shut_down: AtomicBool,
}

/// Bounded worker creation. Clones share the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("ceiling", &self.ceiling())
            .field("active", &self.active_count())
            .field("queued", &self.queued())
            .finish()
    }
}

impl Pool {
    pub fn new(config: RuntimeConfig, host: Host) -> Self {
        let ceiling = config.ceiling();
        crate::log_pool!("created", ceiling);
        Self {
            inner: Arc::new(PoolInner {
                host,
                config,
                queue: Mutex::new(VecDeque::new()),
                active: Counter::new(0),
                ceiling: AtomicUsize::new(ceiling),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn host(&self) -> &Host {
        &self.inner.host
    }

    /// Queue `item` and admit as many items as the ceiling allows.
    pub fn enqueue(&self, item: PoolItem) -> Result<(), PoolError> {
        if let Some(worker) = host::current_worker() {
            return Err(PoolError::NotOrchestrator(worker));
        }
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }

        {
            let mut queue = lock(&self.inner.queue);
            if item.is_priority() {
                queue.push_front(item);
            } else {
                queue.push_back(item);
            }
            crate::log_pool!("enqueued", queued = queue.len());
        }
        self.inner.drain();
        Ok(())
    }

    /// Enqueue a worker and wait for it to be created.
    pub async fn spawn(
        &self,
        entry: Arc<dyn WorkerEntry>,
        data: WorkerData,
        options: WorkerOptions,
    ) -> Result<WorkerHandle, PoolError> {
        let (item, ticket) = PoolItem::new(entry, data, options);
        self.enqueue(item)?;
        ticket.await
    }

    /// Workers created through the pool that have not exited yet.
    pub fn active_count(&self) -> usize {
        self.inner.active.get().max(0) as usize
    }

    pub fn queued(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    pub fn ceiling(&self) -> usize {
        self.inner.ceiling.load(Ordering::SeqCst)
    }

    /// Change the ceiling for later admissions. Admits immediately if it grew.
    pub fn set_concurrency(&self, concurrency: Concurrency) {
        self.set_ceiling(concurrency.ceiling(num_cpus::get()));
    }

    pub fn set_ceiling(&self, ceiling: usize) {
        let ceiling = ceiling.max(1);
        self.inner.ceiling.store(ceiling, Ordering::SeqCst);
        crate::log_pool!("ceiling changed", ceiling);
        self.inner.drain();
    }

    /// Refuse further requests and fail the queued ones. Running workers are untouched.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let queued: Vec<_> = lock(&self.inner.queue).drain(..).collect();
        crate::log_pool!("shut down", dropped = queued.len());
        for item in queued {
            item.resolve(Err(PoolError::ShutDown));
        }
    }
}

impl PoolInner {
    /// Admit queued items while under the ceiling.
    fn drain(self: &Arc<Self>) {
        loop {
            let item = {
                let mut queue = lock(&self.queue);
                let ceiling = self.ceiling.load(Ordering::SeqCst) as i32;
                if queue.is_empty() || self.active.get() >= ceiling {
                    return;
                }
                self.active.increment();
                match queue.pop_front() {
                    Some(item) => item,
                    None => return,
                }
            };
            self.admit(item);
        }
    }

    fn admit(self: &Arc<Self>, item: PoolItem) {
        let PoolItem {
            entry,
            data,
            options,
            reply,
        } = item;
        let options = self.config.merge_with_worker_options(&options);

        let pool: Weak<PoolInner> = Arc::downgrade(self);
        let on_exit: ExitCallback = Box::new(move |worker: WorkerId, code: i32| {
            if let Some(pool) = pool.upgrade() {
                let active = pool.active.decrement();
                crate::log_pool!("worker exited", worker = %worker, code, active);
                pool.drain();
            }
        });

        let outcome = self.host.spawn(entry, data, &options, on_exit);
        let outcome = match outcome {
            Ok(handle) => {
                crate::log_pool!("admitted", worker = %handle.id(), active = self.active.get());
                Ok(handle)
            }
            Err(err) => {
                self.active.decrement();
                crate::log_error!(err, scheduler = "pool", "worker creation failed");
                Err(PoolError::Spawn(err))
            }
        };
        if reply.send(outcome).is_err() {
            tracing::debug!("pool ticket dropped before its worker was created");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
