//! # Host
//!
//! Creates worker threads and keeps track of the ones that must be joined.
//!
//! ## Key Concepts
//! - Each worker is a named `std::thread` with two flume channels: creator
//!   messages in, `WorkerEvent`s out.
//! - The thread root catches every unwind: an exit signal becomes the exit code,
//!   a panic becomes a `WorkerException` followed by exit code 1.
//! - Reffed workers stay in the registry until they end so `join_all` can wait for
//!   them; `unref` detaches a worker.
//! - Worker threads inherit the creator's tracing dispatcher.

mod handle;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use uuid::Uuid;
use weft_api::{ThrownError, WorkerMessage};

use crate::config::{Reference, WorkerOptions};
use crate::error::SpawnError;
use crate::messenger::MessengerHub;
use crate::worker::exit::{self, Unwound};
use crate::worker::{WorkerData, WorkerEntry, WorkerScope};

pub use handle::WorkerHandle;

thread_local! {
    static CURRENT_WORKER: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Name of the worker running on the current thread, if any.
pub fn current_worker() -> Option<String> {
    CURRENT_WORKER.with(|current| current.borrow().clone())
}

pub fn is_worker_thread() -> bool {
    CURRENT_WORKER.with(|current| current.borrow().is_some())
}

/// Mark the current thread as acting for `worker`, or clear the mark with `None`.
pub(crate) fn mark_worker(worker: Option<String>) {
    CURRENT_WORKER.with(|current| *current.borrow_mut() = worker);
}

/// Unique id of a worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(Uuid);

impl WorkerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// What the host reports about a worker.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    /// The thread started.
    Online,
    Message(WorkerMessage),
    /// Host-level failure outside the protocol.
    Error(String),
    /// The thread ended with this code. Always the last event.
    Exit(i32),
}

impl WorkerEvent {
    /// The protocol message carried by this event. `Exit` maps to
    /// `WorkerMessage::Exit`.
    pub fn into_message(self) -> Option<WorkerMessage> {
        match self {
            WorkerEvent::Message(message) => Some(message),
            WorkerEvent::Exit(code) => Some(WorkerMessage::Exit { code }),
            WorkerEvent::Online | WorkerEvent::Error(_) => None,
        }
    }
}

/// Terminate request visible to the worker before it reads its next message.
#[derive(Debug, Default)]
pub struct StopSignal {
    requested: AtomicBool,
    code: AtomicI32,
}

impl StopSignal {
    pub(crate) fn request(&self, code: i32) {
        self.code.store(code, Ordering::SeqCst);
        self.requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn requested(&self) -> Option<i32> {
        self.requested
            .load(Ordering::SeqCst)
            .then(|| self.code.load(Ordering::SeqCst))
    }
}

/// Called on the worker thread once its body has finished, before `Exit` is sent.
pub type ExitCallback = Box<dyn FnOnce(WorkerId, i32) + Send>;

type Registry = Arc<Mutex<HashMap<WorkerId, JoinHandle<()>>>>;

/// Spawns worker threads and joins the reffed ones.
#[derive(Clone)]
pub struct Host {
    prefix: String,
    hub: Arc<MessengerHub>,
    threads: Registry,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("prefix", &self.prefix)
            .field("reffed", &self.reffed())
            .finish()
    }
}

impl Host {
    pub fn new(prefix: impl Into<String>, hub: Arc<MessengerHub>) -> Self {
        Self {
            prefix: prefix.into(),
            hub,
            threads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn hub(&self) -> &Arc<MessengerHub> {
        &self.hub
    }

    /// Start a worker thread running `entry`.
    pub fn spawn(
        &self,
        entry: Arc<dyn WorkerEntry>,
        data: WorkerData,
        options: &WorkerOptions,
        on_exit: ExitCallback,
    ) -> Result<WorkerHandle, SpawnError> {
        let id = WorkerId::new();
        let name = match &options.name {
            Some(name) => format!("{}{}", self.prefix, name),
            None => format!("{}{}", self.prefix, id),
        };
        let kind = data.kind.label();

        let (inbox_tx, inbox_rx) = flume::unbounded();
        let (events_tx, events_rx) = flume::unbounded();
        let stop = Arc::new(StopSignal::default());

        let mut builder = std::thread::Builder::new().name(name.clone());
        if let Some(stack_size) = options.limits.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let root = ThreadRoot {
            id,
            name: name.clone(),
            entry,
            data,
            argv: options.argv.clone(),
            inbox: inbox_rx,
            events: events_tx,
            hub: Arc::clone(&self.hub),
            stop: Arc::clone(&stop),
            on_exit,
            registry: Arc::clone(&self.threads),
            dispatcher: crate::logging::current_subscriber(),
        };

        // Held across the spawn so the thread cannot deregister before it is registered.
        let mut threads = lock(&self.threads);
        let join = builder
            .spawn(move || root.run())
            .map_err(|err| SpawnError::ThreadSpawn(err.to_string()))?;

        match options.reference {
            Reference::Ref => {
                threads.insert(id, join);
            }
            Reference::Unref => drop(join),
        }
        drop(threads);

        crate::log_lifecycle!(kind, id, "spawned", thread = %name);
        Ok(WorkerHandle::new(
            id,
            name,
            inbox_tx,
            events_rx,
            stop,
            Arc::downgrade(&self.threads),
        ))
    }

    /// Reffed workers still running.
    pub fn reffed(&self) -> usize {
        lock(&self.threads).len()
    }

    /// Block until every reffed worker has ended, including ones spawned meanwhile.
    pub fn join_all(&self) -> Vec<(WorkerId, String)> {
        let mut failures = Vec::new();
        loop {
            let batch: Vec<_> = lock(&self.threads).drain().collect();
            if batch.is_empty() {
                return failures;
            }
            for (id, join) in batch {
                if let Err(payload) = join.join() {
                    failures.push((id, exit::panic_message(payload.as_ref())));
                }
            }
        }
    }
}

struct ThreadRoot {
    id: WorkerId,
    name: String,
    entry: Arc<dyn WorkerEntry>,
    data: WorkerData,
    argv: Vec<String>,
    inbox: flume::Receiver<weft_api::CreatorMessage>,
    events: flume::Sender<WorkerEvent>,
    hub: Arc<MessengerHub>,
    stop: Arc<StopSignal>,
    on_exit: ExitCallback,
    registry: Registry,
    dispatcher: tracing::Dispatch,
}

impl ThreadRoot {
    fn run(self) {
        let _dispatch = tracing::dispatcher::set_default(&self.dispatcher);
        let kind = self.data.kind.label();
        let span = crate::worker_span!(kind, self.id, thread = %self.name);
        let _enter = span.enter();

        mark_worker(Some(self.name.clone()));
        let _ = self.events.send(WorkerEvent::Online);

        let events = self.events.clone();
        let scope = WorkerScope::new(
            self.id,
            self.name,
            self.data,
            self.argv,
            self.inbox,
            self.events,
            self.hub,
            self.stop,
        );

        let code = match exit::guard(|| self.entry.run(&scope)) {
            Ok(()) => 0,
            Err(Unwound::Exit(code)) => code,
            Err(Unwound::Panic(message)) => {
                tracing::error!(worker = %self.id, panic = %message, "uncaught worker exception");
                scope.send(WorkerMessage::WorkerException(ThrownError::panicked(message)));
                1
            }
        };
        scope.release();
        drop(scope);

        crate::log_lifecycle!(kind, self.id, "exited", code);
        (self.on_exit)(self.id, code);
        let _ = events.send(WorkerEvent::Exit(code));

        mark_worker(None);
        // Finished; the join handle is no longer needed.
        lock(&self.registry).remove(&self.id);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
