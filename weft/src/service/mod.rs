//! # Services
//!
//! Creator-side handles for workers: long-lived `Service`s, one-shot `Task`s and
//! load-balanced `ServiceCluster`s.
//!
//! ## Key Concepts
//! - Launch: a service is usable only after its worker reports `Initialized`.
//! - Correlation: every call gets a fresh `CorrelationKey`; responses are matched
//!   by key, so any number of calls may be in flight on one service.
//! - Exit: when the worker ends, every pending call is rejected. A non-zero exit
//!   that nobody asked for rejects with `ExitedEarly(code)`, anything else with
//!   `Terminated`.
//! - Exceptions: a panic inside a service call is delivered to `on_exception`
//!   handlers and also answers that call, and the service keeps running.

mod cluster;
mod target;
mod task;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use weft_api::{Call, CorrelationKey, CreatorMessage, Payload, ThrownError, WorkerMessage};

use crate::config::WorkerOptions;
use crate::error::{CallError, MessengerError, PoolError, SpawnError};
use crate::host::{WorkerEvent, WorkerHandle, WorkerId};
use crate::runtime::Runtime;
use crate::subscription::{Listeners, Subscription};
use crate::worker::{WorkerData, WorkerEntry};

pub use cluster::ServiceCluster;
pub use target::CallTarget;
pub use task::Task;

type Reply = oneshot::Sender<Result<Payload, CallError>>;

/// How a service's worker ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceExit {
    pub code: i32,
    /// The service was closed through its handle.
    pub requested: bool,
}

struct CallTable {
    running: bool,
    closing: bool,
    exit_code: Option<i32>,
    pending: HashMap<CorrelationKey, Reply>,
}

impl CallTable {
    fn rejection(&self) -> CallError {
        match self.exit_code {
            Some(code) if code != 0 && !self.closing => CallError::ExitedEarly(code),
            _ => CallError::Terminated,
        }
    }
}

struct ServiceInner {
    handle: WorkerHandle,
    table: Mutex<CallTable>,
    transfers: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
    messages: Listeners<Payload>,
    exceptions: Listeners<ThrownError>,
    exits: Listeners<ServiceExit>,
}

/// Handle of a running service worker. Clones share the same worker; dropping the
/// last clone terminates it.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id())
            .field("running", &self.is_running())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Service {
    /// Create a service worker through the pool and wait until it is initialized.
    pub async fn launch(
        runtime: &Runtime,
        entry: Arc<dyn WorkerEntry>,
        data: WorkerData,
        options: WorkerOptions,
    ) -> Result<Service, CallError> {
        let handle = runtime
            .pool()
            .spawn(entry, data.into_service(), options)
            .await?;
        let events = handle.events();

        let initialized = match runtime.config().launch_timeout {
            Some(limit) => tokio::time::timeout(limit, wait_initialized(&events))
                .await
                .unwrap_or(Err(SpawnError::InitializationTimeout(limit))),
            None => wait_initialized(&events).await,
        };
        if let Err(err) = initialized {
            if matches!(err, SpawnError::InitializationTimeout(_)) {
                let _ = handle.terminate(1);
            }
            crate::log_error!(err, worker = %handle.id(), "service launch failed");
            return Err(CallError::Pool(PoolError::Spawn(err)));
        }

        let inner = Arc::new(ServiceInner {
            handle,
            table: Mutex::new(CallTable {
                running: true,
                closing: false,
                exit_code: None,
                pending: HashMap::new(),
            }),
            transfers: Mutex::new(HashMap::new()),
            messages: Listeners::new(),
            exceptions: Listeners::new(),
            exits: Listeners::new(),
        });
        tokio::spawn(pump(Arc::downgrade(&inner), events));

        crate::log_lifecycle!("service", inner.handle.id(), "launched");
        Ok(Service { inner })
    }

    pub fn id(&self) -> WorkerId {
        self.inner.handle.id()
    }

    /// Worker thread name
    pub fn name(&self) -> &str {
        self.inner.handle.name()
    }

    /// Invoke `task` on the worker and wait for its answer.
    pub async fn call(&self, task: &str, params: Vec<Payload>) -> Result<Payload, CallError> {
        self.call_inner(task, params, None).await
    }

    /// As `call`, rejecting with `Timeout` if no answer arrives within `limit`.
    pub async fn call_with_timeout(
        &self,
        task: &str,
        params: Vec<Payload>,
        limit: Duration,
    ) -> Result<Payload, CallError> {
        self.call_inner(task, params, Some(limit)).await
    }

    pub async fn call_typed<C: Call>(&self, request: C) -> Result<C::Output, CallError> {
        let params = request.to_params()?;
        let value = self.call_inner(C::task_name(), params, C::timeout()).await?;
        Ok(C::decode_output(Some(value))?)
    }

    async fn call_inner(
        &self,
        task: &str,
        params: Vec<Payload>,
        limit: Option<Duration>,
    ) -> Result<Payload, CallError> {
        let (key, receiver) = self.inner.register()?;
        let posted = self.inner.handle.post(CreatorMessage::Call {
            key,
            task: task.to_string(),
            params,
        });
        if let Err(err) = posted {
            self.inner.forget(key);
            return Err(err);
        }

        let answer = match limit {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(answer) => answer,
                Err(_) => {
                    self.inner.forget(key);
                    return Err(CallError::Timeout(limit));
                }
            },
            None => receiver.await,
        };
        answer.unwrap_or(Err(CallError::Terminated))
    }

    /// Send a user message to the worker's message handler.
    pub fn post(&self, value: impl Into<Payload>) -> Result<(), CallError> {
        self.inner.handle.post(CreatorMessage::Message(value.into()))
    }

    /// Messages the worker sent with `WorkerScope::post_message`.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.inner.messages.subscribe(callback)
    }

    /// Uncaught exceptions raised in the worker. The service keeps running; a
    /// handler may `close` it.
    pub fn on_exception<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ThrownError) + Send + Sync + 'static,
    {
        self.inner.exceptions.subscribe(callback)
    }

    pub fn on_exit<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ServiceExit) + Send + Sync + 'static,
    {
        self.inner.exits.subscribe(callback)
    }

    /// Open the messenger `name` inside the worker and wait for the acknowledgement.
    pub async fn send_messenger(&self, name: &str) -> Result<(), MessengerError> {
        let failed = || MessengerError::TransferFailed(name.to_string());
        if !self.is_running() {
            return Err(failed());
        }

        let (ack, acknowledged) = oneshot::channel();
        lock(&self.inner.transfers)
            .entry(name.to_string())
            .or_default()
            .push(ack);
        self.inner
            .handle
            .post(CreatorMessage::MessengerTransfer {
                name: name.to_string(),
            })
            .map_err(|_| failed())?;
        acknowledged.await.map_err(|_| failed())
    }

    /// Terminate the worker with code 0.
    pub fn close(&self) {
        self.close_with_code(0);
    }

    /// Terminate the worker with `code`. Pending calls are rejected with
    /// `Terminated` right away.
    pub fn close_with_code(&self, code: i32) {
        self.inner.shut(code);
    }

    /// Calls sent and not answered yet.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.table).pending.len()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.table).running
    }

    /// Exit code, once the worker has ended.
    pub fn exit_code(&self) -> Option<i32> {
        lock(&self.inner.table).exit_code
    }
}

impl ServiceInner {
    fn register(&self) -> Result<(CorrelationKey, oneshot::Receiver<Result<Payload, CallError>>), CallError> {
        let mut table = lock(&self.table);
        if !table.running {
            return Err(table.rejection());
        }
        let key = CorrelationKey::new();
        let (reply, receiver) = oneshot::channel();
        table.pending.insert(key, reply);
        Ok((key, receiver))
    }

    fn forget(&self, key: CorrelationKey) {
        lock(&self.table).pending.remove(&key);
    }

    fn resolve(&self, key: CorrelationKey, outcome: Result<Payload, CallError>) {
        let reply = lock(&self.table).pending.remove(&key);
        match reply {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => tracing::trace!(worker = %self.handle.id(), key = %key, "answer for unknown call ignored"),
        }
    }

    fn shut(&self, code: i32) {
        let pending = {
            let mut table = lock(&self.table);
            if !table.running {
                return;
            }
            table.running = false;
            table.closing = true;
            std::mem::take(&mut table.pending)
        };
        for (_, reply) in pending {
            let _ = reply.send(Err(CallError::Terminated));
        }
        if let Err(err) = self.handle.terminate(code) {
            tracing::debug!(worker = %self.handle.id(), error = %err, "service already gone");
        }
        crate::log_lifecycle!("service", self.handle.id(), "closing", code);
    }

    fn dispatch(&self, message: WorkerMessage) {
        crate::log_protocol!("creator-in", message.kind(), worker = %self.handle.id());
        match message {
            WorkerMessage::CallReturn { key, value } => self.resolve(key, Ok(value)),
            WorkerMessage::CallError { key, error } => {
                self.resolve(key, Err(CallError::from_thrown(error)))
            }
            WorkerMessage::Message(value) => {
                self.messages.emit(&value);
            }
            WorkerMessage::WorkerException(error) => {
                if self.exceptions.emit(&error) == 0 {
                    tracing::warn!(worker = %self.handle.id(), error = %error, "unhandled worker exception");
                }
            }
            WorkerMessage::MessengerTransferSuccess { name } => {
                let waiters = lock(&self.transfers).remove(&name).unwrap_or_default();
                for ack in waiters {
                    let _ = ack.send(());
                }
            }
            WorkerMessage::Exit { code } => self.exited(code),
            other => {
                tracing::trace!(worker = %self.handle.id(), message = other.kind(), "unexpected message for a service");
            }
        }
    }

    fn exited(&self, code: i32) {
        let (pending, rejection, requested) = {
            let mut table = lock(&self.table);
            table.running = false;
            table.exit_code = Some(code);
            (
                std::mem::take(&mut table.pending),
                table.rejection(),
                table.closing,
            )
        };
        for (_, reply) in pending {
            let _ = reply.send(Err(rejection.clone()));
        }
        lock(&self.transfers).clear();

        if code != 0 && !requested {
            tracing::warn!(worker = %self.handle.id(), code, "service exited early");
        }
        crate::log_lifecycle!("service", self.handle.id(), "exited", code, requested);
        self.exits.emit(&ServiceExit { code, requested });
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.shut(0);
    }
}

async fn wait_initialized(events: &flume::Receiver<WorkerEvent>) -> Result<(), SpawnError> {
    loop {
        let event = events
            .recv_async()
            .await
            .map_err(|_| SpawnError::ChannelClosed)?;
        match event {
            WorkerEvent::Message(WorkerMessage::Initialized) => return Ok(()),
            WorkerEvent::Message(WorkerMessage::WorkerException(error)) => {
                return Err(SpawnError::InitializationFailed(error))
            }
            WorkerEvent::Exit(code) => return Err(SpawnError::ExitedBeforeInit(code)),
            WorkerEvent::Error(reason) => {
                tracing::warn!(reason = %reason, "worker error before initialization");
            }
            WorkerEvent::Online => {}
            WorkerEvent::Message(other) => {
                tracing::trace!(message = other.kind(), "message before initialization ignored");
            }
        }
    }
}

/// Forward worker events to the service until the worker exits.
async fn pump(service: Weak<ServiceInner>, events: flume::Receiver<WorkerEvent>) {
    while let Ok(event) = events.recv_async().await {
        let Some(inner) = service.upgrade() else {
            return;
        };
        if let WorkerEvent::Error(reason) = &event {
            tracing::warn!(worker = %inner.handle.id(), reason = %reason, "worker error");
            continue;
        }
        let Some(message) = event.into_message() else {
            continue;
        };
        let exited = matches!(message, WorkerMessage::Exit { .. });
        inner.dispatch(message);
        if exited {
            return;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
