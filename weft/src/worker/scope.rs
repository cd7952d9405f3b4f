use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use weft_api::{CreatorMessage, Payload, StreamMessage, WorkerKind, WorkerMessage};

use super::exit;
use crate::host::{StopSignal, WorkerEvent, WorkerId};
use crate::messenger::{Messenger, MessengerHub};
use crate::shared_map::SharedMap;
use crate::stream::MessagePort;
use crate::worker::WorkerData;

/// The worker thread's view of itself: its initial data, its channel to the
/// creator and the resources handed to it.
///
/// Task bodies, hooks and message handlers all receive a `&WorkerScope`.
pub struct WorkerScope {
    id: WorkerId,
    name: String,
    identity: String,
    kind: WorkerKind,
    payload: Payload,
    argv: Vec<String>,
    inbox: flume::Receiver<CreatorMessage>,
    events: flume::Sender<WorkerEvent>,
    hub: Arc<MessengerHub>,
    initial_messengers: Vec<String>,
    messengers: Mutex<HashMap<String, Arc<Messenger>>>,
    shared_maps: HashMap<String, SharedMap>,
    streams: Mutex<HashMap<String, MessagePort<StreamMessage>>>,
    stop: Arc<StopSignal>,
}

impl fmt::Debug for WorkerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerScope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("kind", &self.kind.label())
            .finish()
    }
}

impl WorkerScope {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: WorkerId,
        name: String,
        data: WorkerData,
        argv: Vec<String>,
        inbox: flume::Receiver<CreatorMessage>,
        events: flume::Sender<WorkerEvent>,
        hub: Arc<MessengerHub>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            id,
            name,
            identity: data.identity,
            kind: data.kind,
            payload: data.payload,
            argv,
            inbox,
            events,
            hub,
            initial_messengers: data.messengers,
            messengers: Mutex::new(HashMap::new()),
            shared_maps: data.shared_maps.into_iter().collect(),
            streams: Mutex::new(data.streams.into_iter().collect()),
            stop,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn kind(&self) -> &WorkerKind {
        &self.kind
    }

    /// Payload the creator passed in `WorkerData`.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// End this worker with `code`. Never returns.
    pub fn exit(&self, code: i32) -> ! {
        tracing::debug!(worker = %self.id, code, "worker exit requested");
        exit::raise(code)
    }

    /// Send a user message to the creator. Dropped if the creator is gone.
    pub fn post_message(&self, value: impl Into<Payload>) {
        self.send(WorkerMessage::Message(value.into()));
    }

    /// The messenger on `name`, opening it on first use.
    pub fn messenger(&self, name: &str) -> Arc<Messenger> {
        let mut messengers = lock(&self.messengers);
        Arc::clone(
            messengers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(self.hub.open(name))),
        )
    }

    pub fn shared_map(&self, name: &str) -> Option<SharedMap> {
        self.shared_maps.get(name).cloned()
    }

    /// Take ownership of the stream port handed over as `name`.
    pub fn take_stream(&self, name: &str) -> Option<MessagePort<StreamMessage>> {
        lock(&self.streams).remove(name)
    }

    pub(crate) fn open_initial_messengers(&self) {
        for name in &self.initial_messengers {
            self.messenger(name);
        }
    }

    pub(crate) fn send(&self, message: WorkerMessage) {
        crate::log_protocol!("worker-out", message.kind(), worker = %self.id);
        if self.events.send(WorkerEvent::Message(message)).is_err() {
            tracing::trace!(worker = %self.id, "creator gone, message dropped");
        }
    }

    /// Next message from the creator; `None` once the creator dropped its handle.
    pub(crate) fn recv(&self) -> Option<CreatorMessage> {
        let message = self.inbox.recv().ok()?;
        crate::log_protocol!("worker-in", message.kind(), worker = %self.id);
        Some(message)
    }

    /// Exit code requested by a `terminate` that has not been processed yet.
    pub(crate) fn stop_requested(&self) -> Option<i32> {
        self.stop.requested()
    }

    /// Close every messenger this worker opened.
    pub(crate) fn release(&self) {
        let messengers: Vec<_> = lock(&self.messengers).drain().map(|(_, m)| m).collect();
        for messenger in messengers {
            messenger.close();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
