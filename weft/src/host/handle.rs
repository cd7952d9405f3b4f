use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use weft_api::CreatorMessage;

use super::{lock, StopSignal, WorkerEvent, WorkerId};
use crate::error::CallError;

/// Creator-side handle of one worker thread.
pub struct WorkerHandle {
    id: WorkerId,
    name: String,
    inbox: flume::Sender<CreatorMessage>,
    events: flume::Receiver<WorkerEvent>,
    stop: Arc<StopSignal>,
    registry: Weak<Mutex<HashMap<WorkerId, JoinHandle<()>>>>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl WorkerHandle {
    pub(crate) fn new(
        id: WorkerId,
        name: String,
        inbox: flume::Sender<CreatorMessage>,
        events: flume::Receiver<WorkerEvent>,
        stop: Arc<StopSignal>,
        registry: Weak<Mutex<HashMap<WorkerId, JoinHandle<()>>>>,
    ) -> Self {
        Self {
            id,
            name,
            inbox,
            events,
            stop,
            registry,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post(&self, message: CreatorMessage) -> Result<(), CallError> {
        crate::log_protocol!("creator-out", message.kind(), worker = %self.id);
        self.inbox.send(message).map_err(|_| CallError::ChannelClosed)
    }

    /// Event stream of this worker. Each event is delivered to one receiver.
    pub fn events(&self) -> flume::Receiver<WorkerEvent> {
        self.events.clone()
    }

    /// Ask the worker to end with `code`. Messages already queued are skipped.
    pub fn terminate(&self, code: i32) -> Result<(), CallError> {
        self.stop.request(code);
        self.post(CreatorMessage::Terminate { code: Some(code) })
    }

    /// Stop tracking this worker for `Host::join_all`.
    pub fn unref(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if lock(&registry).remove(&self.id).is_some() {
                tracing::debug!(worker = %self.id, "worker unreffed");
            }
        }
    }
}
