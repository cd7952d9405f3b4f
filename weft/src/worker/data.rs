use std::fmt;

use weft_api::{Payload, StreamMessage, WorkerKind};

use crate::shared_map::SharedMap;
use crate::stream::MessagePort;

/// Initial data handed to a worker at creation.
///
/// Everything here is moved into the worker thread. The `SharedMap`s are shared
/// memory; the messenger names are opened on the worker side; the stream ports are
/// taken by the worker through `WorkerScope::take_stream`.
#[derive(Clone)]
pub struct WorkerData {
    /// Set by `Task::run` and `Service::launch`
    pub kind: WorkerKind,
    /// Identity of the `Definitions` that should handle this worker
    pub identity: String,
    pub payload: Payload,
    pub messengers: Vec<String>,
    pub shared_maps: Vec<(String, SharedMap)>,
    pub streams: Vec<(String, MessagePort<StreamMessage>)>,
}

impl fmt::Debug for WorkerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerData")
            .field("kind", &self.kind.label())
            .field("identity", &self.identity)
            .field("payload", &self.payload)
            .field("messengers", &self.messengers)
            .field(
                "shared_maps",
                &self.shared_maps.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field(
                "streams",
                &self.streams.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl WorkerData {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            kind: WorkerKind::Service,
            identity: identity.into(),
            payload: Payload::Null,
            messengers: Vec::new(),
            shared_maps: Vec::new(),
            streams: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Open the messenger `name` in the worker before it runs any code.
    pub fn with_messenger(mut self, name: impl Into<String>) -> Self {
        self.messengers.push(name.into());
        self
    }

    pub fn with_shared_map(mut self, name: impl Into<String>, map: &SharedMap) -> Self {
        self.shared_maps.push((name.into(), map.clone()));
        self
    }

    pub fn with_stream(mut self, name: impl Into<String>, port: MessagePort<StreamMessage>) -> Self {
        self.streams.push((name.into(), port));
        self
    }

    pub(crate) fn into_task(mut self, name: &str, params: Vec<Payload>) -> Self {
        self.kind = WorkerKind::Task {
            name: name.to_string(),
            params,
        };
        self
    }

    pub(crate) fn into_service(mut self) -> Self {
        self.kind = WorkerKind::Service;
        self
    }
}
