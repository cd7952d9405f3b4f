//! # Worker Protocol Messages
//!
//! The creator of a worker and the worker itself talk exclusively through the two
//! enums below, one per direction. Both are closed: adding a message kind means
//! touching every handler, which is the point.
//!
//! ## Flow
//!
//! ```text
//! Task worker                         Service worker
//! creator        worker               creator              worker
//!    |  (spawn: kind=Task)  |            |  (spawn: kind=Service)  |
//!    |<------ TaskReturn ---|            |<------ Initialized -----|
//!    |    or TaskError      |            |------- Call{key} ------>|
//!    |    or WorkerException|            |<-- CallReturn{key} -----|
//!    |<------ Exit ---------|            |------- Terminate ------>|
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::ThrownError;
use crate::types::{CorrelationKey, Payload};

/// What a worker was started to do. Carried in its initial data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerKind {
    /// Run one named task, report its outcome, exit.
    Task { name: String, params: Vec<Payload> },
    /// Stay alive and answer calls until terminated.
    Service,
}

impl WorkerKind {
    pub fn is_service(&self) -> bool {
        matches!(self, WorkerKind::Service)
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkerKind::Task { .. } => "task",
            WorkerKind::Service => "service",
        }
    }
}

/// Creator -> worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CreatorMessage {
    /// User payload, delivered to the definitions' message handler.
    Message(Payload),
    /// Invoke a task on a service worker.
    Call {
        key: CorrelationKey,
        task: String,
        params: Vec<Payload>,
    },
    /// End the worker with `code` (0 when absent).
    Terminate { code: Option<i32> },
    /// Hand over a messenger channel by name.
    MessengerTransfer { name: String },
}

impl CreatorMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            CreatorMessage::Message(_) => "Message",
            CreatorMessage::Call { .. } => "Call",
            CreatorMessage::Terminate { .. } => "Terminate",
            CreatorMessage::MessengerTransfer { .. } => "MessengerTransfer",
        }
    }
}

/// Worker -> creator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerMessage {
    Message(Payload),
    TaskReturn(Payload),
    TaskError(ThrownError),
    CallReturn {
        key: CorrelationKey,
        value: Payload,
    },
    CallError {
        key: CorrelationKey,
        error: ThrownError,
    },
    MessengerTransferSuccess { name: String },
    /// A panic escaped a task body or hook.
    WorkerException(ThrownError),
    /// Service initialization finished; calls may now be sent.
    Initialized,
    /// Posted by the worker right before its thread ends.
    Exit { code: i32 },
}

impl WorkerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Message(_) => "Message",
            WorkerMessage::TaskReturn(_) => "TaskReturn",
            WorkerMessage::TaskError(_) => "TaskError",
            WorkerMessage::CallReturn { .. } => "CallReturn",
            WorkerMessage::CallError { .. } => "CallError",
            WorkerMessage::MessengerTransferSuccess { .. } => "MessengerTransferSuccess",
            WorkerMessage::WorkerException(_) => "WorkerException",
            WorkerMessage::Initialized => "Initialized",
            WorkerMessage::Exit { .. } => "Exit",
        }
    }

    /// Correlation key of a call response, if this is one.
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        match self {
            WorkerMessage::CallReturn { key, .. } | WorkerMessage::CallError { key, .. } => {
                Some(*key)
            }
            _ => None,
        }
    }
}
