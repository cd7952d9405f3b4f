//! Wire messages of the chunked stream transport.
//!
//! Several sessions share one point-to-point channel; every message carries the
//! session id and receivers must drop messages for ids they do not know.

use serde::{Deserialize, Serialize};

use crate::types::{Payload, SessionId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StreamMessage {
    /// Writer -> reader: a session opens.
    Start { id: SessionId, metadata: Payload },
    /// Reader -> writer: the session was accepted, chunks may flow.
    Ready { id: SessionId },
    Chunk { id: SessionId, bytes: Vec<u8> },
    /// Writer -> reader: no more chunks.
    End { id: SessionId },
}

impl StreamMessage {
    pub fn id(&self) -> SessionId {
        match self {
            StreamMessage::Start { id, .. }
            | StreamMessage::Ready { id }
            | StreamMessage::Chunk { id, .. }
            | StreamMessage::End { id } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Start { .. } => "Start",
            StreamMessage::Ready { .. } => "Ready",
            StreamMessage::Chunk { .. } => "Chunk",
            StreamMessage::End { .. } => "End",
        }
    }
}
