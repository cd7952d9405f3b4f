//! # weft API
//!
//! Shared vocabulary of the weft thread-orchestration runtime. Everything that crosses
//! the boundary between a creator and its worker thread is defined here as a closed,
//! serializable enum, so both sides match on it exhaustively.
//!
//! ## Module Organization
//!
//! - [`message`]: creator -> worker and worker -> creator protocol messages
//! - [`stream`]: wire messages of the chunked stream transport
//! - [`call`]: typed calls bound to a named task
//! - [`errors`]: errors that travel across the protocol
//! - [`types`]: identifiers and payload aliases

pub mod call;
pub mod errors;
pub mod message;
pub mod stream;
pub mod types;

pub use call::Call;
pub use errors::{CodecError, ErrorKind, ThrownError};
pub use message::{CreatorMessage, WorkerKind, WorkerMessage};
pub use stream::StreamMessage;
pub use types::{CorrelationKey, InstanceKey, Payload, SessionId};

// Re-export the derive macro
pub use weft_api_derive::Call;
