//! # Stream Transport
//!
//! Chunked byte transfer over a point-to-point message channel.
//!
//! ## Key Concepts
//! - Session: one transfer, identified by a `SessionId`; any number of sessions in
//!   either direction share one channel
//! - Handshake: the writer sends `Start` and corks its writes until the reader
//!   answers `Ready`, then flushes and streams `Chunk`s, and finishes with `End`
//! - Confirm-first: the reader may inspect a session's metadata and decide whether
//!   to accept it; a session that is never accepted never receives `Ready`
//!
//! ## Example
//!
//! ```rust,ignore
//! let (left, right) = weft::stream::message_channel();
//! let writer_side = StreamEndpoint::new(left, AcceptMode::Auto);
//! let reader_side = StreamEndpoint::new(right, AcceptMode::Auto);
//!
//! let writer = writer_side.open_writer(json!({"file": "a.txt"}))?;
//! writer.write(b"hello")?;
//! writer.end()?;
//!
//! let incoming = reader_side.accept().await.unwrap();
//! let bytes = incoming.accept()?.read_to_end().await;
//! ```

mod channel;
mod endpoint;
mod reader;
mod writer;

pub use channel::{message_channel, MessagePort};
pub use endpoint::{AcceptMode, StreamEndpoint};
pub use reader::{PendingStream, ReadableStream};
pub use writer::{SessionPhase, StreamWriter};
