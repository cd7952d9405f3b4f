use std::fmt;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use weft_api::{Payload, SessionId};

use super::endpoint::EndpointShared;
use crate::error::StreamError;

enum Decision {
    Accepted(ReadableStream),
    Awaiting(Weak<EndpointShared>),
    Settled,
}

/// An incoming session as announced by `Start`.
///
/// On an `AcceptMode::Auto` endpoint the session is already accepted and `accept`
/// only hands out the stream. On a confirm-first endpoint `accept` sends `Ready`;
/// `reject`, or dropping the value, discards the session without answering.
pub struct PendingStream {
    id: SessionId,
    metadata: Payload,
    decision: Decision,
}

impl fmt::Debug for PendingStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingStream")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("accepted", &matches!(self.decision, Decision::Accepted(_)))
            .finish()
    }
}

impl PendingStream {
    pub(crate) fn accepted(id: SessionId, metadata: Payload, stream: ReadableStream) -> Self {
        Self {
            id,
            metadata,
            decision: Decision::Accepted(stream),
        }
    }

    pub(crate) fn awaiting(id: SessionId, metadata: Payload, shared: Weak<EndpointShared>) -> Self {
        Self {
            id,
            metadata,
            decision: Decision::Awaiting(shared),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn metadata(&self) -> &Payload {
        &self.metadata
    }

    /// Materialize the stream.
    pub fn accept(mut self) -> Result<ReadableStream, StreamError> {
        match std::mem::replace(&mut self.decision, Decision::Settled) {
            Decision::Accepted(stream) => Ok(stream),
            Decision::Awaiting(shared) => {
                let shared = shared.upgrade().ok_or(StreamError::ChannelClosed)?;
                shared.accept_pending(self.id)
            }
            Decision::Settled => Err(StreamError::ChannelClosed),
        }
    }

    /// Drop the session. The writer on the other side stays corked until it is
    /// dropped.
    pub fn reject(self) {
        tracing::debug!(session = %self.id, "incoming stream rejected");
    }
}

impl Drop for PendingStream {
    fn drop(&mut self) {
        if let Decision::Awaiting(shared) = &self.decision {
            if let Some(shared) = shared.upgrade() {
                shared.release_pending(self.id);
            }
        }
    }
}

/// Incoming half of a stream session; yields chunks in send order and ends on `End`.
pub struct ReadableStream {
    id: SessionId,
    receiver: flume::Receiver<Vec<u8>>,
    chunks: flume::r#async::RecvStream<'static, Vec<u8>>,
}

impl fmt::Debug for ReadableStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableStream")
            .field("id", &self.id)
            .field("buffered", &self.receiver.len())
            .finish()
    }
}

impl ReadableStream {
    pub(crate) fn new(id: SessionId, receiver: flume::Receiver<Vec<u8>>) -> Self {
        Self {
            id,
            chunks: receiver.clone().into_stream(),
            receiver,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Concatenate every remaining chunk.
    pub async fn read_to_end(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next().await {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Blocking variant of `read_to_end`, for worker threads.
    pub fn read_to_end_blocking(self) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in self.receiver.iter() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Next chunk, blocking the current thread.
    pub fn recv_blocking(&self) -> Option<Vec<u8>> {
        self.receiver.recv().ok()
    }
}

impl Stream for ReadableStream {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.poll_next_unpin(cx)
    }
}
