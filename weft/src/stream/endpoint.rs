use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use weft_api::{Payload, SessionId, StreamMessage};

use super::channel::MessagePort;
use super::reader::{PendingStream, ReadableStream};
use super::writer::{StreamWriter, WriterSession};
use crate::error::StreamError;

/// How an endpoint treats incoming `Start` messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcceptMode {
    /// Answer `Ready` immediately.
    #[default]
    Auto,
    /// Wait for the consumer to call `PendingStream::accept`.
    ConfirmFirst,
}

/// State shared by an endpoint, its router thread and the sessions it created.
pub(crate) struct EndpointShared {
    outbound: Mutex<Option<flume::Sender<StreamMessage>>>,
    writers: Mutex<HashMap<SessionId, Arc<WriterSession>>>,
    readers: Mutex<HashMap<SessionId, flume::Sender<Vec<u8>>>>,
    /// Confirm-first sessions not yet decided, and whether their `End` already came.
    pending: Mutex<HashMap<SessionId, bool>>,
    closed: AtomicBool,
}

impl EndpointShared {
    pub(crate) fn post(&self, message: StreamMessage) -> Result<(), StreamError> {
        let outbound = lock(&self.outbound);
        let sender = outbound.as_ref().ok_or(StreamError::ChannelClosed)?;
        crate::log_protocol!("stream-out", message.kind(), session = %message.id());
        sender.send(message).map_err(|_| StreamError::ChannelClosed)
    }

    pub(crate) fn forget_writer(&self, id: SessionId) {
        lock(&self.writers).remove(&id);
    }

    /// Register a reader for `id` and send `Ready`.
    pub(crate) fn activate_reader(&self, id: SessionId) -> Result<ReadableStream, StreamError> {
        let (chunks_tx, chunks_rx) = flume::unbounded();
        lock(&self.readers).insert(id, chunks_tx);
        if let Err(err) = self.post(StreamMessage::Ready { id }) {
            lock(&self.readers).remove(&id);
            return Err(err);
        }
        Ok(ReadableStream::new(id, chunks_rx))
    }

    pub(crate) fn hold_pending(&self, id: SessionId) {
        lock(&self.pending).insert(id, false);
    }

    pub(crate) fn release_pending(&self, id: SessionId) {
        lock(&self.pending).remove(&id);
    }

    /// Accept a confirm-first session. If its writer already went away the stream
    /// comes back empty and no `Ready` is sent.
    pub(crate) fn accept_pending(&self, id: SessionId) -> Result<ReadableStream, StreamError> {
        let mut pending = lock(&self.pending);
        match pending.remove(&id) {
            Some(false) => self.activate_reader(id),
            Some(true) => {
                let (_, chunks_rx) = flume::unbounded();
                Ok(ReadableStream::new(id, chunks_rx))
            }
            None => Err(StreamError::ChannelClosed),
        }
    }

    fn end_reader(&self, id: SessionId) {
        let mut pending = lock(&self.pending);
        if let Some(ended) = pending.get_mut(&id) {
            *ended = true;
            return;
        }
        drop(pending);
        if lock(&self.readers).remove(&id).is_none() {
            tracing::trace!(session = %id, "end for unknown session ignored");
        }
    }

    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.outbound).take();
        lock(&self.pending).clear();
        // Dropping the chunk senders ends every open readable.
        lock(&self.readers).clear();
        let writers: Vec<_> = lock(&self.writers).drain().map(|(_, w)| w).collect();
        for writer in writers {
            writer.abandon();
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One side of a stream channel. Writes sessions out, receives sessions in.
pub struct StreamEndpoint {
    shared: Arc<EndpointShared>,
    incoming: flume::Receiver<PendingStream>,
    mode: AcceptMode,
}

impl fmt::Debug for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEndpoint")
            .field("mode", &self.mode)
            .field("writers", &lock(&self.shared.writers).len())
            .field("readers", &lock(&self.shared.readers).len())
            .finish()
    }
}

impl StreamEndpoint {
    /// Take over `port` and start routing its incoming messages.
    pub fn new(port: MessagePort<StreamMessage>, mode: AcceptMode) -> Self {
        let (sender, receiver) = port.into_parts();
        let shared = Arc::new(EndpointShared {
            outbound: Mutex::new(Some(sender)),
            writers: Mutex::new(HashMap::new()),
            readers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let (incoming_tx, incoming_rx) = flume::unbounded();

        let router_shared = Arc::clone(&shared);
        let dispatcher = crate::logging::current_subscriber();
        let spawned = std::thread::Builder::new()
            .name("weft-stream-router".to_string())
            .spawn(move || {
                let _dispatch = tracing::dispatcher::set_default(&dispatcher);
                route(router_shared, receiver, incoming_tx, mode);
            });
        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to start stream router");
            shared.shut();
        }

        Self {
            shared,
            incoming: incoming_rx,
            mode,
        }
    }

    pub fn mode(&self) -> AcceptMode {
        self.mode
    }

    /// Start a new outgoing session. Writes are buffered until the peer is ready.
    pub fn open_writer(&self, metadata: impl Into<Payload>) -> Result<StreamWriter, StreamError> {
        let id = SessionId::new();
        let session = Arc::new(WriterSession::new(id));
        lock(&self.shared.writers).insert(id, Arc::clone(&session));

        if let Err(err) = self.shared.post(StreamMessage::Start {
            id,
            metadata: metadata.into(),
        }) {
            self.shared.forget_writer(id);
            return Err(err);
        }
        Ok(StreamWriter::new(session, Arc::clone(&self.shared)))
    }

    /// Next incoming session, or `None` once the channel is closed.
    pub async fn accept(&self) -> Option<PendingStream> {
        self.incoming.recv_async().await.ok()
    }

    /// Blocking variant of `accept`, for worker threads.
    pub fn accept_blocking(&self) -> Option<PendingStream> {
        self.incoming.recv().ok()
    }

    /// Writer sessions not yet ended.
    pub fn open_writers(&self) -> usize {
        lock(&self.shared.writers).len()
    }

    /// Reader sessions that have been accepted and not yet ended.
    pub fn open_readers(&self) -> usize {
        lock(&self.shared.readers).len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stop sending; the peer observes the channel closing.
    pub fn close(&self) {
        self.shared.shut();
    }
}

impl Drop for StreamEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

fn route(
    shared: Arc<EndpointShared>,
    receiver: flume::Receiver<StreamMessage>,
    incoming: flume::Sender<PendingStream>,
    mode: AcceptMode,
) {
    for message in receiver.iter() {
        crate::log_protocol!("stream-in", message.kind(), session = %message.id());
        match message {
            StreamMessage::Start { id, metadata } => {
                let pending = match mode {
                    AcceptMode::Auto => match shared.activate_reader(id) {
                        Ok(stream) => PendingStream::accepted(id, metadata, stream),
                        Err(err) => {
                            tracing::warn!(session = %id, error = %err, "could not accept stream");
                            continue;
                        }
                    },
                    AcceptMode::ConfirmFirst => {
                        shared.hold_pending(id);
                        PendingStream::awaiting(id, metadata, Arc::downgrade(&shared))
                    }
                };
                if let Err(flume::SendError(pending)) = incoming.send(pending) {
                    // Nobody is accepting any more; drop the session.
                    drop(pending);
                    lock(&shared.readers).remove(&id);
                }
            }
            StreamMessage::Ready { id } => {
                let writer = lock(&shared.writers).get(&id).cloned();
                match writer {
                    Some(writer) => writer.on_ready(&shared),
                    None => tracing::trace!(session = %id, "ready for unknown session ignored"),
                }
            }
            StreamMessage::Chunk { id, bytes } => {
                let readers = lock(&shared.readers);
                match readers.get(&id) {
                    Some(chunks) => {
                        // A dropped readable just discards the rest of its session.
                        let _ = chunks.send(bytes);
                    }
                    None => tracing::trace!(session = %id, "chunk for unknown session ignored"),
                }
            }
            StreamMessage::End { id } => shared.end_reader(id),
        }
    }

    tracing::debug!("stream channel closed");
    shared.shut();
}
