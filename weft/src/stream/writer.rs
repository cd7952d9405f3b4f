use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use weft_api::{SessionId, StreamMessage};

use super::endpoint::{lock, EndpointShared};
use crate::error::StreamError;

/// Where a session is in its handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingReady,
    Active,
    Ended,
}

struct WriterState {
    phase: SessionPhase,
    corked: VecDeque<Vec<u8>>,
    end_requested: bool,
}

/// Writer-side session state, shared with the endpoint's router.
pub(crate) struct WriterSession {
    id: SessionId,
    state: Mutex<WriterState>,
    ready_tx: flume::Sender<()>,
    ready_rx: flume::Receiver<()>,
}

impl WriterSession {
    pub(crate) fn new(id: SessionId) -> Self {
        let (ready_tx, ready_rx) = flume::bounded(1);
        Self {
            id,
            state: Mutex::new(WriterState {
                phase: SessionPhase::AwaitingReady,
                corked: VecDeque::new(),
                end_requested: false,
            }),
            ready_tx,
            ready_rx,
        }
    }

    /// The peer answered `Ready`: flush corked chunks in order, then apply a
    /// deferred `end`.
    pub(crate) fn on_ready(&self, shared: &EndpointShared) {
        let mut state = lock(&self.state);
        if state.phase != SessionPhase::AwaitingReady {
            return;
        }

        while let Some(bytes) = state.corked.pop_front() {
            if shared.post(StreamMessage::Chunk { id: self.id, bytes }).is_err() {
                state.phase = SessionPhase::Ended;
                return;
            }
        }
        state.phase = SessionPhase::Active;
        let _ = self.ready_tx.try_send(());

        if state.end_requested {
            let _ = shared.post(StreamMessage::End { id: self.id });
            state.phase = SessionPhase::Ended;
            drop(state);
            shared.forget_writer(self.id);
        }
    }

    /// The channel closed under the session.
    pub(crate) fn abandon(&self) {
        let mut state = lock(&self.state);
        state.phase = SessionPhase::Ended;
        state.corked.clear();
        // Wake a writer blocked in `ready`.
        let _ = self.ready_tx.try_send(());
    }
}

/// Outgoing half of a stream session.
///
/// Chunks written before the peer is ready are buffered and flushed in order when
/// `Ready` arrives. Dropping the writer ends the session; a writer dropped before
/// `Ready` discards its corked chunks and sends a bare `End`.
pub struct StreamWriter {
    session: Arc<WriterSession>,
    shared: Arc<EndpointShared>,
}

impl fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter")
            .field("id", &self.session.id)
            .field("phase", &self.phase())
            .finish()
    }
}

impl StreamWriter {
    pub(crate) fn new(session: Arc<WriterSession>, shared: Arc<EndpointShared>) -> Self {
        Self { session, shared }
    }

    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.session.state).phase
    }

    /// Chunks buffered while waiting for `Ready`.
    pub fn corked(&self) -> usize {
        lock(&self.session.state).corked.len()
    }

    pub fn write(&self, bytes: impl Into<Vec<u8>>) -> Result<(), StreamError> {
        let bytes = bytes.into();
        let mut state = lock(&self.session.state);
        if state.end_requested {
            return Err(StreamError::Ended);
        }
        match state.phase {
            SessionPhase::AwaitingReady => {
                state.corked.push_back(bytes);
                Ok(())
            }
            SessionPhase::Active => self.shared.post(StreamMessage::Chunk {
                id: self.session.id,
                bytes,
            }),
            SessionPhase::Ended => Err(StreamError::Ended),
        }
    }

    /// Finish the session. Before `Ready` the end is deferred until the buffered
    /// chunks have been flushed.
    pub fn end(&self) -> Result<(), StreamError> {
        let mut state = lock(&self.session.state);
        match state.phase {
            SessionPhase::AwaitingReady => {
                state.end_requested = true;
                Ok(())
            }
            SessionPhase::Active => {
                state.phase = SessionPhase::Ended;
                drop(state);
                self.shared.forget_writer(self.session.id);
                self.shared.post(StreamMessage::End {
                    id: self.session.id,
                })
            }
            SessionPhase::Ended => Ok(()),
        }
    }

    /// Wait until the peer has accepted the session.
    pub async fn ready(&self) -> Result<(), StreamError> {
        if self.phase() != SessionPhase::AwaitingReady {
            return self.ready_outcome();
        }
        let _ = self.session.ready_rx.recv_async().await;
        self.ready_outcome()
    }

    fn ready_outcome(&self) -> Result<(), StreamError> {
        match self.phase() {
            SessionPhase::Active => Ok(()),
            SessionPhase::Ended if !lock(&self.session.state).end_requested => {
                Err(StreamError::ChannelClosed)
            }
            _ => Ok(()),
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = lock(&self.session.state);
            if state.phase == SessionPhase::AwaitingReady {
                state.phase = SessionPhase::Ended;
                state.corked.clear();
                true
            } else {
                false
            }
        };
        let outcome = if abandoned {
            self.shared.forget_writer(self.session.id);
            self.shared.post(StreamMessage::End {
                id: self.session.id,
            })
        } else {
            self.end()
        };
        if let Err(err) = outcome {
            tracing::trace!(session = %self.session.id, error = %err, "stream writer dropped on a closed channel");
        }
    }
}
