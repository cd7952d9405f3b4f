use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::config::WorkerOptions;
use crate::error::PoolError;
use crate::host::WorkerHandle;
use crate::worker::{WorkerData, WorkerEntry};

/// A queued request to create one worker. Consumed when admitted.
pub struct PoolItem {
    pub(crate) entry: Arc<dyn WorkerEntry>,
    pub(crate) data: WorkerData,
    pub(crate) options: WorkerOptions,
    pub(crate) reply: oneshot::Sender<Result<WorkerHandle, PoolError>>,
}

impl fmt::Debug for PoolItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolItem")
            .field("data", &self.data)
            .field("options", &self.options)
            .finish()
    }
}

impl PoolItem {
    /// The item and the ticket that resolves once the worker exists.
    pub fn new(
        entry: Arc<dyn WorkerEntry>,
        data: WorkerData,
        options: WorkerOptions,
    ) -> (Self, Ticket) {
        let (reply, receiver) = oneshot::channel();
        (
            Self {
                entry,
                data,
                options,
                reply,
            },
            Ticket { receiver },
        )
    }

    pub fn is_priority(&self) -> bool {
        self.options.priority
    }

    pub(crate) fn resolve(self, outcome: Result<WorkerHandle, PoolError>) {
        if self.reply.send(outcome).is_err() {
            tracing::debug!("pool ticket dropped before its worker was created");
        }
    }
}

/// Resolves to the created worker, or to the error that prevented it.
#[derive(Debug)]
pub struct Ticket {
    receiver: oneshot::Receiver<Result<WorkerHandle, PoolError>>,
}

impl Future for Ticket {
    type Output = Result<WorkerHandle, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(PoolError::Dropped)))
    }
}
