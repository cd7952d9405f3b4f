use std::sync::Arc;

use weft_api::{Call, Payload, WorkerMessage};

use crate::config::WorkerOptions;
use crate::error::CallError;
use crate::host::WorkerEvent;
use crate::runtime::Runtime;
use crate::worker::{WorkerData, WorkerEntry};

/// One-shot task workers.
///
/// The outcome is whichever of these the worker produces first:
/// - `TaskReturn(value)` resolves to `Ok(Some(value))`
/// - `TaskError` rejects with `Thrown` (or `TaskNotFound`)
/// - `WorkerException` rejects with `Uncaught`
/// - exit with a non-zero code rejects with `ExitedEarly(code)`
/// - exit with code 0 and no message resolves to `Ok(None)`
#[derive(Debug, Clone, Copy)]
pub struct Task;

impl Task {
    /// Run `task` with `params` on a new worker created through the pool.
    pub async fn run(
        runtime: &Runtime,
        entry: Arc<dyn WorkerEntry>,
        data: WorkerData,
        task: &str,
        params: Vec<Payload>,
        options: WorkerOptions,
    ) -> Result<Option<Payload>, CallError> {
        let handle = runtime
            .pool()
            .spawn(entry, data.into_task(task, params), options)
            .await?;
        let events = handle.events();

        loop {
            let event = events
                .recv_async()
                .await
                .map_err(|_| CallError::ChannelClosed)?;
            if let WorkerEvent::Error(reason) = &event {
                tracing::warn!(worker = %handle.id(), reason = %reason, "worker error");
                continue;
            }
            let Some(message) = event.into_message() else {
                continue;
            };
            crate::log_protocol!("creator-in", message.kind(), worker = %handle.id());

            match message {
                WorkerMessage::TaskReturn(value) => return Ok(Some(value)),
                WorkerMessage::TaskError(error) => return Err(CallError::from_thrown(error)),
                WorkerMessage::WorkerException(error) => return Err(CallError::Uncaught(error)),
                WorkerMessage::Exit { code: 0 } => return Ok(None),
                WorkerMessage::Exit { code } => return Err(CallError::ExitedEarly(code)),
                other => {
                    tracing::trace!(worker = %handle.id(), message = other.kind(), "ignored by task caller");
                }
            }
        }
    }

    /// Typed variant of `run`; honours `C::timeout()`.
    pub async fn run_typed<C: Call>(
        runtime: &Runtime,
        entry: Arc<dyn WorkerEntry>,
        data: WorkerData,
        request: C,
        options: WorkerOptions,
    ) -> Result<C::Output, CallError> {
        let params = request.to_params()?;
        let run = Self::run(runtime, entry, data, C::task_name(), params, options);
        let value = match C::timeout() {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| CallError::Timeout(limit))??,
            None => run.await?,
        };
        Ok(C::decode_output(value)?)
    }
}
