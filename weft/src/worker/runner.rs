//! Worker-side protocol loops.

use weft_api::{CreatorMessage, Payload, ThrownError, WorkerKind, WorkerMessage};

use super::definitions::Definitions;
use super::exit::{self, Unwound};
use super::scope::WorkerScope;

pub(crate) fn run(definitions: &Definitions, scope: &WorkerScope) {
    match scope.kind().clone() {
        WorkerKind::Task { name, params } => run_task(definitions, scope, &name, params),
        WorkerKind::Service => run_service(definitions, scope),
    }
}

/// One task, one answer. Panics and exits unwind past this to the thread root.
fn run_task(definitions: &Definitions, scope: &WorkerScope, name: &str, params: Vec<Payload>) {
    scope.open_initial_messengers();
    match definitions.invoke(scope, name, params) {
        Ok(value) => scope.send(WorkerMessage::TaskReturn(value)),
        Err(error) => scope.send(WorkerMessage::TaskError(error)),
    }
}

fn run_service(definitions: &Definitions, scope: &WorkerScope) {
    scope.open_initial_messengers();
    if let Err(error) = definitions.run_init(scope) {
        tracing::warn!(worker = %scope.id(), error = %error, "service init failed");
        scope.send(WorkerMessage::WorkerException(error));
        scope.exit(1);
    }
    scope.send(WorkerMessage::Initialized);
    crate::log_lifecycle!("service", scope.id(), "initialized");

    while let Some(message) = scope.recv() {
        // Calls queued behind a terminate are not run.
        if let Some(code) = scope.stop_requested() {
            scope.exit(code);
        }

        match message {
            CreatorMessage::Call { key, task, params } => {
                match exit::guard(|| definitions.invoke(scope, &task, params)) {
                    Ok(Ok(value)) => scope.send(WorkerMessage::CallReturn { key, value }),
                    Ok(Err(error)) => scope.send(WorkerMessage::CallError { key, error }),
                    Err(Unwound::Exit(code)) => exit::raise(code),
                    Err(Unwound::Panic(message)) => {
                        let error = ThrownError::panicked(message);
                        tracing::warn!(worker = %scope.id(), task = %task, error = %error, "task panicked");
                        scope.send(WorkerMessage::WorkerException(error.clone()));
                        scope.send(WorkerMessage::CallError { key, error });
                    }
                }
            }
            CreatorMessage::Message(value) => {
                let Some(handler) = definitions.message_handler() else {
                    tracing::trace!(worker = %scope.id(), "no message handler, message dropped");
                    continue;
                };
                match exit::guard(|| handler(scope, value)) {
                    Ok(()) => {}
                    Err(Unwound::Exit(code)) => exit::raise(code),
                    Err(Unwound::Panic(message)) => {
                        scope.send(WorkerMessage::WorkerException(ThrownError::panicked(message)));
                    }
                }
            }
            CreatorMessage::Terminate { code } => scope.exit(code.unwrap_or(0)),
            CreatorMessage::MessengerTransfer { name } => {
                scope.messenger(&name);
                scope.send(WorkerMessage::MessengerTransferSuccess { name });
            }
        }
    }

    tracing::debug!(worker = %scope.id(), "creator dropped the service, leaving");
}
