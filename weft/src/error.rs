use std::time::Duration;
use thiserror::Error;

use weft_api::errors::{CodecError, ThrownError};

/// Errors related to the shared-memory mutex.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutexError {
    #[error("Mutex is not locked (slot value: {0})")]
    NotLocked(u32),
}

/// Errors related to SharedMap construction and access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedMapError {
    #[error("Key does not exist: {0}")]
    KeyMissing(String),
    #[error("Invalid key name: {0:?}")]
    InvalidKey(String),
    #[error("Duplicate key name: {0}")]
    DuplicateKey(String),
    #[error("Fixed size of {fixed} bytes is smaller than the {required} bytes of initial data")]
    InsufficientCapacity { fixed: usize, required: usize },
    #[error("{buffer} buffer capacity exceeded: need {required} bytes, have {capacity}")]
    CapacityExceeded {
        buffer: &'static str,
        required: usize,
        capacity: usize,
    },
    #[error("Corrupted keys buffer: {0}")]
    Corrupted(String),
    #[error("Failed to encode value: {0}")]
    Encode(String),
    #[error(transparent)]
    Mutex(#[from] MutexError),
}

/// Errors related to Pool operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool can only be used from the orchestrating thread, not from worker '{0}'")]
    NotOrchestrator(String),
    #[error("Pool is shut down")]
    ShutDown,
    #[error("Pool dropped the request before the worker was created")]
    Dropped,
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Errors related to creating worker threads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(String),
    #[error("Worker exited with code {0} before initialization completed")]
    ExitedBeforeInit(i32),
    #[error("Worker initialization failed: {0}")]
    InitializationFailed(ThrownError),
    #[error("Worker initialization timed out after {0:?}")]
    InitializationTimeout(Duration),
    #[error("Worker channel closed before initialization completed")]
    ChannelClosed,
}

/// Errors surfaced to the caller of a single task or service call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Task failed: {0}")]
    Thrown(ThrownError),
    #[error("Uncaught worker exception: {0}")]
    Uncaught(ThrownError),
    #[error("Worker exited early with code {0}")]
    ExitedEarly(i32),
    #[error("Service was terminated")]
    Terminated,
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Worker channel closed")]
    ChannelClosed,
    #[error("Codec error: {0}")]
    Codec(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl CallError {
    /// Map a worker-reported failure to the caller-facing variant.
    pub fn from_thrown(error: ThrownError) -> Self {
        match error.kind {
            weft_api::ErrorKind::TaskNotFound => CallError::TaskNotFound(error.name),
            weft_api::ErrorKind::Thrown => CallError::Thrown(error),
            weft_api::ErrorKind::Panicked => CallError::Uncaught(error),
        }
    }

    pub fn is_early_exit(&self) -> bool {
        matches!(self, CallError::ExitedEarly(_))
    }
}

impl From<CodecError> for CallError {
    fn from(err: CodecError) -> Self {
        CallError::Codec(err.to_string())
    }
}

/// Errors related to the stream transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream channel is closed")]
    ChannelClosed,
    #[error("Stream session has already ended")]
    Ended,
}

/// Errors related to Messenger channels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessengerError {
    #[error("Messenger '{0}' is closed")]
    Closed(String),
    #[error("Messenger transfer of '{0}' was not acknowledged")]
    TransferFailed(String),
}

/// Errors related to the runtime itself.
#[derive(Error, Debug)]
pub enum SystemError {
    #[error("Runtime is shutting down")]
    ShuttingDown,
    #[error("Failed to join worker '{0}': {1}")]
    JoinError(String, String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    SharedMap(#[from] SharedMapError),
    #[error("Internal runtime error: {0}")]
    Other(#[from] anyhow::Error),
}
