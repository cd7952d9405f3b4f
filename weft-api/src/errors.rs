//! # Protocol Error Types
//!
//! Errors in this module are values, not control flow: they are produced on one
//! thread, serialized into a protocol message and surfaced on another thread.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a failure reported by a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The task body returned an error.
    Thrown,
    /// No task with the requested name exists in the definitions.
    TaskNotFound,
    /// The task body or one of its hooks panicked.
    Panicked,
}

/// A failure raised inside a worker, in a form that can cross threads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrownError {
    pub kind: ErrorKind,
    /// Short name of the failure (the task name for `TaskNotFound`)
    pub name: String,
    pub message: String,
    /// Causes, outermost first, excluding `message` itself
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
}

impl ThrownError {
    pub fn task_not_found(task: &str) -> Self {
        Self {
            kind: ErrorKind::TaskNotFound,
            name: task.to_string(),
            message: format!("task '{task}' not found"),
            chain: Vec::new(),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Panicked,
            name: "panic".to_string(),
            message: message.into(),
            chain: Vec::new(),
        }
    }

    /// Build from an `anyhow` error returned by a task body or hook.
    pub fn from_anyhow(name: &str, err: &anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Thrown,
            name: name.to_string(),
            message: err.to_string(),
            chain: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }
}

impl fmt::Display for ThrownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        for cause in &self.chain {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ThrownError {}

/// Errors encoding or decoding typed calls.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encode parameters for '{task}': {source}")]
    Encode {
        task: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode '{task}': {source}")]
    Decode {
        task: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected exactly one parameter for '{task}', got {count}")]
    Arity { task: &'static str, count: usize },
    #[error("validation failed for '{task}': {rule}")]
    Validation { task: &'static str, rule: &'static str },
}
