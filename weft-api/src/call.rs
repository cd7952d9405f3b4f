//! Typed calls.
//!
//! A `Call` binds a request type to a task name and an output type. The request is
//! carried as the single parameter of the task; the task's return value is decoded
//! into `Output` on the caller's side. Usually derived:
//!
//! ```rust,ignore
//! #[derive(Call, Serialize, Deserialize)]
//! #[call(task = "add", result = "i64")]
//! struct Add { a: i64, b: i64 }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::errors::CodecError;
use crate::types::Payload;

pub trait Call: Serialize + DeserializeOwned + Send + 'static {
    /// Value produced by the task
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Name of the task in the worker's definitions
    fn task_name() -> &'static str;

    /// Checked by the caller before anything is posted.
    fn validate(&self) -> Result<(), CodecError> {
        Ok(())
    }

    /// Upper bound on how long the caller waits for the response.
    fn timeout() -> Option<Duration> {
        None
    }

    fn to_params(&self) -> Result<Vec<Payload>, CodecError> {
        self.validate()?;
        let value = serde_json::to_value(self).map_err(|source| CodecError::Encode {
            task: Self::task_name(),
            source,
        })?;
        Ok(vec![value])
    }

    fn from_params(params: Vec<Payload>) -> Result<Self, CodecError> {
        let count = params.len();
        let mut params = params.into_iter();
        match (params.next(), params.next()) {
            (Some(value), None) => serde_json::from_value(value).map_err(|source| {
                CodecError::Decode {
                    task: Self::task_name(),
                    source,
                }
            }),
            _ => Err(CodecError::Arity {
                task: Self::task_name(),
                count,
            }),
        }
    }

    fn encode_output(output: &Self::Output) -> Result<Payload, CodecError> {
        serde_json::to_value(output).map_err(|source| CodecError::Encode {
            task: Self::task_name(),
            source,
        })
    }

    /// A task that returned nothing decodes from `null`.
    fn decode_output(value: Option<Payload>) -> Result<Self::Output, CodecError> {
        serde_json::from_value(value.unwrap_or(Payload::Null)).map_err(|source| {
            CodecError::Decode {
                task: Self::task_name(),
                source,
            }
        })
    }
}
