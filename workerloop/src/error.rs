// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single task, carried inside its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TaskError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("{0}")]
    Execution(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("stream failed: {0}")]
    Stream(String),

    #[error("{type_name} has no method `{method}`")]
    UnknownMethod { type_name: String, method: String },

    #[error("{type_name} has no attribute `{name}`")]
    UnknownAttribute { type_name: String, name: String },

    #[error("cannot set attribute `{name}`: {reason}")]
    Attribute { name: String, reason: String },

    #[error("bad argument: {0}")]
    Argument(String),

    #[error("task returned a stream but the worker loop is not streaming")]
    NotStreaming,
}

impl TaskError {
    pub fn unknown_method(type_name: &str, method: &str) -> Self {
        TaskError::UnknownMethod {
            type_name: type_name.to_string(),
            method: method.to_string(),
        }
    }

    /// Keeps a `TaskError` raised inside user code intact, flattens anything else.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<TaskError>() {
            Ok(task_error) => task_error,
            Err(other) => TaskError::Execution(format!("{other:#}")),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        TaskError::Panicked(panic_message(payload.as_ref()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Failures of the scheduler itself, as opposed to the tasks it runs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to spawn thread {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task channel is closed")]
    Closed,

    #[error("scheduler `{0}` is not running")]
    NotRunning(String),
}
