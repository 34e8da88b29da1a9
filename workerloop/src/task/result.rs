// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TaskInfo;
use crate::cache::CacheKey;
use crate::error::TaskError;

/// Attribute values read from a worker-side object right after a task ran on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub key: CacheKey,
    pub values: Vec<(String, Value)>,
}

impl SyncSnapshot {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// What comes back from a worker for a task with output.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub value: Option<Value>,
    pub error: Option<TaskError>,
    /// Correlation key copied from the task.
    pub key: Option<String>,
    pub task: Arc<TaskInfo>,
    /// Position within a stream, `None` for single-shot tasks.
    pub stream_index: Option<u64>,
    pub(crate) sync: Option<SyncSnapshot>,
}

impl TaskResult {
    pub(crate) fn new(
        task: Arc<TaskInfo>,
        key: Option<String>,
        outcome: Result<Value, TaskError>,
    ) -> Self {
        let (value, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            value,
            error,
            key,
            task,
            stream_index: None,
            sync: None,
        }
    }

    pub(crate) fn with_sync(mut self, sync: Option<SyncSnapshot>) -> Self {
        self.sync = sync;
        self
    }

    pub(crate) fn with_stream_index(mut self, index: u64) -> Self {
        self.stream_index = Some(index);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn synced(&self) -> Option<&SyncSnapshot> {
        self.sync.as_ref()
    }

    pub fn into_result(self) -> Result<Value, TaskError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value.unwrap_or(Value::Null)),
        }
    }
}
