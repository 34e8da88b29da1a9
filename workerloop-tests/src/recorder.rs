// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use workerloop::{OutputHandler, TaskError, TaskResult};

/// Collects every result it sees, in arrival order.
#[derive(Clone, Default)]
pub struct Recorder {
    results: Arc<Mutex<Vec<TaskResult>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that records and passes the result on.
    pub fn handler(&self) -> OutputHandler {
        self.with_verdict(false)
    }

    /// Handler that records and consumes the result.
    pub fn consumer(&self) -> OutputHandler {
        self.with_verdict(true)
    }

    fn with_verdict(&self, consumed: bool) -> OutputHandler {
        let results = self.results.clone();
        Arc::new(move |result: &TaskResult| {
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(result.clone());
            consumed
        })
    }

    pub fn results(&self) -> Vec<TaskResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of successful results; failures are skipped.
    pub fn values(&self) -> Vec<Value> {
        self.results()
            .into_iter()
            .filter_map(|result| result.value)
            .collect()
    }

    pub fn values_for(&self, key: &str) -> Vec<Value> {
        self.results()
            .into_iter()
            .filter(|result| result.key() == Some(key))
            .filter_map(|result| result.value)
            .collect()
    }

    pub fn errors(&self) -> Vec<TaskError> {
        self.results()
            .into_iter()
            .filter_map(|result| result.error)
            .collect()
    }

    /// Integer values, sorted. For loops whose order is not defined.
    pub fn sorted_ints(&self) -> Vec<i64> {
        let mut ints: Vec<i64> = self
            .values()
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        ints.sort_unstable();
        ints
    }

    /// Polls until at least `count` results arrived. Returns whether they did.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.len() < count {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }
}
