// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::BTreeMap;
use std::ops::Deref;

use serde_json::Value;

use super::scheduler::{Scheduler, SchedulerBuilder};
use crate::error::SchedulerError;
use crate::task::{Args, Callable, Outcome, Task};

/// A scheduler with several workers on one task channel.
///
/// Each worker owns its registry unless one is shared through
/// [`SchedulerBuilder::shared_registry`]; with private registries a cached
/// object lives only on the worker that received its registration.
/// Results of different workers arrive in no particular order.
#[derive(Debug)]
pub struct Pool {
    scheduler: Scheduler,
}

impl Pool {
    pub fn new(workers: usize) -> Self {
        Self::builder(workers).build_pool()
    }

    pub fn builder(workers: usize) -> SchedulerBuilder {
        SchedulerBuilder::new().name("pool").workers(workers)
    }

    pub(crate) fn from_scheduler(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn workers(&self) -> usize {
        self.scheduler.config().workers.max(1)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> Scheduler {
        self.scheduler
    }

    /// Runs `f` once per argument list and waits until all calls are handled.
    pub fn map<F, I, A, V>(&self, f: F, iter_args: I) -> Result<(), SchedulerError>
    where
        F: Fn(&Args) -> anyhow::Result<Outcome> + Send + Sync + 'static,
        I: IntoIterator<Item = A>,
        A: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map_with_kwargs(Callable::new(f), iter_args, Vec::new(), false)
    }

    /// Like [`map`](Self::map); the n-th call also gets the n-th keyword map.
    pub fn map_with_kwargs<I, A, V>(
        &self,
        f: Callable,
        iter_args: I,
        iter_kwargs: Vec<BTreeMap<String, Value>>,
        cache: bool,
    ) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = A>,
        A: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.scheduler.is_running() {
            return Err(SchedulerError::NotRunning(
                self.scheduler.name().to_string(),
            ));
        }
        for (index, args) in iter_args.into_iter().enumerate() {
            let mut task = Task::callable(f.clone()).args(args).cache(cache);
            if let Some(kwargs) = iter_kwargs.get(index) {
                for (name, value) in kwargs {
                    task = task.kwarg(name.clone(), value.clone());
                }
            }
            self.scheduler.add_event(task)?;
        }
        self.scheduler.wait();
        Ok(())
    }
}

impl Deref for Pool {
    type Target = Scheduler;

    fn deref(&self) -> &Scheduler {
        &self.scheduler
    }
}
