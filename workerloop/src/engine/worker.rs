// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::liveness::{Liveness, LoopBudget};
use super::queue::{Message, RecvError};
use super::{ResultQueue, TaskQueue};
use crate::cache::{CacheKey, Registry, Variables};
use crate::task::TaskResult;
use crate::wire::{guarded, WireTask};

/// Runs once on every worker before its loop starts.
pub type Initializer = Arc<dyn Fn() -> anyhow::Result<Variables> + Send + Sync>;

/// Everything a worker thread owns.
pub(crate) struct WorkerContext {
    pub(crate) name: String,
    pub(crate) tasks: TaskQueue,
    /// `None` when nobody consumes results.
    pub(crate) results: Option<ResultQueue>,
    pub(crate) liveness: Liveness,
    pub(crate) registry: Registry,
    pub(crate) initializer: Option<Initializer>,
    pub(crate) timeout: Duration,
}

impl WorkerContext {
    pub(crate) fn initialize(&self) {
        let Some(initializer) = &self.initializer else {
            return;
        };
        match guarded(|| initializer()) {
            Ok(variables) => {
                for (name, object) in variables {
                    debug!("{}: installing variable {}", self.name, name);
                    self.registry.install(CacheKey::Named(name), object, true);
                }
            }
            Err(err) => error!("{}: initializer failed: {}", self.name, err),
        }
    }

    /// Sends `result` to the consumer if the task wants output.
    pub(crate) fn emit(&self, result: TaskResult, has_output: bool) {
        if !has_output {
            if let Some(err) = &result.error {
                warn!("{}: task {} failed without output: {}", self.name, result.task, err);
            }
            return;
        }
        let Some(results) = &self.results else {
            return;
        };
        if let Err(err) = results.put(Message::Item(result)) {
            warn!("{}: dropping result: {}", self.name, err);
        }
    }

    pub(crate) fn receive(&self, draining: bool, wait: Option<Duration>) -> Result<Message<WireTask>, RecvError> {
        match wait {
            Some(timeout) if !draining => self.tasks.get_timeout(timeout),
            _ => self.tasks.try_get(),
        }
    }
}

/// Marks a task slot done when dropped, also on unwind.
struct SlotGuard<'a>(&'a TaskQueue);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

/// Plain worker loop: one task at a time, strictly in channel order.
pub(crate) fn run_dispatch_loop(ctx: WorkerContext) {
    info!("Starting worker loop {}", ctx.name);
    ctx.initialize();

    let mut budget = LoopBudget::new(&ctx.liveness, &ctx.tasks);
    while budget.next_round() {
        match ctx.receive(budget.draining(), Some(ctx.timeout)) {
            Ok(Message::Item(task)) => {
                let _slot = SlotGuard(&ctx.tasks);
                let execution = task.decode(&ctx.registry).run();
                let has_output = execution.has_output();
                ctx.emit(execution.into_result(), has_output);
            }
            Ok(Message::Stop) => {
                debug!("{}: stop message received", ctx.name);
                break;
            }
            Err(RecvError::Empty) if budget.draining() => break,
            Err(RecvError::Empty) => {}
            Err(RecvError::Closed) => break,
        }
    }

    ctx.liveness.clear();
    info!("Worker loop {} finished", ctx.name);
}
