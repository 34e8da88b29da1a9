// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};

use super::handlers::HandlerChain;
use super::liveness::{Liveness, LoopBudget};
use super::queue::{Message, RecvError};
use super::ResultQueue;
use crate::config::ErrorPolicy;
use crate::error::{panic_message, TaskError};
use crate::proxy::ProxyTable;
use crate::task::TaskResult;

/// Called for every failed result that reaches the error report.
pub type ErrorHook = Arc<dyn Fn(&TaskResult, &TaskError) + Send + Sync>;

pub(crate) struct ConsumerContext {
    pub(crate) name: String,
    pub(crate) results: ResultQueue,
    pub(crate) liveness: Liveness,
    pub(crate) handlers: HandlerChain,
    pub(crate) proxies: ProxyTable,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) policy: ErrorPolicy,
    pub(crate) timeout: Duration,
}

impl ConsumerContext {
    /// Proxy mirrors are refreshed first, failed or not. Successful proxy
    /// results stop there; failures go on to the error policy.
    pub(crate) fn process_output(&self, result: &TaskResult) {
        let synced = self.proxies.apply(result);
        match (&result.error, self.policy) {
            (None, _) if synced => {}
            (None, _) => {
                self.dispatch(result);
            }
            (Some(err), ErrorPolicy::Report) => self.report(result, err),
            (Some(err), ErrorPolicy::Dispatch) => {
                if !self.dispatch(result) {
                    self.report(result, err);
                }
            }
        }
    }

    fn dispatch(&self, result: &TaskResult) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.handlers.dispatch(result))) {
            Ok(consumed) => consumed,
            Err(payload) => {
                error!(
                    "{}: output handler panicked on {}: {}",
                    self.name,
                    result.task,
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }

    fn report(&self, result: &TaskResult, err: &TaskError) {
        match &result.key {
            Some(key) => error!("{}: task {} [{}] failed: {}", self.name, result.task, key, err),
            None => error!("{}: task {} failed: {}", self.name, result.task, err),
        }
        if let Some(hook) = &self.on_error {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(result, err))) {
                error!(
                    "{}: error hook panicked: {}",
                    self.name,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

/// Feeds results to the handler chain until stopped.
pub(crate) fn run_consumer_loop(ctx: ConsumerContext) {
    info!("Starting consumer loop {}", ctx.name);

    let mut budget = LoopBudget::new(&ctx.liveness, &ctx.results);
    while budget.next_round() {
        let received = if budget.draining() {
            ctx.results.try_get()
        } else {
            ctx.results.get_timeout(ctx.timeout)
        };
        match received {
            Ok(Message::Item(result)) => {
                ctx.process_output(&result);
                ctx.results.task_done();
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
    info!("Consumer loop {} finished", ctx.name);
}
