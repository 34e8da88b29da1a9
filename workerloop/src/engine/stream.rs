// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};

use super::liveness::LoopBudget;
use super::queue::{Message, RecvError};
use super::worker::WorkerContext;
use crate::error::TaskError;
use crate::task::{Producer, Step, TaskInfo, TaskResult};
use crate::wire::{Execution, Produced};

/// How long a streaming loop sleeps on the task channel when no stream moved.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// A stream task whose channel slot stays open until it ends.
pub(crate) struct PendingStream {
    info: Arc<TaskInfo>,
    key: Option<String>,
    has_output: bool,
    producer: Box<dyn Producer>,
    emitted: u64,
}

impl PendingStream {
    pub(crate) fn new(
        info: Arc<TaskInfo>,
        key: Option<String>,
        has_output: bool,
        producer: Box<dyn Producer>,
    ) -> Self {
        Self {
            info,
            key,
            has_output,
            producer,
            emitted: 0,
        }
    }

    fn result(&mut self, outcome: Result<serde_json::Value, TaskError>) -> TaskResult {
        let index = self.emitted;
        self.emitted += 1;
        TaskResult::new(self.info.clone(), self.key.clone(), outcome).with_stream_index(index)
    }
}

/// Streams advanced round-robin, in the order they were started.
#[derive(Default)]
pub(crate) struct PendingStreams {
    streams: Vec<PendingStream>,
}

impl PendingStreams {
    pub(crate) fn push(&mut self, stream: PendingStream) {
        self.streams.push(stream);
    }

    pub(crate) fn len(&self) -> usize {
        self.streams.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Advances every stream by exactly one step. `emit` gets each produced
    /// result with the stream's output flag, `finished` is called once per
    /// stream that ended. Returns whether any stream moved.
    pub(crate) fn advance_round(
        &mut self,
        mut emit: impl FnMut(TaskResult, bool),
        mut finished: impl FnMut(),
    ) -> bool {
        let mut progressed = false;
        self.streams.retain_mut(|stream| {
            let step = panic::catch_unwind(AssertUnwindSafe(|| stream.producer.advance_one()))
                .unwrap_or_else(|payload| Step::Error(TaskError::from_panic(payload)));
            match step {
                Step::Value(value) => {
                    progressed = true;
                    trace!("stream {} yielded item {}", stream.info, stream.emitted);
                    let result = stream.result(Ok(value));
                    emit(result, stream.has_output);
                    true
                }
                Step::Pending => true,
                Step::Exhausted => {
                    progressed = true;
                    debug!("stream {} exhausted after {} item(s)", stream.info, stream.emitted);
                    finished();
                    false
                }
                Step::Error(error) => {
                    progressed = true;
                    let result = stream.result(Err(error));
                    emit(result, stream.has_output);
                    finished();
                    false
                }
            }
        });
        progressed
    }

    /// Drops all streams, calling `finished` for each. Returns how many there were.
    pub(crate) fn abandon(&mut self, mut finished: impl FnMut()) -> usize {
        let count = self.streams.len();
        for _ in self.streams.drain(..) {
            finished();
        }
        count
    }
}

/// Splits an execution into a stream to keep or a finished result.
fn settle(execution: Execution) -> Result<PendingStream, (TaskResult, bool)> {
    let Execution {
        info,
        key,
        has_output,
        outcome,
        sync,
    } = execution;
    match outcome {
        Ok(Produced::Stream(producer)) => Ok(PendingStream::new(info, key, has_output, producer)),
        outcome => {
            let finished = Execution {
                info,
                key,
                has_output,
                outcome,
                sync,
            };
            Err((finished.into_result(), has_output))
        }
    }
}

/// Streaming worker loop.
///
/// Each iteration takes at most one new task, then advances every pending
/// stream by one step. With streams pending the task channel is only polled.
pub(crate) fn run_stream_loop(ctx: WorkerContext) {
    info!("Starting streaming worker loop {}", ctx.name);
    ctx.initialize();

    let mut pending = PendingStreams::default();
    let mut idle = false;
    let mut budget = LoopBudget::new(&ctx.liveness, &ctx.tasks);
    while budget.next_round() {
        let wait = match (pending.is_empty(), idle) {
            (true, _) => Some(ctx.timeout),
            (false, true) => Some(IDLE_BACKOFF),
            (false, false) => None,
        };
        match ctx.receive(budget.draining(), wait) {
            Ok(Message::Item(task)) => match settle(task.decode(&ctx.registry).run()) {
                Ok(stream) => {
                    debug!("{}: task {} became a stream", ctx.name, stream.info);
                    pending.push(stream);
                }
                Err((result, has_output)) => {
                    ctx.emit(result, has_output);
                    ctx.tasks.task_done();
                }
            },
            Ok(Message::Stop) => {
                debug!("{}: stop message received", ctx.name);
                break;
            }
            Err(RecvError::Empty) if budget.draining() => break,
            Err(RecvError::Empty) => {}
            Err(RecvError::Closed) => break,
        }

        let progressed = pending.advance_round(
            |result, has_output| ctx.emit(result, has_output),
            || ctx.tasks.task_done(),
        );
        idle = !progressed;
    }

    let abandoned = pending.abandon(|| ctx.tasks.task_done());
    if abandoned > 0 {
        warn!("{}: abandoned {} unfinished stream(s)", ctx.name, abandoned);
    }
    ctx.liveness.clear();
    info!("Streaming worker loop {} finished", ctx.name);
}
