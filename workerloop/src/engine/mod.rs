// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Worker and consumer loops
//!
//! - A [`Scheduler`] owns one task channel and one result channel, both
//!   [`JoinableQueue`]s, so `wait` can block until every item was marked done.
//! - Each worker is a named thread running a dispatch loop, or a streaming loop
//!   when the scheduler is configured for streams.
//! - The consumer thread hands every result to the [`HandlerChain`].
//! - Stopping clears the liveness flags and sends one `Stop` message per loop.
//!   A loop that loses liveness still runs what was queued at that moment.
//!
//! ```text
//!         +-------------+     Message<WireTask>      +---------------+
//!         |  Scheduler  | -------------------------> | EventLoop-x_0 |
//!         |             |                 \--------> | EventLoop-x_1 |
//!         +------+------+                            +-------+-------+
//!                ^          Message<TaskResult>              |
//!                |   +------------------+                    |
//!                +---| Consumer-x       | <------------------+
//!                    +------------------+
//! ```

mod consumer;
mod handlers;
mod liveness;
mod pool;
mod queue;
mod scheduler;
mod stream;
mod worker;


use crate::task::TaskResult;
use crate::wire::WireTask;

pub use consumer::ErrorHook;
pub use handlers::{HandlerChain, HandlerId, OutputHandler};
pub use liveness::ParentProbe;
pub use pool::Pool;
pub use queue::{JoinableQueue, Message, RecvError};
pub use scheduler::{Scheduler, SchedulerBuilder, Session};
pub use worker::Initializer;

pub type TaskQueue = JoinableQueue<Message<WireTask>>;
pub type ResultQueue = JoinableQueue<Message<TaskResult>>;
