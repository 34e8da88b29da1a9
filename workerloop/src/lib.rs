// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # workerloop
//!
//! Runs tasks on long-lived worker threads. Each worker owns a private object
//! [`Registry`]; objects submitted through a cache task are shipped once and then
//! referenced by their [`CacheKey`], so repeated method calls mutate the same
//! worker-side instance. Results travel back over a second channel and are fed to
//! an ordered chain of output handlers on a consumer thread.
//!
//! ```text
//!         +-----------------+   tasks    +------------------+
//!         |    Scheduler    | ---------> | worker loop(s)   |
//!         |  (origin side)  |            | Registry per loop|
//!         +--------+--------+            +---------+--------+
//!                  ^                               |
//!                  |   handlers        results     v
//!         +--------+--------+ <------------------+
//!         |  consumer loop  |
//!         +-----------------+
//! ```
//!
//! A worker started with `streaming` enabled keeps tasks that produce a
//! [`Producer`] alive and advances every pending stream one step per loop
//! iteration. A [`Proxy`] keeps an origin-side mirror of selected attributes of a
//! worker-side object in sync after every remote call.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod proxy;
pub mod task;
pub mod wire;

pub use cache::{
    variable, CacheKey, ErasedObject, LiveObject, ObjectRef, OriginCache, Registry, Remote,
    RemoteObject, Variables,
};
pub use config::{ErrorPolicy, SchedulerConfig};
pub use engine::{
    HandlerChain, HandlerId, JoinableQueue, Message, OutputHandler, Pool, RecvError, ResultQueue,
    Scheduler, SchedulerBuilder, Session, TaskQueue,
};
pub use error::{SchedulerError, TaskError};
pub use proxy::{Proxy, ProxyBuilder};
pub use task::{
    Arg, Args, Callable, IterProducer, Outcome, Producer, Resolved, Step, StreamProducer,
    SyncSnapshot, SyncSpec, Target, Task, TaskInfo, TaskKind, TaskResult, TryIterProducer,
};
pub use wire::WireTask;
