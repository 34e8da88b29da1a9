// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use super::consumer::{run_consumer_loop, ConsumerContext, ErrorHook};
use super::handlers::{HandlerChain, HandlerId, OutputHandler};
use super::liveness::{Liveness, ParentProbe};
use super::pool::Pool;
use super::queue::Message;
use super::stream::run_stream_loop;
use super::worker::{run_dispatch_loop, Initializer, WorkerContext};
use super::{ResultQueue, TaskQueue};
use crate::cache::{CacheKey, ObjectRef, OriginCache, Registry, Remote, Variables};
use crate::config::{ErrorPolicy, SchedulerConfig};
use crate::error::{panic_message, SchedulerError, TaskError};
use crate::proxy::{Mirror, ProxyTable};
use crate::task::{Args, Task, TaskResult};
use crate::wire::WireTask;

struct LoopState {
    workers_alive: Arc<AtomicBool>,
    consumer_alive: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
    needs_close: bool,
}

/// Owns the task and result channels plus the threads serving them.
///
/// All methods take `&self`, so a scheduler can be shared through an `Arc`.
/// Dropping a scheduler that was started closes it, which waits for the
/// queued work first.
pub struct Scheduler {
    config: SchedulerConfig,
    tasks: TaskQueue,
    results: ResultQueue,
    shared_tasks: bool,
    shared_results: bool,
    handlers: HandlerChain,
    origin: Arc<OriginCache>,
    registry: Option<Registry>,
    initializer: Option<Initializer>,
    probe: Option<ParentProbe>,
    on_error: Option<ErrorHook>,
    proxies: ProxyTable,
    state: Mutex<LoopState>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        SchedulerBuilder::new().config(config).build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn handlers(&self) -> &HandlerChain {
        &self.handlers
    }

    pub fn task_queue(&self) -> &TaskQueue {
        &self.tasks
    }

    pub fn result_queue(&self) -> &ResultQueue {
        &self.results
    }

    pub fn origin_cache(&self) -> &Arc<OriginCache> {
        &self.origin
    }

    /// The registry every worker shares, if one was injected.
    pub fn shared_registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    pub fn add_output_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&TaskResult) -> bool + Send + Sync + 'static,
    {
        self.handlers.add(Arc::new(handler))
    }

    pub fn insert_output_handler<F>(&self, index: usize, handler: F) -> HandlerId
    where
        F: Fn(&TaskResult) -> bool + Send + Sync + 'static,
    {
        self.handlers.insert(index, Arc::new(handler))
    }

    pub fn remove_output_handler(&self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    /// Queues a task. Tasks marked with [`Task::cache`] go through the object cache.
    pub fn add_event(&self, task: Task) -> Result<(), SchedulerError> {
        if task.is_cached() {
            return self.add_cache_event(task);
        }
        self.submit(WireTask::encode_plain(task))
    }

    pub fn add_cache_event(&self, task: Task) -> Result<(), SchedulerError> {
        self.submit(WireTask::encode_cached(task, &self.origin))
    }

    /// Ships `object` to the workers without calling anything on it.
    pub fn cache_object<T: Remote>(&self, object: &ObjectRef<T>) -> Result<(), SchedulerError> {
        self.add_cache_event(Task::object(object).has_output(false))
    }

    pub fn is_object_cached<T: Remote>(&self, object: &ObjectRef<T>) -> bool {
        self.origin.is_shipped(object.key())
    }

    /// Runs `create` on a worker and installs the returned objects as named variables.
    pub fn save_variables<F>(&self, create: F) -> Result<(), SchedulerError>
    where
        F: Fn(&Args) -> anyhow::Result<Variables> + Send + Sync + 'static,
    {
        self.submit(WireTask::create_variables(Arc::new(create), Vec::new(), false))
    }

    /// Calls `method` on the worker variable `name`.
    pub fn add_var_event<I, V>(
        &self,
        name: impl Into<String>,
        method: impl Into<String>,
        args: I,
    ) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.add_event(Task::variable(name, method).args(args))
    }

    pub(crate) fn submit(&self, task: WireTask) -> Result<(), SchedulerError> {
        debug!("{}: queueing {:?}", self.config.name, task);
        self.tasks.put(Message::Item(task))
    }

    /// Adds `handlers` and `tasks`, then starts the loops unless they already run.
    pub fn run<I>(&self, tasks: I, handlers: Vec<OutputHandler>) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = Task>,
    {
        for handler in handlers {
            self.handlers.add(handler);
        }
        for task in tasks {
            self.add_event(task)?;
        }
        if !self.is_running() {
            self.start()?;
        }
        Ok(())
    }

    /// [`run`](Self::run), then [`close`](Self::close).
    pub fn run_until_complete<I>(
        &self,
        tasks: I,
        handlers: Vec<OutputHandler>,
    ) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = Task>,
    {
        self.run(tasks, handlers)?;
        self.close();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state().workers_alive.load(Ordering::SeqCst)
    }

    pub fn is_worker_alive(&self) -> bool {
        self.state().workers.iter().any(|handle| !handle.is_finished())
    }

    pub fn is_consumer_alive(&self) -> bool {
        self.state()
            .consumer
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Starts the worker loops and, with `has_results`, the consumer loop.
    /// Loops that are already running are stopped first.
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.stop();

        let mut state = self.state();
        state.workers_alive.store(true, Ordering::SeqCst);
        state.consumer_alive.store(true, Ordering::SeqCst);
        if self.registry.is_none() {
            // fresh worker registries know nothing yet
            self.origin.clear();
        }
        if let Err(err) = self.spawn_loops(&mut state) {
            drop(state);
            self.stop();
            return Err(err);
        }
        state.needs_close = true;
        info!(
            "Scheduler {} started with {} worker(s)",
            self.config.name,
            state.workers.len()
        );
        Ok(())
    }

    fn spawn_loops(&self, state: &mut LoopState) -> Result<(), SchedulerError> {
        let timeout = self.config.queue_timeout();
        let workers = self.config.workers.max(1);
        let results = (self.config.has_results || self.shared_results).then(|| self.results.clone());
        let liveness = Liveness::new(state.workers_alive.clone(), self.probe.clone());

        for index in 0..workers {
            let name = if workers == 1 {
                format!("EventLoop-{}", self.config.name)
            } else {
                format!("EventLoop-{}_{}", self.config.name, index)
            };
            let ctx = WorkerContext {
                name: name.clone(),
                tasks: self.tasks.clone(),
                results: results.clone(),
                liveness: liveness.clone(),
                registry: self.registry.clone().unwrap_or_default(),
                initializer: self.initializer.clone(),
                timeout,
            };
            let streaming = self.config.streaming;
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    if streaming {
                        run_stream_loop(ctx)
                    } else {
                        run_dispatch_loop(ctx)
                    }
                })
                .map_err(|source| SchedulerError::Spawn { name, source })?;
            state.workers.push(handle);
        }

        if self.config.has_results {
            let name = format!("Consumer-{}", self.config.name);
            let ctx = ConsumerContext {
                name: name.clone(),
                results: self.results.clone(),
                liveness: Liveness::new(state.consumer_alive.clone(), self.probe.clone()),
                handlers: self.handlers.clone(),
                proxies: self.proxies.clone(),
                on_error: self.on_error.clone(),
                policy: self.config.error_policy,
                timeout,
            };
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_consumer_loop(ctx))
                .map_err(|source| SchedulerError::Spawn { name, source })?;
            state.consumer = Some(handle);
        }
        Ok(())
    }

    /// Stops the loops. Tasks queued before the call still run; the consumer
    /// stops after the workers, so their results are still handled.
    pub fn stop(&self) {
        let (workers, consumer, consumer_alive) = {
            let mut state = self.state();
            state.workers_alive.store(false, Ordering::SeqCst);
            state.needs_close = false;
            (
                std::mem::take(&mut state.workers),
                state.consumer.take(),
                state.consumer_alive.clone(),
            )
        };
        if workers.is_empty() && consumer.is_none() {
            return;
        }

        if !self.shared_tasks {
            for _ in &workers {
                self.tasks.put_stop();
            }
        }
        for handle in workers {
            join_loop(handle);
        }

        consumer_alive.store(false, Ordering::SeqCst);
        if let Some(handle) = consumer {
            if !self.shared_results {
                self.results.put_stop();
            }
            join_loop(handle);
        }

        if !self.shared_tasks {
            self.tasks.purge_stops();
        }
        if !self.shared_results {
            self.results.purge_stops();
        }
        info!("Scheduler {} stopped", self.config.name);
    }

    /// Blocks until every queued task ran and every result was handled.
    /// Returns at once for loops that are not running.
    pub fn wait(&self) {
        let poll = self.poll_interval();
        while self.is_worker_alive() && !self.tasks.join_timeout(poll) {}
        while self.is_consumer_alive() && !self.results.join_timeout(poll) {}
    }

    /// [`wait`](Self::wait), then [`stop`](Self::stop). Does nothing unless the
    /// scheduler was started since the last close.
    pub fn close(&self) {
        {
            let mut state = self.state();
            if !state.needs_close {
                return;
            }
            state.needs_close = false;
        }
        self.wait();
        self.stop();
    }

    /// Starts the scheduler if needed and closes it when the guard drops.
    pub fn session(&self) -> Result<Session<'_>, SchedulerError> {
        if !self.is_running() {
            self.start()?;
        }
        Ok(Session { scheduler: self })
    }

    /// Results carrying a sync snapshot for `key` refresh `mirror` before any
    /// handler or error report sees them.
    pub(crate) fn attach_proxy(&self, key: CacheKey, mirror: &Arc<Mirror>) {
        self.proxies.register(key, mirror);
    }

    fn poll_interval(&self) -> Duration {
        self.config.queue_timeout().min(Duration::from_millis(100))
    }

    fn state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.close();
        self.stop();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("queued", &self.tasks.len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

fn join_loop(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    if let Err(payload) = handle.join() {
        warn!("loop {} ended with a panic: {}", name, panic_message(payload.as_ref()));
    }
}

/// Keeps a scheduler running for its lifetime; closes it on drop.
pub struct Session<'a> {
    scheduler: &'a Scheduler,
}

impl Deref for Session<'_> {
    type Target = Scheduler;

    fn deref(&self) -> &Scheduler {
        self.scheduler
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.scheduler.close();
    }
}

/// Builds a [`Scheduler`] or [`Pool`].
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    initializer: Option<Initializer>,
    probe: Option<ParentProbe>,
    registry: Option<Registry>,
    origin: Option<Arc<OriginCache>>,
    on_error: Option<ErrorHook>,
    task_queue: Option<TaskQueue>,
    result_queue: Option<ResultQueue>,
    handlers: Vec<OutputHandler>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn has_results(mut self, has_results: bool) -> Self {
        self.config.has_results = has_results;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.config.streaming = streaming;
        self
    }

    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    /// Runs on each worker before its loop; the returned objects become named variables.
    pub fn initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn() -> anyhow::Result<Variables> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    /// Loops also end once `probe` returns false.
    pub fn parent_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// One registry for all workers instead of one each.
    pub fn shared_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Shares the record of shipped objects with another scheduler.
    pub fn origin_cache(mut self, origin: Arc<OriginCache>) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskResult, &TaskError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Uses an existing task channel, e.g. one fed by another scheduler.
    pub fn task_queue(mut self, queue: TaskQueue) -> Self {
        self.task_queue = Some(queue);
        self
    }

    /// Uses an existing result channel, e.g. one drained by another scheduler.
    pub fn result_queue(mut self, queue: ResultQueue) -> Self {
        self.result_queue = Some(queue);
        self
    }

    pub fn output_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TaskResult) -> bool + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn build(self) -> Scheduler {
        let handlers = HandlerChain::new();
        for handler in self.handlers {
            handlers.add(handler);
        }
        Scheduler {
            config: self.config,
            shared_tasks: self.task_queue.is_some(),
            shared_results: self.result_queue.is_some(),
            tasks: self.task_queue.unwrap_or_default(),
            results: self.result_queue.unwrap_or_default(),
            handlers,
            origin: self.origin.unwrap_or_default(),
            registry: self.registry,
            initializer: self.initializer,
            probe: self.probe,
            on_error: self.on_error,
            proxies: ProxyTable::default(),
            state: Mutex::new(LoopState {
                workers_alive: Arc::new(AtomicBool::new(false)),
                consumer_alive: Arc::new(AtomicBool::new(false)),
                workers: Vec::new(),
                consumer: None,
                needs_close: false,
            }),
        }
    }

    pub fn build_pool(self) -> Pool {
        Pool::from_scheduler(self.build())
    }
}
