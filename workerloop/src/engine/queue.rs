// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender, TryRecvError};
use async_io::Timer;
use futures::future::{self, Either};
use futures::pin_mut;
use log::warn;

use crate::error::SchedulerError;

/// Item on a loop channel. `Stop` wakes a blocked receiver and ends its loop.
#[derive(Debug)]
pub enum Message<T> {
    Item(T),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// Nothing arrived in time.
    Empty,
    Closed,
}

#[derive(Default)]
struct Unfinished {
    count: Mutex<usize>,
    all_done: Condvar,
}

impl Unfinished {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self) {
        *self.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.all_done.notify_all();
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut count = self.lock();
        while *count > 0 {
            match deadline {
                None => {
                    count = self
                        .all_done
                        .wait(count)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    count = self
                        .all_done
                        .wait_timeout(count, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        true
    }
}

/// Unbounded FIFO channel that counts unfinished items, so a producer can
/// block until every item it put was marked done.
///
/// Clones share the channel and the counter.
pub struct JoinableQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    unfinished: Arc<Unfinished>,
}

impl<T> Clone for JoinableQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            unfinished: self.unfinished.clone(),
        }
    }
}

impl<T> Default for JoinableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JoinableQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            tx,
            rx,
            unfinished: Arc::new(Unfinished::default()),
        }
    }

    /// Enqueues a counted item.
    pub fn put(&self, item: T) -> Result<(), SchedulerError> {
        self.unfinished.add();
        if self.tx.send_blocking(item).is_err() {
            self.unfinished.done();
            return Err(SchedulerError::Closed);
        }
        Ok(())
    }

    pub(crate) fn put_uncounted(&self, item: T) -> Result<(), SchedulerError> {
        self.tx.send_blocking(item).map_err(|_| SchedulerError::Closed)
    }

    /// Waits up to `timeout` for the next item.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
        match self.rx.try_recv() {
            Ok(item) => return Ok(item),
            Err(TryRecvError::Closed) => return Err(RecvError::Closed),
            Err(TryRecvError::Empty) => {}
        }
        futures::executor::block_on(async {
            let recv = self.rx.recv();
            let timer = Timer::after(timeout);
            pin_mut!(recv, timer);
            match future::select(recv, timer).await {
                Either::Left((Ok(item), _)) => Ok(item),
                Either::Left((Err(_), _)) => Err(RecvError::Closed),
                Either::Right(_) => Err(RecvError::Empty),
            }
        })
    }

    pub fn try_get(&self) -> Result<T, RecvError> {
        self.rx.try_recv().map_err(|err| match err {
            TryRecvError::Empty => RecvError::Empty,
            TryRecvError::Closed => RecvError::Closed,
        })
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Marks one item done. Extra calls are ignored.
    pub fn task_done(&self) {
        self.unfinished.done();
    }

    pub fn unfinished(&self) -> usize {
        *self.unfinished.lock()
    }

    /// Blocks until every counted item was marked done.
    pub fn join(&self) {
        self.unfinished.wait(None);
    }

    /// Like [`join`](Self::join), gives up after `timeout`. Returns whether the queue drained.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        self.unfinished.wait(Some(timeout))
    }
}

impl<T> JoinableQueue<Message<T>> {
    pub(crate) fn put_stop(&self) {
        if let Err(err) = self.put_uncounted(Message::Stop) {
            warn!("could not send stop message: {err}");
        }
    }

    /// Drops leftover stop messages and re-queues everything else in order.
    pub(crate) fn purge_stops(&self) -> usize {
        let mut kept = Vec::new();
        let mut purged = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Stop => purged += 1,
                item => kept.push(item),
            }
        }
        for item in kept {
            if self.tx.send_blocking(item).is_err() {
                warn!("channel closed while re-queueing pending items");
                break;
            }
        }
        purged
    }
}
