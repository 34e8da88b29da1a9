// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use super::queue::JoinableQueue;

/// Extra check for whether the owning side is still around. Loops that see it
/// return `false` drain what is queued and end, as if stopped.
pub type ParentProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Whether a loop should keep waiting for new work.
#[derive(Clone)]
pub(crate) struct Liveness {
    flag: Arc<AtomicBool>,
    probe: Option<ParentProbe>,
}

impl Liveness {
    pub(crate) fn new(flag: Arc<AtomicBool>, probe: Option<ParentProbe>) -> Self {
        Self { flag, probe }
    }

    /// Without a probe the parent counts as alive.
    pub(crate) fn parent_alive(&self) -> bool {
        self.probe.as_ref().map_or(true, |probe| probe())
    }

    pub(crate) fn should_continue(&self) -> bool {
        self.flag.load(Ordering::SeqCst) && self.parent_alive()
    }

    pub(crate) fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Decides before each loop iteration whether to go on.
///
/// While live, always. Once liveness is lost, the queue length at that moment
/// becomes a countdown so already queued work still runs and the loop ends.
pub(crate) struct LoopBudget<'a, T> {
    liveness: &'a Liveness,
    queue: &'a JoinableQueue<T>,
    countdown: Option<usize>,
}

impl<'a, T> LoopBudget<'a, T> {
    pub(crate) fn new(liveness: &'a Liveness, queue: &'a JoinableQueue<T>) -> Self {
        Self {
            liveness,
            queue,
            countdown: None,
        }
    }

    pub(crate) fn next_round(&mut self) -> bool {
        match self.countdown {
            Some(0) => false,
            Some(left) => {
                self.countdown = Some(left - 1);
                true
            }
            None if self.liveness.should_continue() => true,
            None => {
                let queued = self.queue.len();
                debug!("liveness lost, draining {queued} queued message(s)");
                self.countdown = Some(queued.saturating_sub(1));
                queued > 0
            }
        }
    }

    pub(crate) fn draining(&self) -> bool {
        self.countdown.is_some()
    }
}
