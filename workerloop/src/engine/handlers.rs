// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::task::TaskResult;

/// Gets every result in chain order; returning `true` stops the chain.
pub type OutputHandler = Arc<dyn Fn(&TaskResult) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered output handlers, shared between a scheduler and its consumer loop.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Arc<RwLock<Vec<(HandlerId, OutputHandler)>>>,
    next_id: Arc<AtomicU64>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler`. Adding the same `Arc` twice returns the first id.
    pub fn add(&self, handler: OutputHandler) -> HandlerId {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((id, _)) = handlers.iter().find(|(_, known)| same_handler(known, &handler)) {
            return *id;
        }
        let id = self.fresh_id();
        handlers.push((id, handler));
        id
    }

    /// Puts `handler` at `index`, moving it there if it is already in the chain.
    pub fn insert(&self, index: usize, handler: OutputHandler) -> HandlerId {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let id = match handlers.iter().position(|(_, known)| same_handler(known, &handler)) {
            Some(position) => handlers.remove(position).0,
            None => self.fresh_id(),
        };
        let index = index.min(handlers.len());
        handlers.insert(index, (id, handler));
        id
    }

    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(known, _)| *known != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the chain on `result`. Returns whether a handler consumed it.
    pub fn dispatch(&self, result: &TaskResult) -> bool {
        // handlers may edit the chain, so run them on a snapshot
        let handlers: Vec<OutputHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        handlers.iter().any(|handler| handler(result))
    }

    fn fresh_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn same_handler(a: &OutputHandler, b: &OutputHandler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
