// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Units of work as the origin builds them, and what the workers send back.

mod args;
mod outcome;
mod result;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{ErasedObject, ObjectRef, Remote};

pub use args::{Args, Callable, Resolved, TaskFn};
pub use outcome::{IterProducer, Outcome, Producer, Step, StreamProducer, TryIterProducer};
pub use result::{SyncSnapshot, TaskResult};

/// What a task runs.
#[derive(Debug, Clone)]
pub enum Target {
    /// A function with no receiver.
    Unbound(Callable),
    /// A named method on an object.
    Bound(ErasedObject, String),
    /// No call at all; the result is the object's snapshot.
    CachedReceiverOnly(ErasedObject),
    /// A named method on a worker variable.
    Variable(String, String),
}

/// A task argument before encoding.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Object(ErasedObject),
}

/// Attributes to snapshot from the receiver after the task ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSpec {
    pub properties: Vec<String>,
    /// Zero-argument methods whose return values are snapshotted too.
    pub getters: Vec<String>,
}

impl SyncSpec {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.getters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Call,
    Method,
    CacheObject,
    Variable,
    SaveVariables,
    ProxyCreate,
    ProxyCall,
    ProxySet,
}

/// Description of the task a result belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub kind: TaskKind,
    pub target: String,
    pub cached: bool,
    pub has_output: bool,
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.target)
    }
}

/// A unit of work, built on the origin side.
///
/// ```ignore
/// let task = Task::method(&counter, "add").arg(3).key("after-add");
/// scheduler.add_cache_event(task)?;
/// ```
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) target: Target,
    pub(crate) args: Vec<Arg>,
    pub(crate) kwargs: BTreeMap<String, Arg>,
    pub(crate) has_output: Option<bool>,
    pub(crate) key: Option<String>,
    pub(crate) cache: bool,
    pub(crate) re_register: bool,
    pub(crate) sync: SyncSpec,
}

impl Task {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            has_output: None,
            key: None,
            cache: false,
            re_register: false,
            sync: SyncSpec::default(),
        }
    }

    pub fn call<F>(f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self::new(Target::Unbound(Callable::new(f)))
    }

    pub fn callable(callable: Callable) -> Self {
        Self::new(Target::Unbound(callable))
    }

    pub fn method<T: Remote>(object: &ObjectRef<T>, method: impl Into<String>) -> Self {
        Self::new(Target::Bound(object.erase(), method.into()))
    }

    pub fn object<T: Remote>(object: &ObjectRef<T>) -> Self {
        Self::new(Target::CachedReceiverOnly(object.erase()))
    }

    pub fn variable(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(Target::Variable(name.into(), method.into()))
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(Arg::Value(value.into()));
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args
            .extend(values.into_iter().map(|value| Arg::Value(value.into())));
        self
    }

    pub fn object_arg<T: Remote>(mut self, object: &ObjectRef<T>) -> Self {
        self.args.push(Arg::Object(object.erase()));
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), Arg::Value(value.into()));
        self
    }

    pub fn kwobject<T: Remote>(mut self, name: impl Into<String>, object: &ObjectRef<T>) -> Self {
        self.kwargs.insert(name.into(), Arg::Object(object.erase()));
        self
    }

    /// Correlation key copied onto every result of this task.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn has_output(mut self, has_output: bool) -> Self {
        self.has_output = Some(has_output);
        self
    }

    /// Routes the task through the object cache when submitted with `add_event`.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Ships the receiver again even if the worker already has it.
    pub fn re_register(mut self, re_register: bool) -> Self {
        self.re_register = re_register;
        self
    }

    pub fn sync<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sync
            .properties
            .extend(properties.into_iter().map(|name| -> String { name.into() }));
        self
    }

    pub fn sync_getters<I, S>(mut self, getters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sync
            .getters
            .extend(getters.into_iter().map(|name| -> String { name.into() }));
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn correlation_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_cached(&self) -> bool {
        self.cache
    }
}
