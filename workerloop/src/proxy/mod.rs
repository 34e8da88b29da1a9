// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Origin-side stand-in for an object that lives on a worker.
//!
//! A [`Proxy`] creates its object on the worker, forwards method calls and
//! attribute writes as cache tasks, and keeps a [`Mirror`] of declared
//! properties and getters. Reads are served from the mirror and only change
//! when the consumer loop applies a sync result, so a read right after a call
//! may still show the old value.

mod mirror;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{short_type_name, CacheKey, Remote, RemoteObject};
use crate::engine::Scheduler;
use crate::error::SchedulerError;
use crate::task::SyncSpec;
use crate::wire::{Factory, Member, WireTask};

pub use mirror::Mirror;
pub(crate) use mirror::ProxyTable;

/// Declares which attributes a [`Proxy`] mirrors.
pub struct ProxyBuilder {
    scheduler: Arc<Scheduler>,
    properties: Vec<String>,
    getters: Vec<String>,
}

impl ProxyBuilder {
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    pub fn properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties
            .extend(names.into_iter().map(|name| -> String { name.into() }));
        self
    }

    /// A zero-argument method whose return value is mirrored under its own name.
    pub fn getter(mut self, name: impl Into<String>) -> Self {
        self.getters.push(name.into());
        self
    }

    pub fn getters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.getters
            .extend(names.into_iter().map(|name| -> String { name.into() }));
        self
    }

    /// Creates the worker object with `factory` and returns its proxy. Starts
    /// the scheduler if it is not running. The mirror is filled once the
    /// creation result was handled.
    pub fn create<T, F>(self, factory: F) -> Result<Proxy, SchedulerError>
    where
        T: Remote,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let ProxyBuilder {
            scheduler,
            properties,
            getters,
        } = self;
        let key = CacheKey::fresh();
        let mirror = Arc::new(Mirror::with_names(properties.iter().chain(getters.iter())));
        let sync = SyncSpec {
            properties,
            getters,
        };

        scheduler.attach_proxy(key.clone(), &mirror);
        if !scheduler.is_running() {
            scheduler.start()?;
        }
        let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn RemoteObject>);
        scheduler.submit(WireTask::materialize(
            key.clone(),
            short_type_name::<T>(),
            factory,
            sync.clone(),
        ))?;

        Ok(Proxy {
            scheduler,
            key,
            mirror,
            sync,
        })
    }
}

/// Handle to a worker-side object with a mirror of selected attributes.
pub struct Proxy {
    scheduler: Arc<Scheduler>,
    key: CacheKey,
    mirror: Arc<Mirror>,
    sync: SyncSpec,
}

impl Proxy {
    pub fn builder(scheduler: &Arc<Scheduler>) -> ProxyBuilder {
        ProxyBuilder {
            scheduler: scheduler.clone(),
            properties: Vec::new(),
            getters: Vec::new(),
        }
    }

    /// Proxy mirroring `properties` and `getters`.
    pub fn new<T, F>(
        scheduler: &Arc<Scheduler>,
        properties: &[&str],
        getters: &[&str],
        factory: F,
    ) -> Result<Self, SchedulerError>
    where
        T: Remote,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder(scheduler)
            .properties(properties.iter().copied())
            .getters(getters.iter().copied())
            .create(factory)
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn properties(&self) -> &[String] {
        &self.sync.properties
    }

    pub fn getters(&self) -> &[String] {
        &self.sync.getters
    }

    /// Mirrored value of a declared property or getter; `None` for anything else.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.mirror.get(name)
    }

    /// Updates the mirror at once and writes the attribute on the worker.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), SchedulerError> {
        let value = value.into();
        self.mirror.set(name, value.clone());
        self.scheduler.submit(WireTask::keyed(
            self.key.clone(),
            Member::SetAttr(name.to_string()),
            vec![value],
            self.sync.clone(),
        ))
    }

    /// Calls `method` on the worker object and resyncs every mirrored attribute.
    /// Does not wait for the call.
    pub fn call<I, V>(&self, method: &str, args: I) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.call_inner(method, args, self.sync.clone())
    }

    /// Like [`call`](Self::call) but resyncs only `properties`.
    pub fn call_with_sync<I, V>(
        &self,
        method: &str,
        args: I,
        properties: &[&str],
    ) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let sync = SyncSpec {
            properties: properties.iter().map(|name| name.to_string()).collect(),
            getters: Vec::new(),
        };
        self.call_inner(method, args, sync)
    }

    fn call_inner<I, V>(&self, method: &str, args: I, sync: SyncSpec) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let args = args.into_iter().map(|arg| -> Value { arg.into() }).collect();
        self.scheduler.submit(WireTask::keyed(
            self.key.clone(),
            Member::Method(method.to_string()),
            args,
            sync,
        ))
    }

    /// Waits until the scheduler handled everything queued so far, this
    /// proxy's calls included.
    pub fn mp_wait(&self) {
        self.scheduler.wait();
    }

    pub fn mirror_snapshot(&self) -> HashMap<String, Value> {
        self.mirror.snapshot()
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("key", &self.key)
            .field("mirror", &self.mirror.snapshot())
            .finish()
    }
}
