// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use super::{Creator, Member, SyncRequest, WireArg, WireReceiver, WireTarget, WireTask};
use crate::cache::{CacheKey, LiveObject, Registry};
use crate::error::{panic_message, TaskError};
use crate::task::{Args, Callable, Outcome, Producer, Resolved, SyncSnapshot, TaskInfo, TaskResult};

pub(crate) enum Invocation {
    Call(Callable),
    Method(LiveObject, String),
    SetAttr(LiveObject, String),
    Receiver(LiveObject),
    Materialized(LiveObject),
    CreateVariables(Creator),
    Invalid(String),
}

impl Invocation {
    fn receiver(&self) -> Option<&LiveObject> {
        match self {
            Invocation::Method(receiver, _)
            | Invocation::SetAttr(receiver, _)
            | Invocation::Receiver(receiver)
            | Invocation::Materialized(receiver) => Some(receiver),
            Invocation::Call(_) | Invocation::CreateVariables(_) | Invocation::Invalid(_) => None,
        }
    }
}

/// A decoded task, bound to the objects of one registry.
pub struct Executable {
    invocation: Invocation,
    args: Args,
    sync: Option<SyncRequest>,
    registry: Registry,
    info: Arc<TaskInfo>,
    key: Option<String>,
    has_output: bool,
}

pub(crate) enum Produced {
    Value(Value),
    Stream(Box<dyn Producer>),
}

/// What running an [`Executable`] left behind.
pub struct Execution {
    pub(crate) info: Arc<TaskInfo>,
    pub(crate) key: Option<String>,
    pub(crate) has_output: bool,
    pub(crate) outcome: Result<Produced, TaskError>,
    pub(crate) sync: Option<SyncSnapshot>,
}

impl WireTask {
    /// Installs the registrations and resolves the receiver and arguments.
    ///
    /// An argument key the registry does not know is passed on as the literal
    /// key string. An unknown receiver key turns the task into an invalid target.
    pub fn decode(self, registry: &Registry) -> Executable {
        let WireTask {
            target,
            args,
            kwargs,
            register,
            force,
            has_output,
            key,
            sync,
            info,
        } = self;

        for (cache_key, object) in register {
            registry.install(cache_key, object, force);
        }

        let invocation = match target {
            WireTarget::Callable(callable) => Invocation::Call(callable),
            WireTarget::Receiver { receiver, member } => {
                match resolve_receiver(receiver, registry) {
                    Ok(live) => match member {
                        None => Invocation::Receiver(live),
                        Some(Member::Method(method)) => Invocation::Method(live, method),
                        Some(Member::SetAttr(name)) => Invocation::SetAttr(live, name),
                    },
                    Err(missing) => {
                        Invocation::Invalid(format!("no object cached under {missing}"))
                    }
                }
            }
            WireTarget::Materialize { key, factory } => match registry.resolve(&key) {
                Some(live) => Invocation::Materialized(live),
                None => match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
                    Ok(object) => Invocation::Materialized(registry.install(key, object, false)),
                    Err(payload) => Invocation::Invalid(format!(
                        "creating {key} panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                },
            },
            WireTarget::CreateVariables(creator) => Invocation::CreateVariables(creator),
        };

        let positional = args
            .into_iter()
            .map(|arg| resolve_arg(arg, registry))
            .collect();
        let keyword = kwargs
            .into_iter()
            .map(|(name, arg)| (name, resolve_arg(arg, registry)))
            .collect();

        Executable {
            invocation,
            args: Args::new(positional, keyword),
            sync,
            registry: registry.clone(),
            info,
            key,
            has_output,
        }
    }
}

impl Executable {
    pub fn info(&self) -> &TaskInfo {
        &self.info
    }

    /// Runs the task. Panics and errors of user code end up in the outcome.
    pub fn run(self) -> Execution {
        let Executable {
            invocation,
            args,
            sync,
            registry,
            info,
            key,
            has_output,
        } = self;
        debug!("running {info}");

        let outcome = match &invocation {
            Invocation::Call(callable) => guarded(|| callable.invoke(&args)),
            Invocation::Method(receiver, method) => {
                guarded(|| receiver.with(|object| object.call_method(method, &args)))
            }
            Invocation::SetAttr(receiver, name) => args.value(0).and_then(|value| {
                receiver
                    .with(|object| object.set_attr(name, value.clone()))
                    .map(|()| Outcome::none())
            }),
            Invocation::Receiver(receiver) => Ok(Outcome::Value(receiver.snapshot())),
            Invocation::Materialized(_) => Ok(Outcome::none()),
            Invocation::CreateVariables(creator) => guarded(|| {
                for (name, object) in creator(&args)? {
                    registry.install(CacheKey::Named(name), object, true);
                }
                Ok(Outcome::value(true))
            }),
            Invocation::Invalid(reason) => Err(TaskError::InvalidTarget(reason.clone())),
        };

        let outcome = outcome.and_then(|outcome| match outcome {
            Outcome::Value(value) => Ok(Produced::Value(value)),
            Outcome::Stream(producer) => Ok(Produced::Stream(producer)),
            Outcome::Deferred(future) => {
                guarded(move || futures::executor::block_on(future)).map(Produced::Value)
            }
        });

        // Failed calls may have changed the receiver before failing.
        let sync = match (sync, invocation.receiver()) {
            (Some(request), Some(receiver)) => Some(snapshot(receiver, request)),
            _ => None,
        };

        Execution {
            info,
            key,
            has_output,
            outcome,
            sync,
        }
    }
}

impl Execution {
    pub fn has_output(&self) -> bool {
        self.has_output
    }

    pub fn info(&self) -> &TaskInfo {
        &self.info
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.outcome, Ok(Produced::Stream(_)))
    }

    /// Single-shot result. A stream outcome is reported as [`TaskError::NotStreaming`].
    pub fn into_result(self) -> TaskResult {
        let outcome = match self.outcome {
            Ok(Produced::Value(value)) => Ok(value),
            Ok(Produced::Stream(_)) => Err(TaskError::NotStreaming),
            Err(error) => Err(error),
        };
        TaskResult::new(self.info, self.key, outcome).with_sync(self.sync)
    }
}

/// Runs user code, turning errors and panics into a [`TaskError`].
pub(crate) fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::from_anyhow(err)),
        Err(payload) => Err(TaskError::from_panic(payload)),
    }
}

fn resolve_receiver(receiver: WireReceiver, registry: &Registry) -> Result<LiveObject, CacheKey> {
    match receiver {
        WireReceiver::Key(key) => registry.resolve(&key).ok_or(key),
        WireReceiver::Inline(object) => Ok(LiveObject::new(object)),
    }
}

fn resolve_arg(arg: WireArg, registry: &Registry) -> Resolved {
    match arg {
        WireArg::Value(value) => Resolved::Value(value),
        WireArg::Key(key) => match registry.resolve(&key) {
            Some(live) => Resolved::Object(live),
            None => Resolved::Value(Value::String(key.to_string())),
        },
        WireArg::Inline(object) => Resolved::Object(LiveObject::new(object)),
    }
}

/// Properties read as `null` when missing; getters that fail read as `null` too.
fn snapshot(receiver: &LiveObject, request: SyncRequest) -> SyncSnapshot {
    let SyncRequest { key, spec } = request;
    let values = receiver.with(|object| {
        let mut values = Vec::with_capacity(spec.properties.len() + spec.getters.len());
        for name in spec.properties {
            let value = object.get_attr(&name).unwrap_or(Value::Null);
            values.push((name, value));
        }
        for getter in spec.getters {
            let value = match guarded(|| object.call_method(&getter, &Args::default())) {
                Ok(Outcome::Value(value)) => value,
                _ => Value::Null,
            };
            values.push((getter, value));
        }
        values
    });
    SyncSnapshot { key, values }
}
