// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Encoded form of a task as it travels over the task channel.
//!
//! Encoding replaces every object by an independent copy. A cache-aware
//! encoding attaches a copy only for objects the origin has not shipped yet and
//! refers to everything else by key. The worker side decodes a task against its
//! [`Registry`](crate::Registry): registrations are installed first, then the
//! receiver and any keyed arguments are resolved.

mod decode;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;

use crate::cache::{CacheKey, ErasedObject, OriginCache, RemoteObject, Variables};
use crate::task::{Arg, Args, Callable, SyncSpec, Target, Task, TaskInfo, TaskKind};

pub use decode::{Executable, Execution};
pub(crate) use decode::{guarded, Produced};

/// Creates the worker-side object behind a proxy.
pub type Factory = Arc<dyn Fn() -> Box<dyn RemoteObject> + Send + Sync>;

/// Creates named worker variables.
pub type Creator = Arc<dyn Fn(&Args) -> anyhow::Result<Variables> + Send + Sync>;

type Registrations = SmallVec<[(CacheKey, Box<dyn RemoteObject>); 1]>;

pub(crate) enum Member {
    Method(String),
    SetAttr(String),
}

pub(crate) enum WireReceiver {
    Key(CacheKey),
    Inline(Box<dyn RemoteObject>),
}

pub(crate) enum WireTarget {
    Callable(Callable),
    Receiver {
        receiver: WireReceiver,
        /// `None` returns the receiver's snapshot without calling anything.
        member: Option<Member>,
    },
    Materialize {
        key: CacheKey,
        factory: Factory,
    },
    CreateVariables(Creator),
}

pub(crate) enum WireArg {
    Value(Value),
    Key(CacheKey),
    Inline(Box<dyn RemoteObject>),
}

pub(crate) struct SyncRequest {
    pub(crate) key: CacheKey,
    pub(crate) spec: SyncSpec,
}

/// A task ready for the task channel.
pub struct WireTask {
    pub(crate) target: WireTarget,
    pub(crate) args: Vec<WireArg>,
    pub(crate) kwargs: BTreeMap<String, WireArg>,
    pub(crate) register: Registrations,
    pub(crate) force: bool,
    pub(crate) has_output: bool,
    pub(crate) key: Option<String>,
    pub(crate) sync: Option<SyncRequest>,
    pub(crate) info: Arc<TaskInfo>,
}

impl WireTask {
    /// Every object travels as a fresh copy; nothing is registered.
    pub fn encode_plain(task: Task) -> Self {
        Self::encode(task, None)
    }

    /// The receiver is shipped at most once per `origin`; later tasks refer to it by key.
    pub fn encode_cached(task: Task, origin: &OriginCache) -> Self {
        Self::encode(task, Some(origin))
    }

    fn encode(task: Task, origin: Option<&OriginCache>) -> Self {
        let Task {
            target,
            args,
            kwargs,
            has_output,
            key,
            cache: _,
            re_register,
            sync,
        } = task;
        let has_output = has_output.unwrap_or(true);
        let force = re_register && origin.is_some();
        let mut register = Registrations::new();

        let (kind, description, receiver_key, target) = match target {
            Target::Unbound(callable) => (
                TaskKind::Call,
                callable.name().to_string(),
                None,
                WireTarget::Callable(callable),
            ),
            Target::Bound(object, method) => {
                let description = format!("{}.{}", object.type_name(), method);
                let receiver = ship_receiver(&object, origin, force, &mut register);
                (
                    TaskKind::Method,
                    description,
                    Some(object.key().clone()),
                    WireTarget::Receiver {
                        receiver,
                        member: Some(Member::Method(method)),
                    },
                )
            }
            Target::CachedReceiverOnly(object) => {
                let receiver = ship_receiver(&object, origin, force, &mut register);
                (
                    TaskKind::CacheObject,
                    object.type_name().to_string(),
                    Some(object.key().clone()),
                    WireTarget::Receiver {
                        receiver,
                        member: None,
                    },
                )
            }
            Target::Variable(name, method) => (
                TaskKind::Variable,
                format!("{name}.{method}"),
                Some(CacheKey::Named(name.clone())),
                WireTarget::Receiver {
                    receiver: WireReceiver::Key(CacheKey::Named(name)),
                    member: Some(Member::Method(method)),
                },
            ),
        };

        let args = args.into_iter().map(|arg| wire_arg(arg, origin)).collect();
        let kwargs = kwargs
            .into_iter()
            .map(|(name, arg)| (name, wire_arg(arg, origin)))
            .collect();
        let sync = match receiver_key {
            Some(key) if !sync.is_empty() => Some(SyncRequest { key, spec: sync }),
            _ => None,
        };

        WireTask {
            target,
            args,
            kwargs,
            register,
            force,
            has_output,
            key,
            sync,
            info: Arc::new(TaskInfo {
                kind,
                target: description,
                cached: origin.is_some(),
                has_output,
            }),
        }
    }

    /// Creates the object under `key` unless the worker already has it.
    pub(crate) fn materialize(
        key: CacheKey,
        type_name: &str,
        factory: Factory,
        sync: SyncSpec,
    ) -> Self {
        WireTask {
            target: WireTarget::Materialize {
                key: key.clone(),
                factory,
            },
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            register: Registrations::new(),
            force: false,
            has_output: true,
            key: Some(key.to_string()),
            sync: Some(SyncRequest {
                key,
                spec: sync,
            }),
            info: Arc::new(TaskInfo {
                kind: TaskKind::ProxyCreate,
                target: type_name.to_string(),
                cached: true,
                has_output: true,
            }),
        }
    }

    /// Calls a member of an object the worker already holds under `key`.
    pub(crate) fn keyed(
        key: CacheKey,
        member: Member,
        args: Vec<Value>,
        sync: SyncSpec,
    ) -> Self {
        let (kind, description) = match &member {
            Member::Method(method) => (TaskKind::ProxyCall, format!("{key}.{method}")),
            Member::SetAttr(name) => (TaskKind::ProxySet, format!("{key}.{name}")),
        };
        WireTask {
            target: WireTarget::Receiver {
                receiver: WireReceiver::Key(key.clone()),
                member: Some(member),
            },
            args: args.into_iter().map(WireArg::Value).collect(),
            kwargs: BTreeMap::new(),
            register: Registrations::new(),
            force: false,
            has_output: true,
            key: Some(key.to_string()),
            sync: Some(SyncRequest {
                key,
                spec: sync,
            }),
            info: Arc::new(TaskInfo {
                kind,
                target: description,
                cached: true,
                has_output: true,
            }),
        }
    }

    pub(crate) fn create_variables(creator: Creator, args: Vec<Value>, has_output: bool) -> Self {
        WireTask {
            target: WireTarget::CreateVariables(creator),
            args: args.into_iter().map(WireArg::Value).collect(),
            kwargs: BTreeMap::new(),
            register: Registrations::new(),
            force: false,
            has_output,
            key: None,
            sync: None,
            info: Arc::new(TaskInfo {
                kind: TaskKind::SaveVariables,
                target: "save_variables".to_string(),
                cached: true,
                has_output,
            }),
        }
    }

    /// Keys of the objects this task installs on the worker.
    pub fn registrations(&self) -> impl Iterator<Item = &CacheKey> {
        self.register.iter().map(|(key, _)| key)
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    pub fn has_output(&self) -> bool {
        self.has_output
    }

    pub fn correlation_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn info(&self) -> &TaskInfo {
        &self.info
    }
}

impl fmt::Debug for WireTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireTask")
            .field("info", &self.info)
            .field("key", &self.key)
            .field("register", &self.registrations().collect::<Vec<_>>())
            .field("force", &self.force)
            .finish_non_exhaustive()
    }
}

fn ship_receiver(
    object: &ErasedObject,
    origin: Option<&OriginCache>,
    force: bool,
    register: &mut Registrations,
) -> WireReceiver {
    match origin {
        None => WireReceiver::Inline(object.transfer()),
        Some(origin) => {
            if origin.ship(object.key(), force) {
                register.push((object.key().clone(), object.transfer()));
            }
            WireReceiver::Key(object.key().clone())
        }
    }
}

/// Shipped objects go by key, everything else by copy.
fn wire_arg(arg: Arg, origin: Option<&OriginCache>) -> WireArg {
    match arg {
        Arg::Value(value) => WireArg::Value(value),
        Arg::Object(object) => match origin {
            Some(origin) if origin.is_shipped(object.key()) => WireArg::Key(object.key().clone()),
            _ => WireArg::Inline(object.transfer()),
        },
    }
}
