// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use serde_json::Value;

use super::key::CacheKey;
use super::remote::{short_type_name, Remote, RemoteObject};
use crate::error::TaskError;

/// Origin-side owner of an object that may be shipped to workers.
///
/// Clones share the object and its key. The key is issued at construction and
/// stays valid for as long as any clone lives.
pub struct ObjectRef<T: Remote> {
    key: CacheKey,
    inner: Arc<Mutex<T>>,
}

impl<T: Remote> ObjectRef<T> {
    pub fn new(value: T) -> Self {
        Self {
            key: CacheKey::fresh(),
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the current origin-side state.
    pub fn get(&self) -> T {
        self.lock().clone()
    }

    pub fn erase(&self) -> ErasedObject {
        ErasedObject {
            key: self.key.clone(),
            source: self.inner.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Remote> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Remote> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("key", &self.key)
            .field("type", &short_type_name::<T>())
            .finish()
    }
}

pub(crate) trait Transfer: Send + Sync {
    fn transfer(&self) -> Box<dyn RemoteObject>;

    fn type_name(&self) -> &'static str;
}

impl<T: Remote> Transfer for Mutex<T> {
    fn transfer(&self) -> Box<dyn RemoteObject> {
        Box::new(self.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }
}

/// Type-erased [`ObjectRef`] as stored inside a task.
#[derive(Clone)]
pub struct ErasedObject {
    key: CacheKey,
    source: Arc<dyn Transfer>,
}

impl ErasedObject {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.source.type_name()
    }

    pub(crate) fn transfer(&self) -> Box<dyn RemoteObject> {
        self.source.transfer()
    }
}

impl fmt::Debug for ErasedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedObject")
            .field("key", &self.key)
            .field("type", &self.type_name())
            .finish()
    }
}

/// Worker-side instance. Clones share the same object.
///
/// The receiver of a running method is locked for the duration of the call;
/// reach it through `self` rather than through an argument.
#[derive(Clone)]
pub struct LiveObject {
    inner: Arc<Mutex<Box<dyn RemoteObject>>>,
}

impl LiveObject {
    pub(crate) fn new(object: Box<dyn RemoteObject>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(object)),
        }
    }

    /// Blocks until the object is free.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn RemoteObject) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **guard)
    }

    /// Fails instead of blocking when the object is already in use.
    pub fn try_with<R>(&self, f: impl FnOnce(&mut dyn RemoteObject) -> R) -> Result<R, TaskError> {
        let mut guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return Err(TaskError::Argument("object is already in use".to_string()))
            }
        };
        Ok(f(&mut **guard))
    }

    /// Runs `f` on the concrete type.
    pub fn downcast<T: Remote, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, TaskError> {
        self.try_with(|object| {
            let found = object.type_name();
            object
                .as_any_mut()
                .downcast_mut::<T>()
                .map(f)
                .ok_or_else(|| {
                    TaskError::Argument(format!(
                        "expected {}, found {}",
                        short_type_name::<T>(),
                        found
                    ))
                })
        })?
    }

    pub fn snapshot(&self) -> Value {
        self.with(|object| object.snapshot())
    }

    pub fn type_name(&self) -> &'static str {
        self.with(|object| object.type_name())
    }

    pub fn same_object(&self, other: &LiveObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn replace(&self, object: Box<dyn RemoteObject>) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = object;
    }
}

impl fmt::Debug for LiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(object) => f
                .debug_struct("LiveObject")
                .field("type", &object.type_name())
                .finish(),
            Err(_) => f.debug_struct("LiveObject").finish_non_exhaustive(),
        }
    }
}
