// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::outcome::Outcome;
use crate::cache::LiveObject;
use crate::error::TaskError;

/// Body of an unbound task.
pub type TaskFn = dyn Fn(&Args) -> anyhow::Result<Outcome> + Send + Sync;

/// Shareable function target. Carries no state of its own, so it is never registered.
#[derive(Clone)]
pub struct Callable {
    name: String,
    f: Arc<TaskFn>,
}

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self::named(std::any::type_name::<F>(), f)
    }

    pub fn named<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, args: &Args) -> anyhow::Result<Outcome> {
        (self.f)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callable").field(&self.name).finish()
    }
}

/// An argument after worker-side key resolution.
#[derive(Debug, Clone)]
pub enum Resolved {
    Value(Value),
    Object(LiveObject),
}

impl Resolved {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(value) => Some(value),
            Resolved::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&LiveObject> {
        match self {
            Resolved::Object(object) => Some(object),
            Resolved::Value(_) => None,
        }
    }

    /// Plain value, or the snapshot of an object. An object that is in use,
    /// e.g. the receiver of the running method, reads as `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Resolved::Value(value) => value.clone(),
            Resolved::Object(object) => object
                .try_with(|object| object.snapshot())
                .unwrap_or(Value::Null),
        }
    }
}

/// Positional and keyword arguments as seen by a running task.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Resolved>,
    keyword: BTreeMap<String, Resolved>,
}

impl Args {
    pub fn new(positional: Vec<Resolved>, keyword: BTreeMap<String, Resolved>) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values
                .into_iter()
                .map(|value| Resolved::Value(value.into()))
                .collect(),
            keyword: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Resolved> {
        self.positional.get(index)
    }

    pub fn kw(&self, name: &str) -> Option<&Resolved> {
        self.keyword.get(name)
    }

    pub fn keywords(&self) -> impl Iterator<Item = (&str, &Resolved)> {
        self.keyword.iter().map(|(name, arg)| (name.as_str(), arg))
    }

    pub fn positional(&self) -> &[Resolved] {
        &self.positional
    }

    pub fn value(&self, index: usize) -> Result<&Value, TaskError> {
        match self.positional.get(index) {
            Some(Resolved::Value(value)) => Ok(value),
            Some(Resolved::Object(_)) => Err(TaskError::Argument(format!(
                "argument {index} is an object, expected a value"
            ))),
            None => Err(TaskError::Argument(format!(
                "missing positional argument {index}"
            ))),
        }
    }

    pub fn object(&self, index: usize) -> Result<&LiveObject, TaskError> {
        match self.positional.get(index) {
            Some(Resolved::Object(object)) => Ok(object),
            Some(Resolved::Value(value)) => Err(TaskError::Argument(format!(
                "argument {index} is the value {value}, expected an object"
            ))),
            None => Err(TaskError::Argument(format!(
                "missing positional argument {index}"
            ))),
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, index: usize) -> Result<T, TaskError> {
        let value = self.value(index)?;
        serde_json::from_value(value.clone())
            .map_err(|err| TaskError::Argument(format!("argument {index}: {err}")))
    }

    pub fn i64(&self, index: usize) -> Result<i64, TaskError> {
        self.parse(index)
    }

    pub fn f64(&self, index: usize) -> Result<f64, TaskError> {
        self.parse(index)
    }

    pub fn bool(&self, index: usize) -> Result<bool, TaskError> {
        self.parse(index)
    }

    pub fn str(&self, index: usize) -> Result<&str, TaskError> {
        let value = self.value(index)?;
        value
            .as_str()
            .ok_or_else(|| TaskError::Argument(format!("argument {index} is not a string")))
    }

    /// Keyword argument parsed into `T`, `None` if absent.
    pub fn kw_parse<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, TaskError> {
        match self.keyword.get(name) {
            None => Ok(None),
            Some(Resolved::Value(value)) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|err| TaskError::Argument(format!("keyword `{name}`: {err}"))),
            Some(Resolved::Object(_)) => Err(TaskError::Argument(format!(
                "keyword `{name}` is an object, expected a value"
            ))),
        }
    }

    /// All positional arguments as values, see [`Resolved::to_value`].
    pub fn values(&self) -> Vec<Value> {
        self.positional.iter().map(Resolved::to_value).collect()
    }
}
