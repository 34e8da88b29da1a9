// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::TaskError;
use crate::task::{Args, Outcome};

/// An object that can live in a worker registry.
///
/// Shipping an object to a worker hands over an independent copy, so the type
/// must be `Clone`. By default attributes are read and written through the
/// serde representation, which is expected to be a struct with named fields.
pub trait Remote: Clone + Serialize + DeserializeOwned + Send + 'static {
    /// Runs `method` with the resolved arguments. The default knows no methods.
    fn invoke(&mut self, method: &str, args: &Args) -> anyhow::Result<Outcome> {
        let _ = args;
        Err(TaskError::unknown_method(short_type_name::<Self>(), method).into())
    }

    /// Reads the serialized field `name`.
    fn get_attr(&self, name: &str) -> Result<Value, TaskError> {
        let value = match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => fields.remove(name),
            _ => None,
        };
        value.ok_or_else(|| unknown_attribute::<Self>(name))
    }

    /// Writes the serialized field `name` by rebuilding the object from its
    /// serde form with that field replaced.
    ///
    /// The rebuild only happens when the current state survives a serde
    /// round-trip unchanged, otherwise the write fails with
    /// [`TaskError::Attribute`] and the object is left alone. State hidden
    /// from serde entirely, like `#[serde(skip)]` fields, is not detected and
    /// would be reset: types carrying such state override this method.
    fn set_attr(&mut self, name: &str, value: Value) -> Result<(), TaskError> {
        let attribute_error = |reason: String| TaskError::Attribute {
            name: name.to_string(),
            reason,
        };
        let current = serde_json::to_value(&*self).map_err(|err| attribute_error(err.to_string()))?;
        let mut fields = match &current {
            Value::Object(fields) if fields.contains_key(name) => fields.clone(),
            _ => return Err(unknown_attribute::<Self>(name)),
        };
        let restored: Self =
            serde_json::from_value(current.clone()).map_err(|err| attribute_error(err.to_string()))?;
        if serde_json::to_value(&restored).ok().as_ref() != Some(&current) {
            return Err(attribute_error(format!(
                "{} does not survive a serde round-trip",
                short_type_name::<Self>()
            )));
        }
        fields.insert(name.to_string(), value);
        *self = serde_json::from_value(Value::Object(fields))
            .map_err(|err| attribute_error(err.to_string()))?;
        Ok(())
    }
}

fn unknown_attribute<T: ?Sized>(name: &str) -> TaskError {
    TaskError::UnknownAttribute {
        type_name: short_type_name::<T>().to_string(),
        name: name.to_string(),
    }
}

/// Object-safe view of a [`Remote`] used by the registry and the wire format.
pub trait RemoteObject: Send + 'static {
    fn type_name(&self) -> &'static str;

    fn call_method(&mut self, method: &str, args: &Args) -> anyhow::Result<Outcome>;

    fn get_attr(&self, name: &str) -> Result<Value, TaskError>;

    fn set_attr(&mut self, name: &str, value: Value) -> Result<(), TaskError>;

    /// Full serde representation of the current state.
    fn snapshot(&self) -> Value;

    /// Independent deep copy.
    fn transfer(&self) -> Box<dyn RemoteObject>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Remote> RemoteObject for T {
    fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }

    fn call_method(&mut self, method: &str, args: &Args) -> anyhow::Result<Outcome> {
        Remote::invoke(self, method, args)
    }

    fn get_attr(&self, name: &str) -> Result<Value, TaskError> {
        Remote::get_attr(self, name)
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<(), TaskError> {
        Remote::set_attr(self, name, value)
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            warn!("cannot serialize {}: {}", short_type_name::<T>(), err);
            Value::Null
        })
    }

    fn transfer(&self) -> Box<dyn RemoteObject> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Last path segment of a type name, e.g. `Counter` for `my_crate::Counter`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}
