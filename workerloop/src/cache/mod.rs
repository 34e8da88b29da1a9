// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Object identity on both sides of a worker channel.
//!
//! On the origin side an [`ObjectRef`] owns the object and a [`CacheKey`] that is
//! never reused. [`OriginCache`] remembers which keys were already shipped. On the
//! worker side a [`Registry`] maps keys to [`LiveObject`]s, the instances that
//! cache tasks mutate.

mod key;
mod object;
mod registry;
mod remote;

#[cfg(test)]
mod tests;

pub use key::CacheKey;
pub use object::{ErasedObject, LiveObject, ObjectRef};
pub use registry::{OriginCache, Registry};
pub use remote::{Remote, RemoteObject};

pub(crate) use remote::short_type_name;

/// Named worker-side objects, as returned by an initializer or `save_variables`.
pub type Variables = Vec<(String, Box<dyn RemoteObject>)>;

/// Pairs a variable name with an object for [`Variables`].
pub fn variable<T: Remote>(name: impl Into<String>, value: T) -> (String, Box<dyn RemoteObject>) {
    (name.into(), Box::new(value))
}
