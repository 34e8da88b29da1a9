// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identity of a cached object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheKey {
    /// Issued once per origin object for the lifetime of the process.
    Handle(u64),
    /// Worker variable installed by an initializer or `save_variables`.
    Named(String),
}

impl CacheKey {
    pub(crate) fn fresh() -> Self {
        CacheKey::Handle(NEXT_HANDLE.fetch_add(1, Ordering::SeqCst))
    }

    pub fn named(name: impl Into<String>) -> Self {
        CacheKey::Named(name.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Handle(handle) => write!(f, "obj-{handle}"),
            CacheKey::Named(name) => f.write_str(name),
        }
    }
}
