// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use log::debug;
use serde_json::Value;

use crate::cache::CacheKey;
use crate::task::TaskResult;

/// Origin-side copy of the synced attributes of one worker object.
#[derive(Debug, Default)]
pub struct Mirror {
    values: RwLock<HashMap<String, Value>>,
}

impl Mirror {
    pub(crate) fn with_names<'a>(names: impl IntoIterator<Item = &'a String>) -> Self {
        let values = names
            .into_iter()
            .map(|name| (name.clone(), Value::Null))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub(crate) fn set(&self, name: &str, value: Value) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    pub(crate) fn apply(&self, values: &[(String, Value)]) {
        let mut mirrored = self.values.write().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in values {
            mirrored.insert(name.clone(), value.clone());
        }
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Mirrors of the live proxies of one scheduler, by proxy key.
#[derive(Clone, Default)]
pub(crate) struct ProxyTable {
    mirrors: Arc<Mutex<HashMap<CacheKey, Weak<Mirror>>>>,
}

impl ProxyTable {
    pub(crate) fn register(&self, key: CacheKey, mirror: &Arc<Mirror>) {
        self.mirrors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::downgrade(mirror));
    }

    /// Applies the sync snapshot of a proxy result. Returns whether the result
    /// belonged to a proxy, live or dropped.
    pub(crate) fn apply(&self, result: &TaskResult) -> bool {
        let Some(sync) = result.synced() else {
            return false;
        };
        let mirror = {
            let mut mirrors = self.mirrors.lock().unwrap_or_else(PoisonError::into_inner);
            match mirrors.get(&sync.key).map(Weak::upgrade) {
                None => return false,
                Some(None) => {
                    debug!("proxy {} is gone, dropping its mirror", sync.key);
                    mirrors.remove(&sync.key);
                    return true;
                }
                Some(Some(mirror)) => mirror,
            }
        };
        mirror.apply(&sync.values);
        true
    }
}
