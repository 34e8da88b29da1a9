// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use super::key::CacheKey;
use super::object::LiveObject;
use super::remote::RemoteObject;

/// Worker-side key to object map. Clones share the same map.
///
/// Entries stay until removed explicitly.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<Mutex<HashMap<CacheKey, LiveObject>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `object` under `key`. An existing entry is kept unless `force`
    /// is set, in which case its contents are replaced in place.
    pub fn install(&self, key: CacheKey, object: Box<dyn RemoteObject>, force: bool) -> LiveObject {
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(live) if !force => live.clone(),
            Some(live) => {
                debug!("replacing cached object {key}");
                live.replace(object);
                live.clone()
            }
            None => {
                debug!("caching {} as {key}", object.type_name());
                let live = LiveObject::new(object);
                entries.insert(key, live.clone());
                live
            }
        }
    }

    /// Returns the entry for `key`, creating it first if it is missing.
    pub fn get_or_install_with(
        &self,
        key: CacheKey,
        create: impl FnOnce() -> Box<dyn RemoteObject>,
    ) -> LiveObject {
        self.lock()
            .entry(key)
            .or_insert_with(|| LiveObject::new(create()))
            .clone()
    }

    pub fn resolve(&self, key: &CacheKey) -> Option<LiveObject> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn remove(&self, key: &CacheKey) -> Option<LiveObject> {
        self.lock().remove(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, LiveObject>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("keys", &self.keys()).finish()
    }
}

/// Origin-side record of the keys already shipped to the workers.
#[derive(Debug, Default)]
pub struct OriginCache {
    shipped: Mutex<HashSet<CacheKey>>,
}

impl OriginCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shipped(&self, key: &CacheKey) -> bool {
        self.lock().contains(key)
    }

    /// Records `key` and tells whether a registration must travel with the task.
    pub(crate) fn ship(&self, key: &CacheKey, force: bool) -> bool {
        let fresh = self.lock().insert(key.clone());
        fresh || force
    }

    pub fn forget(&self, key: &CacheKey) -> bool {
        self.lock().remove(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<CacheKey>> {
        self.shipped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
