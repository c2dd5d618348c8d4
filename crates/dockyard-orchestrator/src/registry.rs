use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::lifecycle::{ContainerRecord, ImageRecord};

pub type ImageRegistry = Registry<ImageRecord>;
pub type ContainerRegistry = Registry<ContainerRecord>;

/// Id-keyed record store shared between the orchestrator and its clones.
///
/// No lock is held across an engine round-trip. A poisoned lock is recovered,
/// since every write leaves the map consistent.
#[derive(Debug)]
pub struct Registry<R> {
    records: RwLock<HashMap<String, R>>,
}

impl<R> Default for Registry<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<R: Clone> Registry<R> {
    pub fn new() -> Self {
        Default::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, R>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, R>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, id: String, record: R) {
        let mut records = self.write();
        if records.contains_key(&id) {
            warn!(%id, "Record already registered, overwriting");
        }
        debug!(%id, "Registering record");
        records.insert(id, record);
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<R> {
        self.write().remove(id)
    }

    /// Applies `f` to the record under `id`. Returns false when it is absent.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut R)) -> bool {
        match self.write().get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> HashMap<String, R> {
        self.read().clone()
    }

    pub fn filtered(&self, keep: impl Fn(&R) -> bool) -> Vec<R> {
        self.read().values().filter(|r| keep(r)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
