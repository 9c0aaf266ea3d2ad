//! Per-resource configuration store
//!
//! Holds the provisioning parameters an adapter resolves during `configure`
//! for each ResourceID. In-memory only; lives as long as the adapter.

use crate::error::{CloudError, Result};
use crate::resource::ResourceId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct ConfigStore<T> {
    records: Mutex<HashMap<ResourceId, T>>,
}

impl<T> Default for ConfigStore<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> ConfigStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceId, T>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace the record for `resource_id`
    pub fn insert(&self, resource_id: &ResourceId, record: T) {
        self.lock().insert(resource_id.clone(), record);
    }

    /// Snapshot of the record for `resource_id`
    pub fn get(&self, resource_id: &ResourceId) -> Result<T> {
        self.lock()
            .get(resource_id)
            .cloned()
            .ok_or_else(|| CloudError::NotConfigured(resource_id.to_string()))
    }

    /// Mutate the record for `resource_id` in place
    pub fn update<R>(&self, resource_id: &ResourceId, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut records = self.lock();
        let record = records
            .get_mut(resource_id)
            .ok_or_else(|| CloudError::NotConfigured(resource_id.to_string()))?;
        Ok(f(record))
    }

    pub fn remove(&self, resource_id: &ResourceId) -> Option<T> {
        self.lock().remove(resource_id)
    }

    pub fn contains(&self, resource_id: &ResourceId) -> bool {
        self.lock().contains_key(resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Record {
        subnet_id: Option<String>,
    }

    #[test]
    fn test_insert_update_get() {
        let store = ConfigStore::new();
        let id = ResourceId::new("abc");

        store.insert(&id, Record::default());
        store
            .update(&id, |r| r.subnet_id = Some("subnet-1".to_string()))
            .unwrap();

        assert_eq!(store.get(&id).unwrap().subnet_id.as_deref(), Some("subnet-1"));
    }

    #[test]
    fn test_missing_record() {
        let store: ConfigStore<Record> = ConfigStore::new();
        let id = ResourceId::new("missing");

        assert!(matches!(store.get(&id), Err(CloudError::NotConfigured(_))));
        assert!(store.update(&id, |_| ()).is_err());
        assert!(!store.contains(&id));
    }

    #[test]
    fn test_stores_are_independent() {
        let a = ConfigStore::new();
        let b: ConfigStore<Record> = ConfigStore::new();
        let id = ResourceId::new("abc");

        a.insert(&id, Record::default());
        assert!(a.contains(&id));
        assert!(!b.contains(&id));
        assert!(a.remove(&id).is_some());
        assert!(!a.contains(&id));
    }
}
