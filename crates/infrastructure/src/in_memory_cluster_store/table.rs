use std::collections::HashMap;

use chrono::Utc;
use jitgate_core::{AppError, AppResult};
use jitgate_domain::{ClusterObject, ObjectKey, StatusObject};
use uuid::Uuid;

/// Outcome of a write that may have removed the object.
pub(super) enum WriteEffect<T> {
    Stored(T),
    Removed(T),
}

/// Objects of one kind keyed by namespace and name.
#[derive(Debug)]
pub(super) struct Table<T> {
    objects: HashMap<ObjectKey, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }
}

impl<T: ClusterObject> Table<T> {
    pub(super) fn find(&self, key: &ObjectKey) -> Option<T> {
        self.objects.get(key).cloned()
    }

    pub(super) fn list(&self) -> Vec<T> {
        let mut values: Vec<T> = self.objects.values().cloned().collect();
        values.sort_by_key(|object| object.key());
        values
    }

    pub(super) fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self.objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(super) fn create(&mut self, mut object: T, version: u64) -> AppResult<T> {
        let key = object.key();
        key.validate()?;
        if self.objects.contains_key(&key) {
            return Err(AppError::AlreadyExists(format!(
                "{} '{key}' already exists",
                T::KIND.as_str()
            )));
        }

        let meta = object.meta_mut();
        meta.uid = Uuid::new_v4().to_string();
        meta.resource_version = version;
        meta.creation_timestamp = Some(Utc::now());
        meta.deletion_timestamp = None;

        self.objects.insert(key, object.clone());
        Ok(object)
    }

    /// Creates the object or replaces its content, keeping identity fields.
    pub(super) fn upsert(&mut self, mut object: T, version: u64) -> AppResult<T> {
        let key = object.key();
        let Some(stored) = self.objects.get(&key) else {
            return self.create(object, version);
        };

        let stored_meta = stored.meta().clone();
        let meta = object.meta_mut();
        meta.uid = stored_meta.uid;
        meta.creation_timestamp = stored_meta.creation_timestamp;
        meta.deletion_timestamp = stored_meta.deletion_timestamp;
        meta.resource_version = version;

        self.objects.insert(key, object.clone());
        Ok(object)
    }

    pub(super) fn update_metadata(&mut self, object: &T, version: u64) -> AppResult<WriteEffect<T>> {
        let key = object.key();
        let mut stored = self.current(object)?.clone();

        let meta = stored.meta_mut();
        meta.finalizers = object.meta().finalizers.clone();
        meta.owner_references = object.meta().owner_references.clone();
        meta.resource_version = version;

        if stored.meta().is_deleting() && stored.meta().finalizers.is_empty() {
            self.objects.remove(&key);
            return Ok(WriteEffect::Removed(stored));
        }

        self.objects.insert(key, stored.clone());
        Ok(WriteEffect::Stored(stored))
    }

    /// Removes the object, or only marks it while finalizers remain.
    pub(super) fn delete(&mut self, key: &ObjectKey, version: u64) -> AppResult<WriteEffect<T>> {
        let Some(stored) = self.objects.get_mut(key) else {
            return Err(not_found::<T>(key));
        };

        if !stored.meta().finalizers.is_empty() {
            let meta = stored.meta_mut();
            if meta.deletion_timestamp.is_none() {
                meta.deletion_timestamp = Some(Utc::now());
                meta.resource_version = version;
            }
            return Ok(WriteEffect::Stored(stored.clone()));
        }

        self.objects
            .remove(key)
            .map(WriteEffect::Removed)
            .ok_or_else(|| not_found::<T>(key))
    }

    /// Removes every object listing the owner and returns them.
    pub(super) fn remove_owned_by(&mut self, owner_uid: &str) -> Vec<T> {
        let keys: Vec<ObjectKey> = self
            .objects
            .iter()
            .filter(|(_, object)| object.meta().is_owned_by(owner_uid))
            .map(|(key, _)| key.clone())
            .collect();

        keys.iter()
            .filter_map(|key| self.objects.remove(key))
            .collect()
    }

    fn current(&self, object: &T) -> AppResult<&T> {
        let key = object.key();
        let stored = self.objects.get(&key).ok_or_else(|| not_found::<T>(&key))?;
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(AppError::Conflict(format!(
                "{} '{key}' was modified: expected version {}, found {}",
                T::KIND.as_str(),
                object.meta().resource_version,
                stored.meta().resource_version
            )));
        }

        Ok(stored)
    }
}

impl<T: StatusObject> Table<T> {
    pub(super) fn patch_status(&mut self, base: &T, status: T::Status, version: u64) -> AppResult<T> {
        let mut stored = self.current(base)?.clone();
        stored.set_status(status);
        stored.meta_mut().resource_version = version;

        self.objects.insert(stored.key(), stored.clone());
        Ok(stored)
    }
}

fn not_found<T: ClusterObject>(key: &ObjectKey) -> AppError {
    AppError::NotFound(format!("{} '{key}' does not exist", T::KIND.as_str()))
}
