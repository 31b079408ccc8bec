use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use super::{
    resolve_server_values, ChildQuery, RemoteStore, StoreError, StorePath, StoreTree,
    Subscription,
};

/// In-process store, shared by cloning.
///
/// Resolves server timestamps with the local clock and counts every write it
/// receives, which makes it the store of choice for tests and offline demos.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tree: Arc<Mutex<StoreTree>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose root holds `root`.
    pub fn with_data(root: Value) -> Self {
        let store = Self::new();
        store.lock().set(&[], root);
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value at `path`.
    pub fn snapshot(&self, path: &StorePath) -> Option<Value> {
        self.lock().get(&path.segments()).cloned()
    }

    /// Children of a collection in key order.
    pub fn children(&self, path: &StorePath) -> Vec<(String, Value)> {
        match self.snapshot(path) {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Number of write operations (set, update, remove, push) received so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Writes as the external side would (the actuator flipping a status,
    /// the recognizer appending a log), without counting as a dashboard write.
    pub fn external_set(&self, path: &StorePath, value: Value) {
        self.lock().set(&path.segments(), value);
    }

    /// Appends like [`MemoryStore::external_set`] and returns the new key.
    pub fn external_push(&self, path: &StorePath, mut value: Value) -> String {
        let now = Utc::now().timestamp_millis();
        resolve_server_values(&mut value, now);
        let mut tree = self.lock();
        let key = tree.next_push_key(now);
        let mut segments = path.segments();
        segments.push(key.as_str());
        tree.set(&segments, value);
        key
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl RemoteStore for MemoryStore {
    async fn subscribe_value(&self, path: StorePath) -> Result<Subscription, StoreError> {
        path.validate()?;
        Ok(self.lock().subscribe_value(path))
    }

    async fn subscribe_children(
        &self,
        path: StorePath,
        query: ChildQuery,
    ) -> Result<Subscription, StoreError> {
        path.validate()?;
        Ok(self.lock().subscribe_children(path, query))
    }

    async fn set(&self, path: StorePath, mut value: Value) -> Result<(), StoreError> {
        path.validate()?;
        self.count_write();
        resolve_server_values(&mut value, Utc::now().timestamp_millis());
        log::trace!("set [{}]", path);
        self.lock().set(&path.segments(), value);
        Ok(())
    }

    async fn update(&self, path: StorePath, mut fields: Map<String, Value>) -> Result<(), StoreError> {
        path.validate()?;
        self.count_write();
        let now = Utc::now().timestamp_millis();
        fields
            .values_mut()
            .for_each(|value| resolve_server_values(value, now));
        log::trace!("update [{}]", path);
        self.lock().update(&path.segments(), fields);
        Ok(())
    }

    async fn remove(&self, path: StorePath) -> Result<(), StoreError> {
        path.validate()?;
        self.count_write();
        log::trace!("remove [{}]", path);
        self.lock().remove(&path.segments());
        Ok(())
    }

    async fn push(&self, path: StorePath, value: Value) -> Result<String, StoreError> {
        path.validate()?;
        if path.key().is_some() {
            return Err(StoreError::NotACollection(path));
        }
        self.count_write();
        let key = self.external_push(&path, value);
        log::trace!("push [{}/{}]", path, key);
        Ok(key)
    }
}
