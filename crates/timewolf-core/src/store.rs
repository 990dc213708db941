//! Run-scoped container store and key/value cache.

use crate::container::{ContainerHandle, ContainerKind};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Shared repository of every container produced during one pipeline run.
///
/// Containers are grouped by type tag, in insertion order per tag. Adds are
/// atomic with respect to each other and to reads; reads return snapshots
/// that later writes never disturb.
#[derive(Default)]
pub struct ContainerStore {
    containers: DashMap<String, Vec<ContainerHandle>>,
}

impl ContainerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a container under its tag and returns the stored handle.
    pub fn add(&self, container: impl Into<ContainerHandle>) -> ContainerHandle {
        let handle = container.into();
        let tag = handle.type_tag().to_string();
        let mut entry = self.containers.entry(tag).or_default();
        entry.push(handle.clone());
        debug!(tag = handle.type_tag(), count = entry.len(), "container stored");
        handle
    }

    /// Snapshot of the containers currently stored under `tag`.
    pub fn get_by_type(&self, tag: &str) -> Vec<ContainerHandle> {
        self.containers
            .get(tag)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Read-and-clear: returns the containers stored under `tag` and removes
    /// them in the same step.
    pub fn take_by_type(&self, tag: &str) -> Vec<ContainerHandle> {
        self.containers
            .get_mut(tag)
            .map(|mut entry| std::mem::take(entry.value_mut()))
            .unwrap_or_default()
    }

    /// Puts containers removed by `take_by_type` back under `tag`, ahead of
    /// anything stored since and in their original order.
    pub fn restore(&self, tag: &str, handles: Vec<ContainerHandle>) {
        if handles.is_empty() {
            return;
        }
        let restored = handles.len();
        let mut entry = self.containers.entry(tag.to_string()).or_default();
        let later = std::mem::replace(entry.value_mut(), handles);
        entry.extend(later);
        debug!(tag = %tag, restored, count = entry.len(), "containers restored");
    }

    pub fn count(&self, tag: &str) -> usize {
        self.containers.get(tag).map(|e| e.len()).unwrap_or(0)
    }

    pub fn get<T: ContainerKind>(&self) -> Vec<ContainerHandle> {
        self.get_by_type(T::TYPE_TAG)
    }

    pub fn count_of<T: ContainerKind>(&self) -> usize {
        self.count(T::TYPE_TAG)
    }

    /// Clones of the `T` values stored under `T`'s tag, in insertion order.
    pub fn values<T: ContainerKind>(&self) -> Vec<T> {
        self.get::<T>()
            .iter()
            .filter_map(|h| h.with::<T, _>(Clone::clone))
            .collect()
    }

    /// Tags with at least one stored container, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .containers
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        tags.sort();
        tags
    }

    pub fn total(&self) -> usize {
        self.containers.iter().map(|e| e.value().len()).sum()
    }

    /// Empties the whole store. Intended for test setup between runs.
    pub fn reset(&self) {
        self.containers.clear();
    }
}

/// Run-scoped cache for values that are not containers.
#[derive(Default)]
pub struct RunCache {
    entries: DashMap<String, Value>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Serializes `value` into the cache. Returns `false` if it cannot be
    /// represented as JSON.
    pub fn insert_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.entries.insert(key.into(), v);
                true
            }
            Err(_) => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
