use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{RegistryStore, ScanPage, StoreStatus};
use crate::error::RegistryError;

/// Process-local registry store.
///
/// Used for `registry_backend = "memory"` (single-process deployments) and in
/// tests. Scan cursors are the last key of the previous page, so keys deleted
/// between pages never shift later keys out of the scan.
#[derive(Default)]
pub struct MemoryStore {
    sets: DashMap<String, HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held, prefixed or not.
    pub fn key_count(&self) -> usize {
        self.sets.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.sets.contains_key(key)
    }
}

/// Glob match supporting a single trailing `*`, which is all the registry uses.
fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn add_member(&self, key: &str, member: &str) -> Result<(), RegistryError> {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), RegistryError> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.remove(member);
        }
        // Guard dropped above; an empty set is the same as an absent key
        self.sets.remove_if(key, |_, set| set.is_empty());
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>, RegistryError> {
        Ok(self
            .sets
            .get(key)
            .map(|set| set.value().clone())
            .unwrap_or_default())
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, RegistryError> {
        let mut matching: Vec<String> = self
            .sets
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| matches_pattern(key, pattern))
            .filter(|key| cursor.map_or(true, |after| key.as_str() > after))
            .collect();
        matching.sort();

        let count = count.max(1);
        let next = if matching.len() > count {
            matching.truncate(count);
            matching.last().cloned()
        } else {
            None
        };

        Ok(ScanPage {
            keys: matching,
            next,
        })
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, RegistryError> {
        let removed = keys
            .iter()
            .filter(|key| self.sets.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    fn status(&self) -> StoreStatus {
        StoreStatus::Memory
    }
}
