use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RegistryError;

/// Link state of a backing store, reported on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Connected,
    Reconnecting,
    Memory,
}

/// One page of a cursor-driven key scan.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` once the keyspace is exhausted.
    pub next: Option<String>,
}

/// Key/value storage with set semantics, shared by every server process.
///
/// Each call is atomic on the store side; callers layer no locking on top.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Add `member` to the set at `key`, creating the set if needed.
    async fn add_member(&self, key: &str, member: &str) -> Result<(), RegistryError>;

    /// Remove `member` from the set at `key`. Missing members are not an error.
    async fn remove_member(&self, key: &str, member: &str) -> Result<(), RegistryError>;

    /// All members of the set at `key`; empty when the key does not exist.
    async fn members(&self, key: &str) -> Result<HashSet<String>, RegistryError>;

    /// Return one page of keys matching a glob `pattern`, starting at `cursor`
    /// (`None` starts a new scan). `count` is a hint for the page size.
    async fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, RegistryError>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, RegistryError>;

    fn status(&self) -> StoreStatus;
}
