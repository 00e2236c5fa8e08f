//! Session registry: identity -> set of live connection IDs.
//!
//! The registry lives in a store shared by every server process. Keys are
//! `<prefix>_<identity>` and hold a set of connection IDs. Mutations never fail
//! from the caller's point of view: a store error is logged and the connection
//! keeps working locally. Lookups degrade to "no connections" on error.

pub mod memory;
pub mod redis_store;
pub mod store;

use std::collections::HashSet;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use redis_store::{ReconnectPolicy, RedisStore};
pub use store::{RegistryStore, ScanPage, StoreStatus};

use crate::error::RegistryError;

/// Prefix for every registry key written by this service.
pub const DEFAULT_KEY_PREFIX: &str = "wsid";

/// Keys requested per `SCAN` round trip during a bulk clear.
const CLEAR_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn RegistryStore>,
    prefix: Arc<str>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn RegistryStore>, prefix: &str) -> Self {
        Self {
            store,
            prefix: Arc::from(prefix),
        }
    }

    fn key_for(&self, identity: &str) -> String {
        format!("{}_{}", self.prefix, identity)
    }

    /// Record `connection_id` as a live connection of `identity`.
    pub async fn add(&self, identity: &str, connection_id: &str) {
        let key = self.key_for(identity);
        match self.store.add_member(&key, connection_id).await {
            Ok(()) => {
                tracing::debug!(
                    identity = %identity,
                    connection_id = %connection_id,
                    "Connection added to registry"
                );
            }
            Err(e) => {
                // Local delivery still works without the shared entry
                tracing::error!(
                    identity = %identity,
                    connection_id = %connection_id,
                    error = %e,
                    "Failed to add connection to registry"
                );
            }
        }
    }

    /// Forget `connection_id` for `identity`. Unknown members are a no-op.
    pub async fn remove(&self, identity: &str, connection_id: &str) {
        let key = self.key_for(identity);
        match self.store.remove_member(&key, connection_id).await {
            Ok(()) => {
                tracing::debug!(
                    identity = %identity,
                    connection_id = %connection_id,
                    "Connection removed from registry"
                );
            }
            Err(e) => {
                tracing::error!(
                    identity = %identity,
                    connection_id = %connection_id,
                    error = %e,
                    "Failed to remove connection from registry"
                );
            }
        }
    }

    /// Live connection IDs for `identity`; empty when unknown or when the store fails.
    pub async fn lookup(&self, identity: &str) -> HashSet<String> {
        let key = self.key_for(identity);
        match self.store.members(&key).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(
                    identity = %identity,
                    error = %e,
                    "Failed to look up connections, treating identity as offline"
                );
                HashSet::new()
            }
        }
    }

    /// Delete every key in this registry's namespace, one scan page at a time,
    /// and return how many keys were removed. Keys outside the namespace are
    /// never touched.
    pub async fn clear(&self) -> Result<u64, RegistryError> {
        let pattern = format!("{}_*", self.prefix);
        let mut cursor: Option<String> = None;
        let mut deleted = 0;

        loop {
            let page = self
                .store
                .scan(&pattern, cursor.as_deref(), CLEAR_PAGE_SIZE)
                .await?;
            if !page.keys.is_empty() {
                deleted += self.store.delete(&page.keys).await?;
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(deleted, pattern = %pattern, "Cleared session registry");
        Ok(deleted)
    }

    pub fn status(&self) -> StoreStatus {
        self.store.status()
    }
}
