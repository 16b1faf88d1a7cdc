//! In-memory store implementations, for tests, development, and the
//! synchronous deployment mode that keeps state process-local.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::state::VectorizationState;
use crate::types::IdentityToken;

use super::{ResourceStore, StateStore, StoreError};

/// Process-local [`ResourceStore`] backed by a map of JSON documents.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    entries: RwLock<FxHashMap<String, Value>>,
}

impl MemoryResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(
        &self,
        path: &str,
        _identity: &IdentityToken,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().get(path).cloned())
    }

    async fn upsert(
        &self,
        path: &str,
        body: Value,
        _identity: &IdentityToken,
    ) -> Result<(), StoreError> {
        self.entries.write().insert(path.to_string(), body);
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        _identity: &IdentityToken,
    ) -> Result<Vec<Value>, StoreError> {
        let entries = self.entries.read();
        let mut matched: Vec<(&String, &Value)> = entries
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .collect();
        matched.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(matched.into_iter().map(|(_, v)| v.clone()).collect())
    }
}

/// Process-local [`StateStore`]. The write lock serializes writes per key.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<FxHashMap<String, VectorizationState>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn has_state(&self, state_key: &str) -> Result<bool, StoreError> {
        Ok(self.states.read().contains_key(state_key))
    }

    async fn read_state(&self, state_key: &str) -> Result<Option<VectorizationState>, StoreError> {
        Ok(self.states.read().get(state_key).cloned())
    }

    async fn save_state(&self, state: &VectorizationState) -> Result<(), StoreError> {
        let key = state.state_key().map_err(|e| StoreError::Backend {
            message: e.to_string(),
        })?;
        self.states.write().insert(key, state.clone());
        Ok(())
    }
}
