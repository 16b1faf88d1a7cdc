//! Storage seams: the resource store and the vectorization state store.
//!
//! The engine persists everything through two narrow interfaces:
//!
//! - [`ResourceStore`]: an eventually-consistent key-value store addressed
//!   by hierarchical path strings (`vectorization-requests/<name>`, …). It
//!   holds requests, pipelines, pipeline executions, and profiles as JSON
//!   documents. [`ResourceStoreExt`] adds typed get/upsert/list on top.
//! - [`StateStore`]: the durable home of [`VectorizationState`] records,
//!   addressed by the stable key derived from a content identifier. Writes
//!   are serialized per key, since poll iterations may race with a
//!   cancellation or retry path.
//!
//! Both come with an in-memory implementation; the state store also has a
//! SQLite-backed one behind the `sqlite` feature.

pub mod memory;
pub mod paths;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryResourceStore, MemoryStateStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStateStore;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::state::VectorizationState;
use crate::types::IdentityToken;

/// Errors raised by the storage seams.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// A required resource is missing.
    #[error("resource not found: {path}")]
    #[diagnostic(code(vectorline::store::not_found))]
    NotFound {
        /// The requested resource path.
        path: String,
    },

    /// A stored document could not be (de)serialized.
    #[error("serialization error for {path}: {source}")]
    #[diagnostic(code(vectorline::store::serde))]
    Serde {
        /// The resource path involved.
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store failed.
    #[error("storage backend error: {message}")]
    #[diagnostic(code(vectorline::store::backend))]
    Backend {
        /// Backend detail.
        message: String,
    },
}

/// Key-value resource store addressed by hierarchical path strings.
///
/// The engine treats the store as eventually consistent and always
/// re-reads before deriving aggregate state. Implementations must support
/// concurrent upsert by path.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Reads the document at `path`, or `None` if absent.
    async fn get(&self, path: &str, identity: &IdentityToken) -> Result<Option<Value>, StoreError>;

    /// Creates or replaces the document at `path`.
    async fn upsert(
        &self,
        path: &str,
        body: Value,
        identity: &IdentityToken,
    ) -> Result<(), StoreError>;

    /// Lists the documents whose path starts with `prefix`, in path order.
    async fn list(&self, prefix: &str, identity: &IdentityToken)
    -> Result<Vec<Value>, StoreError>;
}

/// Typed convenience layer over [`ResourceStore`].
#[async_trait]
pub trait ResourceStoreExt: ResourceStore {
    /// Reads and deserializes the document at `path`, or `None` if absent.
    async fn get_typed<T: DeserializeOwned + Send>(
        &self,
        path: &str,
        identity: &IdentityToken,
    ) -> Result<Option<T>, StoreError> {
        match self.get(path, identity).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Serde {
                    path: path.to_string(),
                    source,
                }),
        }
    }

    /// Like [`get_typed`](Self::get_typed) but fails with
    /// [`StoreError::NotFound`] when the document is absent.
    async fn require_typed<T: DeserializeOwned + Send>(
        &self,
        path: &str,
        identity: &IdentityToken,
    ) -> Result<T, StoreError> {
        self.get_typed(path, identity)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    /// Serializes and upserts a document at `path`.
    async fn upsert_typed<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
        identity: &IdentityToken,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(body).map_err(|source| StoreError::Serde {
            path: path.to_string(),
            source,
        })?;
        self.upsert(path, value, identity).await
    }

    /// Lists and deserializes the documents under `prefix`.
    async fn list_typed<T: DeserializeOwned + Send>(
        &self,
        prefix: &str,
        identity: &IdentityToken,
    ) -> Result<Vec<T>, StoreError> {
        self.list(prefix, identity)
            .await?
            .into_iter()
            .map(|value| {
                serde_json::from_value(value).map_err(|source| StoreError::Serde {
                    path: prefix.to_string(),
                    source,
                })
            })
            .collect()
    }
}

impl<S: ResourceStore + ?Sized> ResourceStoreExt for S {}

/// Durable store of [`VectorizationState`] records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Whether a record exists for the key.
    async fn has_state(&self, state_key: &str) -> Result<bool, StoreError>;

    /// Reads the record for the key, or `None` if absent.
    async fn read_state(&self, state_key: &str) -> Result<Option<VectorizationState>, StoreError>;

    /// Creates or replaces the record addressed by the state's own key.
    /// Implementations must serialize writes per key.
    async fn save_state(&self, state: &VectorizationState) -> Result<(), StoreError>;
}
