//! Handler for the index step: writes embeddings into a vector index.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::profiles::IndexingProfile;
use crate::request::{VectorizationRequest, VectorizationStep};
use crate::state::{ArtifactKind, VectorizationState};
use crate::steps::{Embedding, IndexEntry};
use crate::store::ResourceStoreExt;
use crate::store::paths;
use crate::types::{IdentityToken, StepKind};

use super::{HandlerError, HandlerServices, StepHandler};

/// Executes the index step by delegating to the configured
/// [`IndexWriter`](crate::steps::IndexWriter).
pub struct IndexHandler {
    message_id: String,
    services: Arc<HandlerServices>,
    profile_name: String,
}

impl IndexHandler {
    /// Parses the step parameters once; `indexing_profile_name` is required.
    pub fn from_step(
        step: &VectorizationStep,
        message_id: &str,
        services: Arc<HandlerServices>,
    ) -> Result<Self, HandlerError> {
        let profile_name = step
            .parameters
            .get("indexing_profile_name")
            .cloned()
            .ok_or(HandlerError::MissingParameter {
                step: StepKind::Index,
                parameter: "indexing_profile_name",
            })?;
        Ok(Self {
            message_id: message_id.to_string(),
            services,
            profile_name,
        })
    }
}

#[async_trait]
impl StepHandler for IndexHandler {
    fn step_kind(&self) -> StepKind {
        StepKind::Index
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }

    async fn process(
        &self,
        request: &mut VectorizationRequest,
        state: &mut VectorizationState,
        identity: &IdentityToken,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        if cancel.is_cancelled() {
            return Err(HandlerError::Cancelled {
                step: StepKind::Index,
            });
        }

        let profile: IndexingProfile = self
            .services
            .resource_store
            .require_typed(
                &paths::indexing_profile_resource(&self.profile_name),
                identity,
            )
            .await?;

        let partitions: Vec<(u32, String)> = state
            .artifacts_of(ArtifactKind::TextPartition)
            .iter()
            .map(|a| (a.position, a.content.clone()))
            .collect();
        if partitions.is_empty() {
            return Err(HandlerError::MissingArtifacts {
                step: StepKind::Index,
                artifact: ArtifactKind::TextPartition,
            });
        }

        let vectors: Vec<String> = state
            .artifacts_of(ArtifactKind::TextEmbeddingVector)
            .iter()
            .map(|a| a.content.clone())
            .collect();
        if vectors.is_empty() {
            return Err(HandlerError::MissingArtifacts {
                step: StepKind::Index,
                artifact: ArtifactKind::TextEmbeddingVector,
            });
        }
        if vectors.len() != partitions.len() {
            return Err(HandlerError::ArtifactMismatch {
                partitions: partitions.len(),
                vectors: vectors.len(),
            });
        }

        let mut entries = Vec::with_capacity(partitions.len());
        for ((position, text), vector) in partitions.into_iter().zip(vectors) {
            let embedding: Embedding = serde_json::from_str(&vector)?;
            entries.push(IndexEntry {
                position,
                text,
                embedding,
                canonical_id: request.content_identifier.canonical_id.clone(),
            });
        }

        let index_entry_ids = self
            .services
            .index_writer
            .write_entries(entries, &profile)
            .await?;
        state.replace_index_references(index_entry_ids);
        Ok(true)
    }
}
