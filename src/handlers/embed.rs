//! Handler for the embed step.
//!
//! Embedding may run as a long-running external operation. The first
//! invocation either completes synchronously or records the operation on
//! the request and reports "still running"; subsequent invocations poll
//! the operation instead of starting the work again, which keeps the step
//! idempotent under re-delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::profiles::TextEmbeddingProfile;
use crate::request::{VectorizationRequest, VectorizationStep};
use crate::state::{ArtifactKind, VectorizationArtifact, VectorizationState};
use crate::steps::{Embedding, EmbeddingJob};
use crate::store::ResourceStoreExt;
use crate::store::paths;
use crate::types::{IdentityToken, StepKind};

use super::{HandlerError, HandlerServices, StepHandler};

/// Executes the embed step by delegating to the configured
/// [`EmbeddingService`](crate::steps::EmbeddingService).
pub struct EmbedHandler {
    message_id: String,
    services: Arc<HandlerServices>,
    profile_name: String,
}

impl EmbedHandler {
    /// Parses the step parameters once; `text_embedding_profile_name` is
    /// required.
    pub fn from_step(
        step: &VectorizationStep,
        message_id: &str,
        services: Arc<HandlerServices>,
    ) -> Result<Self, HandlerError> {
        let profile_name = step
            .parameters
            .get("text_embedding_profile_name")
            .cloned()
            .ok_or(HandlerError::MissingParameter {
                step: StepKind::Embed,
                parameter: "text_embedding_profile_name",
            })?;
        Ok(Self {
            message_id: message_id.to_string(),
            services,
            profile_name,
        })
    }

    fn store_vectors(
        state: &mut VectorizationState,
        vectors: &[Embedding],
    ) -> Result<(), HandlerError> {
        for (i, embedding) in vectors.iter().enumerate() {
            state.add_or_replace_artifact(VectorizationArtifact::new(
                ArtifactKind::TextEmbeddingVector,
                (i + 1) as u32,
                serde_json::to_string(embedding)?,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StepHandler for EmbedHandler {
    fn step_kind(&self) -> StepKind {
        StepKind::Embed
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
                step: StepKind::Embed,
            });
        }

        // Poll path: an operation is already in flight for this step.
        if request.has_incomplete_operation(StepKind::Embed) {
            let operation_id = request
                .running_operation(StepKind::Embed)
                .map(|op| op.operation_id.clone())
                .unwrap_or_default();
            return match self.services.embedder.poll_embedding(&operation_id).await? {
                EmbeddingJob::Completed(vectors) => {
                    Self::store_vectors(state, &vectors)?;
                    request.record_running_operation(StepKind::Embed, operation_id, true);
                    Ok(true)
                }
                EmbeddingJob::Running { operation_id } => {
                    request.record_running_operation(StepKind::Embed, operation_id, false);
                    Ok(false)
                }
            };
        }

        let profile: TextEmbeddingProfile = self
            .services
            .resource_store
            .require_typed(
                &paths::text_embedding_profile_resource(&self.profile_name),
                identity,
            )
            .await?;

        let partitions: Vec<String> = state
            .artifacts_of(ArtifactKind::TextPartition)
            .iter()
            .map(|a| a.content.clone())
            .collect();
        if partitions.is_empty() {
            return Err(HandlerError::MissingArtifacts {
                step: StepKind::Embed,
                artifact: ArtifactKind::TextPartition,
            });
        }

        match self
            .services
            .embedder
            .start_embedding(&partitions, &profile)
            .await?
        {
            EmbeddingJob::Completed(vectors) => {
                if vectors.len() != partitions.len() {
                    return Err(HandlerError::ArtifactMismatch {
                        partitions: partitions.len(),
                        vectors: vectors.len(),
                    });
                }
                Self::store_vectors(state, &vectors)?;
                Ok(true)
            }
            EmbeddingJob::Running { operation_id } => {
                request.record_running_operation(StepKind::Embed, operation_id, false);
                Ok(false)
            }
        }
    }
}
