//! Handler for the partition step: splits extracted text into chunks.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::profiles::TextPartitioningProfile;
use crate::request::{VectorizationRequest, VectorizationStep};
use crate::state::{ArtifactKind, VectorizationArtifact, VectorizationState};
use crate::store::ResourceStoreExt;
use crate::store::paths;
use crate::types::{IdentityToken, StepKind};

use super::{HandlerError, HandlerServices, StepHandler};

/// Executes the partition step by delegating to the configured
/// [`TextPartitioner`](crate::steps::TextPartitioner).
pub struct PartitionHandler {
    message_id: String,
    services: Arc<HandlerServices>,
    profile_name: String,
}

impl PartitionHandler {
    /// Parses the step parameters once; `text_partitioning_profile_name`
    /// is required.
    pub fn from_step(
        step: &VectorizationStep,
        message_id: &str,
        services: Arc<HandlerServices>,
    ) -> Result<Self, HandlerError> {
        let profile_name = step
            .parameters
            .get("text_partitioning_profile_name")
            .cloned()
            .ok_or(HandlerError::MissingParameter {
                step: StepKind::Partition,
                parameter: "text_partitioning_profile_name",
            })?;
        Ok(Self {
            message_id: message_id.to_string(),
            services,
            profile_name,
        })
    }
}

#[async_trait]
impl StepHandler for PartitionHandler {
    fn step_kind(&self) -> StepKind {
        StepKind::Partition
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }

    async fn process(
        &self,
        _request: &mut VectorizationRequest,
        state: &mut VectorizationState,
        identity: &IdentityToken,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        if cancel.is_cancelled() {
            return Err(HandlerError::Cancelled {
                step: StepKind::Partition,
            });
        }

        let profile: TextPartitioningProfile = self
            .services
            .resource_store
            .require_typed(
                &paths::text_partitioning_profile_resource(&self.profile_name),
                identity,
            )
            .await?;

        let text = state
            .artifacts_of(ArtifactKind::ExtractedText)
            .first()
            .map(|a| a.content.clone())
            .ok_or(HandlerError::MissingArtifacts {
                step: StepKind::Partition,
                artifact: ArtifactKind::ExtractedText,
            })?;

        let partitions = self.services.partitioner.partition(&text, &profile).await?;

        for (i, chunk) in partitions.into_iter().enumerate() {
            state.add_or_replace_artifact(VectorizationArtifact::new(
                ArtifactKind::TextPartition,
                (i + 1) as u32,
                chunk,
            ));
        }
        Ok(true)
    }
}
