//! Handler for the extract step: turns a content identifier into raw text.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::profiles::ContentSourceProfile;
use crate::request::{VectorizationRequest, VectorizationStep};
use crate::state::{ArtifactKind, VectorizationArtifact, VectorizationState};
use crate::store::ResourceStoreExt;
use crate::store::paths;
use crate::types::{IdentityToken, StepKind};

use super::{HandlerError, HandlerServices, StepHandler};

/// Executes the extract step by delegating to the configured
/// [`ContentExtractor`](crate::steps::ContentExtractor).
pub struct ExtractHandler {
    message_id: String,
    services: Arc<HandlerServices>,
}

impl ExtractHandler {
    /// The extract step needs no parameters: the content source profile is
    /// named by the request's content identifier.
    pub fn from_step(
        _step: &VectorizationStep,
        message_id: &str,
        services: Arc<HandlerServices>,
    ) -> Result<Self, HandlerError> {
        Ok(Self {
            message_id: message_id.to_string(),
            services,
        })
    }
}

#[async_trait]
impl StepHandler for ExtractHandler {
    fn step_kind(&self) -> StepKind {
        StepKind::Extract
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
                step: StepKind::Extract,
            });
        }

        let profile_path = paths::content_source_profile_resource(
            &request.content_identifier.content_source_profile_name,
        );
        let profile: ContentSourceProfile = self
            .services
            .resource_store
            .require_typed(&profile_path, identity)
            .await?;

        let text = self
            .services
            .extractor
            .extract_text(&request.content_identifier, &profile)
            .await?;

        state.add_or_replace_artifact(VectorizationArtifact::new(
            ArtifactKind::ExtractedText,
            1,
            text,
        ));
        Ok(true)
    }
}
