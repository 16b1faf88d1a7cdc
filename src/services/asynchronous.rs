//! Asynchronous vectorization service: fire-and-forget submission.
//!
//! Validates and persists the request, then enqueues it on the request
//! source bound to its first step and returns immediately. The per-step
//! [`StepWorker`](super::worker::StepWorker)s drive execution out-of-band,
//! re-submitting the request to the next step's source as each step
//! completes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::request::VectorizationRequest;
use crate::sources::RequestSources;
use crate::store::ResourceStore;
use crate::types::{IdentityToken, VectorizationResult};

use super::{VectorizationService, persist_request, validate_submission};

/// Queue-submitting vectorization service.
pub struct AsynchronousVectorizationService {
    sources: Arc<RequestSources>,
    resource_store: Arc<dyn ResourceStore>,
}

impl AsynchronousVectorizationService {
    #[must_use]
    pub fn new(sources: Arc<RequestSources>, resource_store: Arc<dyn ResourceStore>) -> Self {
        Self {
            sources,
            resource_store,
        }
    }
}

#[async_trait]
impl VectorizationService for AsynchronousVectorizationService {
    #[instrument(skip(self, request, identity, _cancel), fields(request = %request.name))]
    async fn process_request(
        &self,
        request: VectorizationRequest,
        identity: &IdentityToken,
        _cancel: CancellationToken,
    ) -> VectorizationResult {
        if let Err(err) =
            validate_submission(self.resource_store.as_ref(), &request, identity).await
        {
            tracing::warn!(request = %request.name, error = %err, "request rejected");
            return VectorizationResult::failed(&request.object_id, err.to_string());
        }

        let Some(first_step) = request.current_step() else {
            // Unreachable after validation; kept as a guard for callers
            // bypassing it.
            return VectorizationResult::failed(&request.object_id, "the request has no steps");
        };

        // Persist before enqueueing so consumers always find the resource.
        if let Err(err) = persist_request(self.resource_store.as_ref(), &request, identity).await {
            return VectorizationResult::failed(&request.object_id, err.to_string());
        }

        let source = match self.sources.require(first_step) {
            Ok(source) => source,
            Err(err) => {
                return VectorizationResult::failed(&request.object_id, err.to_string());
            }
        };
        if let Err(err) = source.submit_request(&request).await {
            return VectorizationResult::failed(&request.object_id, err.to_string());
        }

        tracing::info!(
            request = %request.name,
            step = %first_step,
            "request submitted for asynchronous processing"
        );
        VectorizationResult::ok(&request.object_id)
    }
}
