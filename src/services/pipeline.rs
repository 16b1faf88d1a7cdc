//! Pipeline execution: spawning request batches and aggregating status.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::handlers::StepHandlerFactory;
use crate::identifier::ContentIdentifier;
use crate::pipeline::{PipelineExecution, VectorizationPipeline};
use crate::request::VectorizationRequest;
use crate::store::{ResourceStore, ResourceStoreExt, paths};
use crate::types::{IdentityToken, VectorizationResult};

use super::{ServiceError, VectorizationServiceFactory};

/// Spawns vectorization requests from pipeline definitions and reconciles
/// pipeline execution status.
pub struct PipelineExecutionService<F> {
    resource_store: Arc<dyn ResourceStore>,
    service_factory: Arc<VectorizationServiceFactory<F>>,
}

impl<F: StepHandlerFactory + 'static> PipelineExecutionService<F> {
    #[must_use]
    pub fn new(
        resource_store: Arc<dyn ResourceStore>,
        service_factory: Arc<VectorizationServiceFactory<F>>,
    ) -> Self {
        Self {
            resource_store,
            service_factory,
        }
    }

    /// Runs one execution of a pipeline over the given content items.
    ///
    /// Creates one request per content item (back-referencing the
    /// execution), persists the execution record, then hands every request
    /// to the service matching the pipeline's processing type. Returns the
    /// execution record as persisted after submission, plus the per-request
    /// results.
    #[instrument(skip(self, pipeline, content, identity), fields(pipeline = %pipeline.name))]
    pub async fn start_execution(
        &self,
        pipeline: &VectorizationPipeline,
        content: Vec<ContentIdentifier>,
        identity: &IdentityToken,
    ) -> Result<(PipelineExecution, Vec<VectorizationResult>), ServiceError> {
        if !pipeline.active {
            return Err(ServiceError::InactivePipeline {
                name: pipeline.name.clone(),
            });
        }

        let mut execution = PipelineExecution::new(pipeline);
        let requests: Vec<VectorizationRequest> = content
            .into_iter()
            .map(|item| {
                VectorizationRequest::new(item, pipeline.processing_type, pipeline.steps())
                    .with_pipeline(&pipeline.object_id, &execution.execution_id)
            })
            .collect();
        for request in &requests {
            execution.register_request(&request.object_id);
        }
        self.resource_store
            .upsert_typed(&execution.object_id, &execution, identity)
            .await?;

        tracing::info!(
            execution = %execution.execution_id,
            requests = requests.len(),
            "pipeline execution started"
        );

        let service = self.service_factory.service_for(pipeline.processing_type);
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(
                service
                    .process_request(request, identity, CancellationToken::new())
                    .await,
            );
        }

        // The per-request persistence hooks kept the stored record current;
        // re-read it so the caller sees the aggregate after submission.
        let refreshed = self
            .resource_store
            .get_typed::<PipelineExecution>(&execution.object_id, identity)
            .await?
            .unwrap_or(execution);
        Ok((refreshed, results))
    }

    /// Returns the current status of one pipeline execution.
    ///
    /// Terminal executions are returned verbatim (they are append-only).
    /// In-progress executions are reconciled by re-reading every
    /// constituent request's persisted state and re-deriving the aggregate;
    /// the reconciled record is persisted before it is returned.
    #[instrument(skip(self, identity))]
    pub async fn execution_status(
        &self,
        pipeline_name: &str,
        execution_id: &str,
        identity: &IdentityToken,
    ) -> Result<PipelineExecution, ServiceError> {
        let path = paths::pipeline_execution_resource(pipeline_name, execution_id);
        let mut execution: PipelineExecution = self
            .resource_store
            .get_typed(&path, identity)
            .await?
            .ok_or_else(|| ServiceError::ExecutionNotFound {
                pipeline_name: pipeline_name.to_string(),
                execution_id: execution_id.to_string(),
            })?;

        if execution.processing_state.is_terminal() {
            return Ok(execution);
        }

        for request_object_id in execution.vectorization_request_object_ids.clone() {
            match self
                .resource_store
                .get_typed::<VectorizationRequest>(&request_object_id, identity)
                .await?
            {
                Some(request) => {
                    execution.record_request_status(&request_object_id, request.processing_state);
                }
                // Keep the last observed state for requests the store has
                // not surfaced yet (eventual consistency).
                None => {}
            }
        }
        execution.recompute();

        self.resource_store
            .upsert_typed(&path, &execution, identity)
            .await?;
        Ok(execution)
    }
}
