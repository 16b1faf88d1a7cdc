//! Vectorization services: the orchestration layer.
//!
//! - [`SynchronousVectorizationService`]: drives a request through its full
//!   step sequence in-process (the core state machine).
//! - [`AsynchronousVectorizationService`]: fire-and-forget submission to the
//!   first step's request source; queue-driven [`StepWorker`]s carry the
//!   request through the remaining steps.
//! - [`VectorizationServiceFactory`]: routes a request to one of the two by
//!   its processing type.
//! - [`PipelineExecutionService`]: spawns request batches from pipeline
//!   definitions and aggregates their statuses.
//!
//! Services are the only layer allowed to catch handler errors; they always
//! convert a failure into a terminal `Failed` state plus a structured
//! [`VectorizationResult`]. Callers branch on `success`, never on errors.

pub mod asynchronous;
pub mod factory;
pub mod pipeline;
pub mod synchronous;
pub mod worker;

pub use asynchronous::AsynchronousVectorizationService;
pub use factory::VectorizationServiceFactory;
pub use pipeline::PipelineExecutionService;
pub use synchronous::SynchronousVectorizationService;
pub use worker::{StepWorker, StepWorkerSettings, WorkerHost, WorkerHostBuilder};

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::handlers::HandlerError;
use crate::identifier::ContentIdentifier;
use crate::pipeline::PipelineExecution;
use crate::profiles::{ALLOWED_FILE_EXTENSIONS, ContentSourceKind, ContentSourceProfile};
use crate::request::{RequestError, VectorizationRequest};
use crate::sources::{SourceConfigError, SourceError};
use crate::store::{ResourceStore, ResourceStoreExt, StoreError, paths};
use crate::types::{IdentityToken, VectorizationResult};

/// Errors internal to the service layer.
///
/// These never cross the [`VectorizationService`] boundary; they are
/// converted into failed [`VectorizationResult`]s there.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    SourceConfig(#[from] SourceConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identifier(#[from] crate::identifier::ContentIdentifierError),

    /// Submission-time content checks failed.
    #[error("content validation failed: {message}")]
    #[diagnostic(code(vectorline::services::content_validation))]
    ContentValidation {
        /// What was wrong with the content reference.
        message: String,
    },

    /// A trigger tried to run an inactive pipeline.
    #[error("pipeline {name} is not active")]
    #[diagnostic(code(vectorline::services::inactive_pipeline))]
    InactivePipeline {
        /// The pipeline name.
        name: String,
    },

    /// A status query referenced an unknown execution.
    #[error("pipeline execution {execution_id} of pipeline {pipeline_name} was not found")]
    #[diagnostic(code(vectorline::services::execution_not_found))]
    ExecutionNotFound {
        /// The pipeline name.
        pipeline_name: String,
        /// The unknown execution id.
        execution_id: String,
    },
}

/// Orchestrates the processing of one vectorization request.
#[async_trait]
pub trait VectorizationService: Send + Sync {
    /// Processes (or submits) a request and reports the structured outcome.
    ///
    /// Cancelling the token stops processing at the next suspension point
    /// and leaves the request `InProgress` so a resumed run can retry the
    /// current step from persisted state.
    async fn process_request(
        &self,
        request: VectorizationRequest,
        identity: &IdentityToken,
        cancel: CancellationToken,
    ) -> VectorizationResult;
}

/// Persists a request resource and refreshes the owning pipeline execution,
/// if the request carries one. Every request mutation goes through here so
/// pipeline aggregates never go stale.
pub(crate) async fn persist_request(
    store: &dyn ResourceStore,
    request: &VectorizationRequest,
    identity: &IdentityToken,
) -> Result<(), ServiceError> {
    store
        .upsert_typed(&request.object_id, request, identity)
        .await?;
    refresh_pipeline_status(store, request, identity).await
}

/// Pushes a request's latest state into its pipeline execution record.
pub(crate) async fn refresh_pipeline_status(
    store: &dyn ResourceStore,
    request: &VectorizationRequest,
    identity: &IdentityToken,
) -> Result<(), ServiceError> {
    let (Some(pipeline_object_id), Some(execution_id)) = (
        request.pipeline_object_id.as_deref(),
        request.pipeline_execution_id.as_deref(),
    ) else {
        return Ok(());
    };

    let pipeline_name = paths::resource_name(pipeline_object_id);
    let path = paths::pipeline_execution_resource(pipeline_name, execution_id);
    let Some(mut execution) = store.get_typed::<PipelineExecution>(&path, identity).await? else {
        tracing::warn!(
            execution = %path,
            request = %request.name,
            "request references a missing pipeline execution record"
        );
        return Ok(());
    };
    execution.record_request_status(&request.object_id, request.processing_state);
    store.upsert_typed(&path, &execution, identity).await?;
    Ok(())
}

/// Submission-time validation shared by both services.
///
/// Checks the request's own invariants, then the content reference against
/// its content source profile: file-backed sources require a supported file
/// extension, web sources an http(s) protocol part. Rejected requests never
/// leave `New`.
pub(crate) async fn validate_submission(
    store: &dyn ResourceStore,
    request: &VectorizationRequest,
    identity: &IdentityToken,
) -> Result<(), ServiceError> {
    request.validate_for_submission()?;

    let profile_path = paths::content_source_profile_resource(
        &request.content_identifier.content_source_profile_name,
    );
    let profile: ContentSourceProfile = store.require_typed(&profile_path, identity).await?;
    validate_content_source(&profile, &request.content_identifier)
}

fn validate_content_source(
    profile: &ContentSourceProfile,
    content: &ContentIdentifier,
) -> Result<(), ServiceError> {
    match profile.kind {
        ContentSourceKind::ObjectStore | ContentSourceKind::Database => {
            let file_name = content.file_name().unwrap_or_default();
            let extension = file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            if extension.is_empty() {
                return Err(ServiceError::ContentValidation {
                    message: format!("the file {file_name} does not have an extension"),
                });
            }
            if !ALLOWED_FILE_EXTENSIONS.contains(&extension.as_str()) {
                return Err(ServiceError::ContentValidation {
                    message: format!("the file extension {extension} is not supported"),
                });
            }
        }
        ContentSourceKind::Web => {
            let protocol = content.part(0).unwrap_or_default().to_ascii_lowercase();
            if protocol != "http" && protocol != "https" {
                return Err(ServiceError::ContentValidation {
                    message: format!("the protocol {protocol} is not supported"),
                });
            }
        }
    }
    Ok(())
}
