//! Step handler framework.
//!
//! A [`StepHandler`] executes one pipeline step for one request. Handlers
//! are created per invocation by a [`StepHandlerFactory`] and receive the
//! request, its durable state, the caller identity, and a cancellation
//! token.
//!
//! # Contract
//!
//! [`StepHandler::invoke`] returns:
//!
//! - `Ok(true)` — the step fully completed (synchronously, or because a
//!   previously started long-running operation has now finished);
//! - `Ok(false)` — the step started (or is still waiting on) a long-running
//!   external operation; the request's running-operation entry for this step
//!   has been populated or refreshed. Safe to invoke again to poll.
//! - `Err(_)` — an unrecoverable, typed failure. The handler never mutates
//!   `ProcessingState`; marking the request Failed is the orchestrating
//!   service's job.
//!
//! The provided `invoke` wrapper validates that the request actually
//! contains the handler's step, writes start/end/error entries into the
//! execution log, and records failures on the request before propagating.

pub mod embed;
pub mod extract;
pub mod factory;
pub mod index;
pub mod partition;

pub use embed::EmbedHandler;
pub use extract::ExtractHandler;
pub use factory::{ProfileStepHandlerFactory, StepHandlerFactory};
pub use index::IndexHandler;
pub use partition::PartitionHandler;

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::identifier::ContentIdentifierError;
use crate::request::{RequestError, VectorizationRequest};
use crate::state::{ArtifactKind, VectorizationState};
use crate::steps::{ContentExtractor, EmbeddingService, IndexWriter, StepError, TextPartitioner};
use crate::store::{ResourceStore, StateStore, StoreError};
use crate::types::{IdentityToken, StepKind};

/// Message id used when a handler runs in-process rather than from a queue.
pub const IN_PROCESS_MESSAGE_ID: &str = "n/a";

/// Errors raised by step handlers.
#[derive(Debug, Error, Diagnostic)]
pub enum HandlerError {
    /// The request is malformed for this handler.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Request(#[from] RequestError),

    /// A profile or resource could not be loaded.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    /// The pluggable step implementation failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Step(#[from] StepError),

    /// The content identifier failed validation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Identifier(#[from] ContentIdentifierError),

    /// Artifact payloads could not be (de)serialized.
    #[error("artifact serialization error: {0}")]
    #[diagnostic(code(vectorline::handlers::serde))]
    Serde(#[from] serde_json::Error),

    /// A required step parameter is missing.
    #[error("step [{step}] is missing the required parameter '{parameter}'")]
    #[diagnostic(
        code(vectorline::handlers::missing_parameter),
        help("Add the parameter to the step definition or spawn requests through a pipeline.")
    )]
    MissingParameter {
        /// The step whose configuration is incomplete.
        step: StepKind,
        /// The missing parameter name.
        parameter: &'static str,
    },

    /// A predecessor step's artifacts are absent from the state record.
    #[error("step [{step}] found no {artifact:?} artifacts in the vectorization state")]
    #[diagnostic(
        code(vectorline::handlers::missing_artifacts),
        help("Steps consume their predecessor's output; check the step order of the request.")
    )]
    MissingArtifacts {
        /// The consuming step.
        step: StepKind,
        /// The absent artifact kind.
        artifact: ArtifactKind,
    },

    /// Partition and embedding artifact counts disagree.
    #[error("artifact mismatch: {partitions} partitions but {vectors} embedding vectors")]
    #[diagnostic(code(vectorline::handlers::artifact_mismatch))]
    ArtifactMismatch {
        /// Number of partition artifacts.
        partitions: usize,
        /// Number of embedding artifacts.
        vectors: usize,
    },

    /// The invocation was cancelled. Not a failure: the request stays
    /// `InProgress` and a resumed run retries the step from persisted state.
    #[error("step [{step}] was cancelled")]
    #[diagnostic(code(vectorline::handlers::cancelled))]
    Cancelled {
        /// The step that was interrupted.
        step: StepKind,
    },
}

impl HandlerError {
    /// Whether this error represents cooperative cancellation rather than a
    /// genuine failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HandlerError::Cancelled { .. })
    }
}

/// Shared services a handler needs: the two stores plus the pluggable step
/// implementations. Built once at startup and passed by `Arc`.
pub struct HandlerServices {
    pub state_store: Arc<dyn StateStore>,
    pub resource_store: Arc<dyn ResourceStore>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub partitioner: Arc<dyn TextPartitioner>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub index_writer: Arc<dyn IndexWriter>,
}

/// One pipeline step's executable unit.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step kind this handler executes.
    fn step_kind(&self) -> StepKind;

    /// The queue message id the request arrived under, or
    /// [`IN_PROCESS_MESSAGE_ID`].
    fn message_id(&self) -> &str;

    /// The step's work. Implementations must not mutate
    /// `request.processing_state`.
    async fn process(
        &self,
        request: &mut VectorizationRequest,
        state: &mut VectorizationState,
        identity: &IdentityToken,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError>;

    /// Validates, logs, and runs [`process`](Self::process).
    async fn invoke(
        &self,
        request: &mut VectorizationRequest,
        state: &mut VectorizationState,
        identity: &IdentityToken,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        let kind = self.step_kind();
        if request.step(kind).is_none() {
            return Err(RequestError::MissingStep {
                name: request.name.clone(),
                kind,
            }
            .into());
        }

        state.log_handler_start(kind, &request.name, self.message_id());
        tracing::info!(
            step = %kind,
            request = %request.name,
            message_id = %self.message_id(),
            "starting step handler"
        );

        let result = self.process(request, state, identity, cancel).await;

        match &result {
            Ok(_) => {
                state.log_handler_end(kind, &request.name, self.message_id());
                tracing::info!(
                    step = %kind,
                    request = %request.name,
                    "finished step handler"
                );
            }
            Err(err) if err.is_cancellation() => {
                state.log_entry(
                    kind,
                    &request.name,
                    self.message_id(),
                    "step cancelled; will retry on resume",
                );
                tracing::info!(step = %kind, request = %request.name, "step handler cancelled");
            }
            Err(err) => {
                state.log_handler_error(kind, &request.name, self.message_id(), err);
                request.record_error(format!(
                    "error executing the {kind} step handler for request {}: {err}",
                    request.name
                ));
                tracing::error!(
                    step = %kind,
                    request = %request.name,
                    error = %err,
                    "step handler failed"
                );
            }
        }

        result
    }
}
