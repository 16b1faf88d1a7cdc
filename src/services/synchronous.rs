//! Synchronous vectorization service: the core state machine.
//!
//! Drives one request through its full step sequence on a single logical
//! task: `New → InProgress → {Completed | Failed}`. Steps execute strictly
//! in list order; a step reporting a pending long-running operation is
//! polled on a fixed interval (the only busy-less wait in the engine).
//! Every state transition persists the request resource, which also keeps
//! the owning pipeline execution's aggregate fresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::handlers::{HandlerServices, IN_PROCESS_MESSAGE_ID, StepHandlerFactory};
use crate::request::VectorizationRequest;
use crate::state::VectorizationState;
use crate::store::ResourceStoreExt;
use crate::types::{IdentityToken, ProcessingState, VectorizationResult};

use super::{ServiceError, VectorizationService, persist_request, validate_submission};

/// Default pause between polls of a pending long-running step operation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// In-process vectorization service.
pub struct SynchronousVectorizationService<F> {
    services: Arc<HandlerServices>,
    factory: F,
    poll_interval: Duration,
}

impl<F: StepHandlerFactory> SynchronousVectorizationService<F> {
    #[must_use]
    pub fn new(services: Arc<HandlerServices>, factory: F) -> Self {
        Self {
            services,
            factory,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval (tests use a short one).
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn run(
        &self,
        request: &mut VectorizationRequest,
        identity: &IdentityToken,
        cancel: &CancellationToken,
    ) -> Result<VectorizationResult, ServiceError> {
        // Rejected requests never leave New.
        if let Err(err) =
            validate_submission(self.services.resource_store.as_ref(), request, identity).await
        {
            tracing::warn!(request = %request.name, error = %err, "request rejected");
            return Ok(VectorizationResult::failed(
                &request.object_id,
                err.to_string(),
            ));
        }

        request.processing_state = ProcessingState::InProgress;
        request.execution_start = Some(Utc::now());
        persist_request(self.services.resource_store.as_ref(), request, identity).await?;

        tracing::info!(request = %request.name, "starting synchronous processing");

        let state_key = request.content_identifier.state_key()?;
        let mut state = match self.services.state_store.read_state(&state_key).await? {
            Some(mut existing) => {
                // Resumed or retried request for content we already worked on.
                existing.current_request_id = request.name.clone();
                existing
            }
            None => VectorizationState::from_request(request),
        };

        while let Some(kind) = request.current_step() {
            tracing::info!(request = %request.name, step = %kind, "starting step");

            let Some(step) = request.step(kind).cloned() else {
                return self
                    .fail(
                        request,
                        &state,
                        identity,
                        format!("execution stopped at step [{kind}]: step definition missing"),
                    )
                    .await;
            };
            let handler = match self
                .factory
                .create(&step, IN_PROCESS_MESSAGE_ID, self.services.clone())
            {
                Ok(handler) => handler,
                Err(err) => {
                    return self
                        .fail(
                            request,
                            &state,
                            identity,
                            format!("execution stopped at step [{kind}]: {err}"),
                        )
                        .await;
                }
            };

            loop {
                if cancel.is_cancelled() {
                    return self.suspend(request, &state, identity, kind).await;
                }
                match handler.invoke(request, &mut state, identity, cancel).await {
                    Ok(true) => break,
                    Ok(false) => {
                        if request.has_incomplete_operation(kind) {
                            tokio::time::sleep(self.poll_interval).await;
                            continue;
                        }
                        // The handler made no progress and left nothing to
                        // poll; the step is stalled.
                        return self
                            .fail(
                                request,
                                &state,
                                identity,
                                format!(
                                    "execution stopped at step [{kind}]: the handler reported no progress"
                                ),
                            )
                            .await;
                    }
                    Err(err) if err.is_cancellation() => {
                        return self.suspend(request, &state, identity, kind).await;
                    }
                    Err(err) => {
                        return self
                            .fail(
                                request,
                                &state,
                                identity,
                                format!("execution stopped at step [{kind}] due to an error: {err}"),
                            )
                            .await;
                    }
                }
            }

            let transition = request.move_to_next_step();
            match transition.current {
                Some(next) => tracing::info!(
                    request = %request.name,
                    previous = %kind,
                    current = %next,
                    "pipeline advanced"
                ),
                None => tracing::info!(
                    request = %request.name,
                    previous = %kind,
                    "pipeline advanced to finalized state"
                ),
            }

            self.services.state_store.save_state(&state).await?;
            persist_request(self.services.resource_store.as_ref(), request, identity).await?;
        }

        request.processing_state = ProcessingState::Completed;
        request.execution_end = Some(Utc::now());
        persist_request(self.services.resource_store.as_ref(), request, identity).await?;
        tracing::info!(
            request = %request.name,
            "finished synchronous processing; all steps completed"
        );
        Ok(VectorizationResult::ok(&request.object_id))
    }

    /// Terminal failure path: persist state and request, return the result.
    async fn fail(
        &self,
        request: &mut VectorizationRequest,
        state: &VectorizationState,
        identity: &IdentityToken,
        message: String,
    ) -> Result<VectorizationResult, ServiceError> {
        self.services.state_store.save_state(state).await?;
        request.processing_state = ProcessingState::Failed;
        request.execution_end = Some(Utc::now());
        persist_request(self.services.resource_store.as_ref(), request, identity).await?;
        tracing::warn!(request = %request.name, message = %message, "request failed");
        Ok(VectorizationResult::failed(&request.object_id, message))
    }

    /// Cancellation path: persist progress but keep the request
    /// `InProgress` so a resumed run retries the current step.
    async fn suspend(
        &self,
        request: &mut VectorizationRequest,
        state: &VectorizationState,
        identity: &IdentityToken,
        step: crate::types::StepKind,
    ) -> Result<VectorizationResult, ServiceError> {
        self.services.state_store.save_state(state).await?;
        persist_request(self.services.resource_store.as_ref(), request, identity).await?;
        tracing::info!(
            request = %request.name,
            step = %step,
            "processing cancelled; request remains in progress"
        );
        Ok(VectorizationResult::failed(
            &request.object_id,
            format!("processing was cancelled at step [{step}]; the request remains in progress"),
        ))
    }
}

#[async_trait]
impl<F: StepHandlerFactory> VectorizationService for SynchronousVectorizationService<F> {
    #[instrument(skip(self, request, identity, cancel), fields(request = %request.name))]
    async fn process_request(
        &self,
        mut request: VectorizationRequest,
        identity: &IdentityToken,
        cancel: CancellationToken,
    ) -> VectorizationResult {
        match self.run(&mut request, identity, &cancel).await {
            Ok(result) => result,
            Err(err) => {
                // Infrastructure failure (store/queue). Best effort: mark
                // the request failed so it is queryable; if even that write
                // fails there is nothing further to do.
                tracing::error!(request = %request.name, error = %err, "processing error");
                request.processing_state = ProcessingState::Failed;
                request.execution_end = Some(Utc::now());
                let _ = self
                    .services
                    .resource_store
                    .upsert_typed(&request.object_id, &request, identity)
                    .await;
                VectorizationResult::failed(&request.object_id, err.to_string())
            }
        }
    }
}
