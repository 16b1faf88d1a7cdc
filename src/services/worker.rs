//! Queue-driven step workers for asynchronous processing.
//!
//! One [`StepWorker`] runs per step kind. Each worker polls its request
//! source, invokes the matching step handler for every received request,
//! and on completion acknowledges the message and submits the request to
//! the *next* step's source (or finalizes it after the last step).
//!
//! # Delivery semantics
//!
//! Hand-off is at-least-once: the incoming message is deleted only after
//! the handler reports completion, so a crash between handling and
//! acknowledgment re-delivers a finished step. That is safe because
//! handlers are idempotent over persisted state and long-running work is
//! de-duplicated through the request's running-operation bookkeeping.
//!
//! A request whose handler keeps failing is retried until its consecutive
//! error count exceeds the configured maximum, then marked `Failed`,
//! acknowledged, and recorded in the execution log. Expired requests are
//! discarded the same way.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::handlers::{HandlerServices, StepHandlerFactory};
use crate::request::VectorizationRequest;
use crate::sources::{ReceivedRequest, RequestSource, RequestSources, SourceConfigError};
use crate::state::VectorizationState;
use crate::types::{IdentityToken, ProcessingState, StepKind};

use super::{ServiceError, persist_request};

/// Settings for one step worker.
#[derive(Clone, Debug)]
pub struct StepWorkerSettings {
    /// The step kind this worker serves.
    pub step: StepKind,
    /// Maximum number of requests handled concurrently.
    pub max_handler_instances: usize,
    /// Consecutive handler errors tolerated before giving up on a request.
    pub max_retries: u32,
    /// Pause between polls of an empty source.
    pub queue_polling_interval: Duration,
    /// Pause between receive batches while the source has work.
    pub queue_processing_pace: Duration,
}

impl StepWorkerSettings {
    #[must_use]
    pub fn new(step: StepKind) -> Self {
        Self {
            step,
            max_handler_instances: 4,
            max_retries: 5,
            queue_polling_interval: Duration::from_secs(5),
            queue_processing_pace: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_max_handler_instances(mut self, max_handler_instances: usize) -> Self {
        self.max_handler_instances = max_handler_instances.max(1);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_queue_polling_interval(mut self, interval: Duration) -> Self {
        self.queue_polling_interval = interval;
        self
    }

    #[must_use]
    pub fn with_queue_processing_pace(mut self, pace: Duration) -> Self {
        self.queue_processing_pace = pace;
        self
    }

    /// One worker settings entry per step kind, in canonical order.
    #[must_use]
    pub fn for_all_steps() -> Vec<Self> {
        StepKind::ALL.into_iter().map(Self::new).collect()
    }
}

/// Configuration errors raised while building or starting workers.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkerError {
    /// No worker settings were provided.
    #[error("cannot build a worker host without worker settings")]
    #[diagnostic(code(vectorline::worker::missing_settings))]
    MissingSettings,

    /// Two settings entries name the same step kind.
    #[error("duplicate worker for step [{step}]")]
    #[diagnostic(code(vectorline::worker::duplicate_worker))]
    DuplicateWorker {
        /// The repeated step kind.
        step: StepKind,
    },

    /// A required collaborator was not supplied to the builder.
    #[error("the worker host builder is missing {what}")]
    #[diagnostic(code(vectorline::worker::missing_collaborator))]
    MissingCollaborator {
        /// Which collaborator is absent.
        what: &'static str,
    },

    /// The request source cache has no source for a configured worker.
    #[error(transparent)]
    #[diagnostic(transparent)]
    SourceConfig(#[from] SourceConfigError),
}

/// A queue-driven worker for one step kind.
pub struct StepWorker<F> {
    settings: StepWorkerSettings,
    sources: Arc<RequestSources>,
    services: Arc<HandlerServices>,
    factory: Arc<F>,
    cancel: CancellationToken,
}

impl<F: StepHandlerFactory + 'static> StepWorker<F> {
    #[must_use]
    pub fn new(
        settings: StepWorkerSettings,
        sources: Arc<RequestSources>,
        services: Arc<HandlerServices>,
        factory: Arc<F>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            sources,
            services,
            factory,
            cancel,
        }
    }

    /// Runs the worker loop until the cancellation token fires, then drains
    /// in-flight handler tasks.
    #[instrument(skip(self), fields(step = %self.settings.step))]
    pub async fn run(self) -> Result<(), WorkerError> {
        let source = self.sources.require(self.settings.step)?;
        let ctx = Arc::new(WorkerContext {
            settings: self.settings.clone(),
            sources: self.sources.clone(),
            services: self.services.clone(),
            factory: self.factory.clone(),
            source: source.clone(),
            cancel: self.cancel.clone(),
            identity: IdentityToken::service(),
        });

        tracing::info!(source = %source.source_name(), "step worker started");

        let mut tasks: JoinSet<()> = JoinSet::new();
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            while tasks.try_join_next().is_some() {}

            let capacity = self
                .settings
                .max_handler_instances
                .saturating_sub(tasks.len());
            if capacity == 0 {
                tokio::time::sleep(self.settings.queue_processing_pace).await;
                continue;
            }

            match source.has_requests().await {
                Ok(true) => match source.receive_requests(capacity).await {
                    Ok(received) => {
                        for envelope in received {
                            let ctx = ctx.clone();
                            tasks.spawn(async move { ctx.process(envelope).await });
                        }
                        // Pace retrieval so one worker does not monopolize
                        // the source.
                        tokio::time::sleep(self.settings.queue_processing_pace).await;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "error receiving requests");
                        tokio::time::sleep(self.settings.queue_polling_interval).await;
                    }
                },
                Ok(false) => {
                    tokio::time::sleep(self.settings.queue_polling_interval).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "error polling request source");
                    tokio::time::sleep(self.settings.queue_polling_interval).await;
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        tracing::info!("step worker stopped");
        Ok(())
    }
}

struct WorkerContext<F> {
    settings: StepWorkerSettings,
    sources: Arc<RequestSources>,
    services: Arc<HandlerServices>,
    factory: Arc<F>,
    source: Arc<dyn RequestSource>,
    cancel: CancellationToken,
    identity: IdentityToken,
}

impl<F: StepHandlerFactory> WorkerContext<F> {
    /// Processes one received request; failures are logged, never
    /// propagated, so the worker loop keeps running.
    async fn process(&self, received: ReceivedRequest) {
        let request_name = received.request.name.clone();
        if let Err(err) = self.process_inner(received).await {
            tracing::error!(
                step = %self.settings.step,
                request = %request_name,
                error = %err,
                "error processing request"
            );
        }
    }

    async fn process_inner(&self, received: ReceivedRequest) -> Result<(), ServiceError> {
        let ReceivedRequest {
            mut request,
            message_id,
            pop_receipt,
            dequeue_count,
        } = received;

        if request.expired() {
            let reason = format!(
                "request {} expired (last successful step at {}) and will be discarded",
                request.name, request.last_successful_step_time
            );
            return self
                .give_up(&mut request, &message_id, &pop_receipt, reason)
                .await;
        }
        if request.error_count > self.settings.max_retries {
            let reason = format!(
                "request {} encountered {} consecutive errors and will be discarded",
                request.name, request.error_count
            );
            return self
                .give_up(&mut request, &message_id, &pop_receipt, reason)
                .await;
        }

        // First worker contact moves the request out of New.
        if request.processing_state == ProcessingState::New {
            request.processing_state = ProcessingState::InProgress;
            request.execution_start = Some(Utc::now());
            persist_request(self.services.resource_store.as_ref(), &request, &self.identity)
                .await?;
        }

        let mut state = self.load_state(&request).await?;

        let Some(step) = request.step(self.settings.step).cloned() else {
            let reason = format!(
                "request {} does not contain a step with id [{}]",
                request.name, self.settings.step
            );
            return self
                .give_up(&mut request, &message_id, &pop_receipt, reason)
                .await;
        };

        let handler = match self
            .factory
            .create(&step, &message_id, self.services.clone())
        {
            Ok(handler) => handler,
            Err(err) => {
                request.record_error(format!(
                    "could not create the {} step handler: {err}",
                    self.settings.step
                ));
                return self
                    .retry_or_give_up(&mut request, &state, &message_id, &pop_receipt)
                    .await;
            }
        };

        tracing::debug!(
            step = %self.settings.step,
            request = %request.name,
            dequeue_count,
            "handling request"
        );

        match handler
            .invoke(&mut request, &mut state, &self.identity, &self.cancel)
            .await
        {
            Ok(true) => {
                self.services.state_store.save_state(&state).await?;
                // Acknowledge only after the step completed: at-least-once.
                self.source.delete_request(&message_id, &pop_receipt).await?;
                self.advance(&mut request).await
            }
            Ok(false) => {
                // Long-running operation pending; persist bookkeeping and
                // make the message deliverable for the next poll.
                self.services.state_store.save_state(&state).await?;
                self.source
                    .update_request(&message_id, &pop_receipt, &request)
                    .await?;
                persist_request(self.services.resource_store.as_ref(), &request, &self.identity)
                    .await
            }
            Err(err) if err.is_cancellation() => {
                // Not a failure: leave the request in progress for resume.
                self.services.state_store.save_state(&state).await?;
                self.source
                    .update_request(&message_id, &pop_receipt, &request)
                    .await?;
                Ok(())
            }
            Err(_) => {
                // The handler already recorded the error on the request and
                // in the state log.
                self.retry_or_give_up(&mut request, &state, &message_id, &pop_receipt)
                    .await
            }
        }
    }

    async fn load_state(
        &self,
        request: &VectorizationRequest,
    ) -> Result<VectorizationState, ServiceError> {
        let state_key = request.content_identifier.state_key()?;
        match self.services.state_store.read_state(&state_key).await? {
            Some(mut state) => {
                state.current_request_id = request.name.clone();
                Ok(state)
            }
            None => Ok(VectorizationState::from_request(request)),
        }
    }

    /// Completion hand-off: submit to the next step's source, or finalize.
    async fn advance(&self, request: &mut VectorizationRequest) -> Result<(), ServiceError> {
        let transition = request.move_to_next_step();
        match transition.current {
            Some(next) => {
                let next_source = self.sources.require(next)?;
                next_source.submit_request(request).await?;
                tracing::info!(
                    request = %request.name,
                    previous = %self.settings.step,
                    current = %next,
                    "pipeline advanced"
                );
                persist_request(self.services.resource_store.as_ref(), request, &self.identity)
                    .await
            }
            None => {
                request.processing_state = ProcessingState::Completed;
                request.execution_end = Some(Utc::now());
                persist_request(self.services.resource_store.as_ref(), request, &self.identity)
                    .await?;
                tracing::info!(
                    request = %request.name,
                    previous = %self.settings.step,
                    "pipeline advanced to finalized state"
                );
                Ok(())
            }
        }
    }

    /// Redeliver for another attempt, or give up once retries are spent.
    async fn retry_or_give_up(
        &self,
        request: &mut VectorizationRequest,
        state: &VectorizationState,
        message_id: &str,
        pop_receipt: &str,
    ) -> Result<(), ServiceError> {
        self.services.state_store.save_state(state).await?;
        if request.error_count > self.settings.max_retries {
            let reason = format!(
                "request {} encountered {} consecutive errors and will be discarded",
                request.name, request.error_count
            );
            self.give_up(request, message_id, pop_receipt, reason).await
        } else {
            self.source
                .update_request(message_id, pop_receipt, request)
                .await?;
            persist_request(self.services.resource_store.as_ref(), request, &self.identity).await
        }
    }

    /// Terminal path for poisoned or expired requests: log, acknowledge,
    /// mark failed.
    async fn give_up(
        &self,
        request: &mut VectorizationRequest,
        message_id: &str,
        pop_receipt: &str,
        reason: String,
    ) -> Result<(), ServiceError> {
        tracing::warn!(
            step = %self.settings.step,
            request = %request.name,
            reason = %reason,
            "giving up on request"
        );

        let mut state = self.load_state(request).await?;
        let step = request.current_step().unwrap_or(self.settings.step);
        state.log_entry(step, &request.name, message_id, reason.clone());
        self.services.state_store.save_state(&state).await?;

        self.source.delete_request(message_id, pop_receipt).await?;

        request.processing_state = ProcessingState::Failed;
        request.execution_end = Some(Utc::now());
        request.error_messages.push(reason);
        persist_request(self.services.resource_store.as_ref(), request, &self.identity).await
    }
}

/// Builder for a host running one worker per configured step kind.
///
/// Validates its configuration eagerly: missing collaborators, duplicate
/// workers, and workers without a matching request source all fail at
/// build time.
pub struct WorkerHostBuilder<F> {
    settings: Vec<StepWorkerSettings>,
    sources: Option<Arc<RequestSources>>,
    services: Option<Arc<HandlerServices>>,
    factory: Option<Arc<F>>,
    cancel: CancellationToken,
}

impl<F: StepHandlerFactory + 'static> WorkerHostBuilder<F> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: Vec::new(),
            sources: None,
            services: None,
            factory: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Vec<StepWorkerSettings>) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Arc<RequestSources>) -> Self {
        self.sources = Some(sources);
        self
    }

    #[must_use]
    pub fn with_services(mut self, services: Arc<HandlerServices>) -> Self {
        self.services = Some(services);
        self
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Arc<F>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Token that stops every worker in the host.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<WorkerHost<F>, WorkerError> {
        if self.settings.is_empty() {
            return Err(WorkerError::MissingSettings);
        }
        let mut seen: Vec<StepKind> = Vec::with_capacity(self.settings.len());
        for entry in &self.settings {
            if seen.contains(&entry.step) {
                return Err(WorkerError::DuplicateWorker { step: entry.step });
            }
            seen.push(entry.step);
        }

        let sources = self
            .sources
            .ok_or(WorkerError::MissingCollaborator {
                what: "request sources",
            })?;
        let services = self.services.ok_or(WorkerError::MissingCollaborator {
            what: "handler services",
        })?;
        let factory = self.factory.ok_or(WorkerError::MissingCollaborator {
            what: "a step handler factory",
        })?;

        let mut workers = Vec::with_capacity(self.settings.len());
        for entry in self.settings {
            // Fail fast if a worker has no queue to read from.
            sources.require(entry.step)?;
            workers.push(StepWorker::new(
                entry,
                sources.clone(),
                services.clone(),
                factory.clone(),
                self.cancel.clone(),
            ));
        }
        Ok(WorkerHost { workers })
    }
}

impl<F: StepHandlerFactory + 'static> Default for WorkerHostBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// A set of step workers ready to run.
pub struct WorkerHost<F> {
    workers: Vec<StepWorker<F>>,
}

impl<F> std::fmt::Debug for WorkerHost<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHost")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl<F: StepHandlerFactory + 'static> WorkerHost<F> {
    /// Spawns every worker onto the current runtime.
    pub fn spawn(self) -> Vec<tokio::task::JoinHandle<Result<(), WorkerError>>> {
        self.workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run()))
            .collect()
    }
}
