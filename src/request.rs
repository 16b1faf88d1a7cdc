//! Vectorization requests: the unit of work moving through the pipeline.
//!
//! A [`VectorizationRequest`] names the content to vectorize, the ordered
//! steps to run, and the cursor tracking how far execution has advanced.
//! Requests are persisted to the resource store after every state transition
//! and are never deleted by this subsystem.
//!
//! # Cursor semantics
//!
//! The step cursor is represented as two lists: `completed_steps` and
//! `remaining_steps`. The current step is always the head of
//! `remaining_steps`; the request is complete once that list is empty.
//! [`VectorizationRequest::move_to_next_step`] advances the cursor and is a
//! no-op on an already-complete request — it never moves past terminal.
//!
//! # Examples
//!
//! ```rust
//! use vectorline::identifier::ContentIdentifier;
//! use vectorline::request::{VectorizationRequest, VectorizationStep};
//! use vectorline::types::{ProcessingType, StepKind};
//!
//! let request = VectorizationRequest::new(
//!     ContentIdentifier::new("docs", vec!["a".into(), "b.txt".into()], "a/b.txt"),
//!     ProcessingType::Synchronous,
//!     vec![
//!         VectorizationStep::new(StepKind::Extract),
//!         VectorizationStep::new(StepKind::Partition),
//!     ],
//! );
//! assert_eq!(request.current_step(), Some(StepKind::Extract));
//! assert!(!request.complete());
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::identifier::{ContentIdentifier, ContentIdentifierError};
use crate::store::paths;
use crate::types::{ProcessingState, ProcessingType, StepKind};

/// Hours without a successful step execution after which a request is
/// considered expired and discarded by queue workers.
const EXPIRY_HOURS: i64 = 240;

/// Errors raised by request validation and cursor operations.
#[derive(Debug, Error, Diagnostic)]
pub enum RequestError {
    /// The request declares no steps.
    #[error("the list of vectorization steps must not be empty")]
    #[diagnostic(code(vectorline::request::empty_steps))]
    EmptySteps,

    /// The same step kind appears more than once.
    #[error("duplicate step [{kind}] in the vectorization request")]
    #[diagnostic(
        code(vectorline::request::duplicate_step),
        help("Each step kind may appear at most once per request.")
    )]
    DuplicateStep {
        /// The repeated step kind.
        kind: StepKind,
    },

    /// A freshly submitted request already carries completed steps.
    #[error("the completed steps of a new vectorization request must be empty")]
    #[diagnostic(code(vectorline::request::completed_not_empty))]
    CompletedNotEmpty,

    /// The remaining-step list does not mirror the declared steps.
    #[error("the remaining steps must match the declared steps of a new request")]
    #[diagnostic(code(vectorline::request::remaining_mismatch))]
    RemainingMismatch,

    /// A handler was asked to process a step the request does not contain.
    #[error("request {name} does not contain a step with id [{kind}]")]
    #[diagnostic(code(vectorline::request::missing_step))]
    MissingStep {
        /// The request name.
        name: String,
        /// The absent step kind.
        kind: StepKind,
    },

    /// Rollback was requested but no step has completed yet.
    #[error("the list of completed steps is empty")]
    #[diagnostic(code(vectorline::request::nothing_to_rollback))]
    NothingToRollback,

    /// The content identifier failed validation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    ContentIdentifier(#[from] ContentIdentifierError),
}

/// One step of a vectorization request: a kind plus its raw parameters.
///
/// Parameters are carried as strings on the wire and parsed into typed
/// settings at handler construction time; nothing downstream of the handler
/// factory inspects this map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationStep {
    /// The step kind; unique within one request.
    pub id: StepKind,
    /// Named parameters configuring the step's handler.
    #[serde(default)]
    pub parameters: FxHashMap<String, String>,
}

impl VectorizationStep {
    pub fn new(id: StepKind) -> Self {
        Self {
            id,
            parameters: FxHashMap::default(),
        }
    }

    /// Attach a named parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Bookkeeping for a long-running external operation started by a step.
///
/// While `complete` is false the owning step is polled instead of being
/// re-invoked from scratch, which de-duplicates work under at-least-once
/// queue delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningOperation {
    /// Identifier assigned by the external service.
    pub operation_id: String,
    /// Whether the external operation has finished.
    pub complete: bool,
    /// When the operation was first observed.
    pub started_at: DateTime<Utc>,
}

/// Result of advancing the step cursor.
///
/// `current` is `None` once the request has no steps left; a transition with
/// both fields `None` means the cursor was already at the end and nothing
/// moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepTransition {
    /// The step that just completed, if any.
    pub previous: Option<StepKind>,
    /// The step now at the head of the remaining list, if any.
    pub current: Option<StepKind>,
}

/// A vectorization request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorizationRequest {
    /// Stable unique name, assigned at creation.
    pub name: String,
    /// Resource path under which the request is persisted.
    pub object_id: String,
    /// The content being vectorized.
    pub content_identifier: ContentIdentifier,
    /// How the request is processed; immutable after creation.
    pub processing_type: ProcessingType,
    /// Resource path of the owning pipeline, when spawned by one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_object_id: Option<String>,
    /// Execution id within the owning pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_execution_id: Option<String>,
    /// Lifecycle state.
    #[serde(default)]
    pub processing_state: ProcessingState,
    /// Set on the transition into `InProgress`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_start: Option<DateTime<Utc>>,
    /// Set on the transition into a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_end: Option<DateTime<Utc>>,
    /// Messages recorded for failed handler invocations.
    #[serde(default)]
    pub error_messages: Vec<String>,
    /// The declared steps, in execution order.
    pub steps: Vec<VectorizationStep>,
    /// Kinds of the steps already completed, in completion order.
    #[serde(default)]
    pub completed_steps: Vec<StepKind>,
    /// Kinds of the steps still to execute, in execution order.
    #[serde(default)]
    pub remaining_steps: Vec<StepKind>,
    /// Consecutive handler errors for the current step.
    #[serde(default)]
    pub error_count: u32,
    /// In-flight long-running operations, keyed by step kind.
    #[serde(default)]
    pub running_operations: FxHashMap<StepKind, RunningOperation>,
    /// Last time a step completed successfully; drives expiry.
    pub last_successful_step_time: DateTime<Utc>,
}

impl VectorizationRequest {
    /// Creates a new request in the `New` state with a fresh unique name.
    ///
    /// The remaining-step list is initialized from `steps`, so the request
    /// passes [`validate_for_submission`](Self::validate_for_submission)
    /// provided the steps themselves are well-formed.
    pub fn new(
        content_identifier: ContentIdentifier,
        processing_type: ProcessingType,
        steps: Vec<VectorizationStep>,
    ) -> Self {
        let name = Uuid::new_v4().to_string();
        let remaining_steps = steps.iter().map(|s| s.id).collect();
        Self {
            object_id: paths::request_resource(&name),
            name,
            content_identifier,
            processing_type,
            pipeline_object_id: None,
            pipeline_execution_id: None,
            processing_state: ProcessingState::New,
            execution_start: None,
            execution_end: None,
            error_messages: Vec::new(),
            steps,
            completed_steps: Vec::new(),
            remaining_steps,
            error_count: 0,
            running_operations: FxHashMap::default(),
            last_successful_step_time: Utc::now(),
        }
    }

    /// Links the request to the pipeline execution that spawned it.
    #[must_use]
    pub fn with_pipeline(
        mut self,
        pipeline_object_id: impl Into<String>,
        pipeline_execution_id: impl Into<String>,
    ) -> Self {
        self.pipeline_object_id = Some(pipeline_object_id.into());
        self.pipeline_execution_id = Some(pipeline_execution_id.into());
        self
    }

    /// The step currently awaiting execution, if any.
    #[must_use]
    pub fn current_step(&self) -> Option<StepKind> {
        self.remaining_steps.first().copied()
    }

    /// The most recently completed step, if any.
    #[must_use]
    pub fn previous_step(&self) -> Option<StepKind> {
        self.completed_steps.last().copied()
    }

    /// True once every declared step has completed.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.remaining_steps.is_empty()
    }

    /// The step definition for a kind, if the request contains it.
    #[must_use]
    pub fn step(&self, kind: StepKind) -> Option<&VectorizationStep> {
        self.steps.iter().find(|s| s.id == kind)
    }

    /// Advances the pipeline cursor to the next step.
    ///
    /// Returns the previous and new current step. On an already-complete
    /// request this is a no-op returning an empty transition; the cursor
    /// never moves past terminal.
    pub fn move_to_next_step(&mut self) -> StepTransition {
        let Some(previous) = self.remaining_steps.first().copied() else {
            return StepTransition {
                previous: None,
                current: None,
            };
        };
        self.remaining_steps.remove(0);
        self.completed_steps.push(previous);
        self.last_successful_step_time = Utc::now();
        StepTransition {
            previous: Some(previous),
            current: self.remaining_steps.first().copied(),
        }
    }

    /// Reverts the cursor to the previous step, returning the step that must
    /// be re-executed. Used by retry tooling to redo a completed step.
    pub fn rollback_to_previous_step(&mut self) -> Result<StepKind, RequestError> {
        let kind = self
            .completed_steps
            .pop()
            .ok_or(RequestError::NothingToRollback)?;
        self.remaining_steps.insert(0, kind);
        Ok(kind)
    }

    /// The running operation recorded for a step, if any.
    #[must_use]
    pub fn running_operation(&self, kind: StepKind) -> Option<&RunningOperation> {
        self.running_operations.get(&kind)
    }

    /// True while a step has a recorded operation that has not finished.
    #[must_use]
    pub fn has_incomplete_operation(&self, kind: StepKind) -> bool {
        self.running_operations
            .get(&kind)
            .is_some_and(|op| !op.complete)
    }

    /// Records or refreshes the long-running operation for a step.
    pub fn record_running_operation(
        &mut self,
        kind: StepKind,
        operation_id: impl Into<String>,
        complete: bool,
    ) {
        let operation_id = operation_id.into();
        match self.running_operations.get_mut(&kind) {
            Some(op) => {
                op.operation_id = operation_id;
                op.complete = complete;
            }
            None => {
                self.running_operations.insert(
                    kind,
                    RunningOperation {
                        operation_id,
                        complete,
                        started_at: Utc::now(),
                    },
                );
            }
        }
    }

    /// Appends an error message and bumps the consecutive error counter.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.error_messages.push(message.into());
    }

    /// Whether the request has gone stale: no successful step execution
    /// within the expiry window.
    #[must_use]
    pub fn expired(&self) -> bool {
        Utc::now() - self.last_successful_step_time > TimeDelta::hours(EXPIRY_HOURS)
    }

    /// Validates a request about to enter processing.
    ///
    /// Rejected requests never transition out of `New`. Checks: non-empty
    /// steps, unique step kinds, empty completed list, remaining steps
    /// mirroring the declared steps, and a well-formed content identifier.
    pub fn validate_for_submission(&self) -> Result<(), RequestError> {
        if self.steps.is_empty() {
            return Err(RequestError::EmptySteps);
        }
        let mut seen: Vec<StepKind> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if seen.contains(&step.id) {
                return Err(RequestError::DuplicateStep { kind: step.id });
            }
            seen.push(step.id);
        }
        if !self.completed_steps.is_empty() {
            return Err(RequestError::CompletedNotEmpty);
        }
        if self.remaining_steps != seen {
            return Err(RequestError::RemainingMismatch);
        }
        if self.content_identifier.unique_id().trim().is_empty() {
            return Err(ContentIdentifierError::InvalidMultipartId {
                expected: 1,
                found: 0,
            }
            .into());
        }
        // A blank canonical id would leave the state record unaddressable.
        self.content_identifier.state_key()?;
        Ok(())
    }
}
