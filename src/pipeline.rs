//! Pipelines: triggerable definitions that spawn batches of requests, and
//! the execution records aggregating their outcomes.
//!
//! A [`VectorizationPipeline`] names the profiles its requests will use and
//! how it is triggered. Each run produces a [`PipelineExecution`] that tracks
//! the spawned requests and derives a single pipeline-level
//! [`ProcessingState`] from their individual states.
//!
//! The derivation is a pure function of the constituent request states
//! (see [`PipelineExecution::derive_processing_state`]); only the terminal
//! timestamp carries extra bookkeeping — it is written exactly once.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::VectorizationStep;
use crate::store::paths;
use crate::types::{ProcessingState, ProcessingType, StepKind};

/// How a pipeline is started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PipelineTrigger {
    /// Started explicitly through the API.
    Manual,
    /// Started on a cron schedule by the host.
    Schedule {
        /// Cron expression, interpreted by the host scheduler.
        cron_schedule: String,
    },
    /// Started when the content source reports new or changed content.
    ContentEvent,
}

/// A named, triggerable vectorization pipeline definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationPipeline {
    /// Pipeline name; unique within the resource store.
    pub name: String,
    /// Resource path under which the pipeline is persisted.
    pub object_id: String,
    /// Inactive pipelines are skipped by triggers.
    pub active: bool,
    /// How the pipeline is started.
    pub trigger: PipelineTrigger,
    /// Content source profile used by spawned requests.
    pub content_source_profile_name: String,
    /// Partitioning profile used by spawned requests.
    pub text_partitioning_profile_name: String,
    /// Embedding profile used by spawned requests.
    pub text_embedding_profile_name: String,
    /// Indexing profile used by spawned requests.
    pub indexing_profile_name: String,
    /// Processing mode for spawned requests.
    pub processing_type: ProcessingType,
}

impl VectorizationPipeline {
    pub fn new(
        name: impl Into<String>,
        trigger: PipelineTrigger,
        content_source_profile_name: impl Into<String>,
        text_partitioning_profile_name: impl Into<String>,
        text_embedding_profile_name: impl Into<String>,
        indexing_profile_name: impl Into<String>,
        processing_type: ProcessingType,
    ) -> Self {
        let name = name.into();
        Self {
            object_id: paths::pipeline_resource(&name),
            name,
            active: true,
            trigger,
            content_source_profile_name: content_source_profile_name.into(),
            text_partitioning_profile_name: text_partitioning_profile_name.into(),
            text_embedding_profile_name: text_embedding_profile_name.into(),
            indexing_profile_name: indexing_profile_name.into(),
            processing_type,
        }
    }

    /// The full step list spawned requests carry, wired to this pipeline's
    /// profiles.
    #[must_use]
    pub fn steps(&self) -> Vec<VectorizationStep> {
        vec![
            VectorizationStep::new(StepKind::Extract).with_parameter(
                "content_source_profile_name",
                self.content_source_profile_name.clone(),
            ),
            VectorizationStep::new(StepKind::Partition).with_parameter(
                "text_partitioning_profile_name",
                self.text_partitioning_profile_name.clone(),
            ),
            VectorizationStep::new(StepKind::Embed).with_parameter(
                "text_embedding_profile_name",
                self.text_embedding_profile_name.clone(),
            ),
            VectorizationStep::new(StepKind::Index)
                .with_parameter("indexing_profile_name", self.indexing_profile_name.clone()),
        ]
    }
}

/// One run of a pipeline, aggregating the states of its spawned requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineExecution {
    /// Name of the pipeline that was run.
    pub pipeline_name: String,
    /// Resource path of the pipeline definition.
    pub pipeline_object_id: String,
    /// Unique id of this execution.
    pub execution_id: String,
    /// Resource path under which this execution is persisted.
    pub object_id: String,
    /// Resource paths of the requests spawned by this execution.
    #[serde(default)]
    pub vectorization_request_object_ids: Vec<String>,
    /// Last observed state per spawned request.
    #[serde(default)]
    pub vectorization_request_statuses: FxHashMap<String, ProcessingState>,
    /// Derived pipeline-level state.
    #[serde(default)]
    pub processing_state: ProcessingState,
    /// Set when the execution first leaves `New`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_start: Option<DateTime<Utc>>,
    /// Set exactly once, when the execution reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_end: Option<DateTime<Utc>>,
}

impl PipelineExecution {
    /// Starts a new execution record for a pipeline.
    #[must_use]
    pub fn new(pipeline: &VectorizationPipeline) -> Self {
        let execution_id = Uuid::new_v4().to_string();
        Self {
            pipeline_name: pipeline.name.clone(),
            pipeline_object_id: pipeline.object_id.clone(),
            object_id: paths::pipeline_execution_resource(&pipeline.name, &execution_id),
            execution_id,
            vectorization_request_object_ids: Vec::new(),
            vectorization_request_statuses: FxHashMap::default(),
            processing_state: ProcessingState::New,
            execution_start: None,
            execution_end: None,
        }
    }

    /// Registers a spawned request with the execution.
    pub fn register_request(&mut self, request_object_id: impl Into<String>) {
        let request_object_id = request_object_id.into();
        self.vectorization_request_statuses
            .entry(request_object_id.clone())
            .or_insert(ProcessingState::New);
        if !self
            .vectorization_request_object_ids
            .contains(&request_object_id)
        {
            self.vectorization_request_object_ids.push(request_object_id);
        }
    }

    /// Derives the pipeline-level state from constituent request states.
    ///
    /// `New` until at least one request has left `New` (including when the
    /// execution has no requests at all); `InProgress` while any request is
    /// in progress or still pending behind completed ones; `Completed` iff
    /// all completed; `Failed` iff none in progress and at least one failed.
    #[must_use]
    pub fn derive_processing_state<'a, I>(statuses: I) -> ProcessingState
    where
        I: IntoIterator<Item = &'a ProcessingState>,
    {
        let mut total = 0usize;
        let mut new = 0usize;
        let mut in_progress = 0usize;
        let mut completed = 0usize;
        let mut failed = 0usize;
        for status in statuses {
            total += 1;
            match status {
                ProcessingState::New => new += 1,
                ProcessingState::InProgress => in_progress += 1,
                ProcessingState::Completed => completed += 1,
                ProcessingState::Failed => failed += 1,
            }
        }

        if total == 0 || new == total {
            ProcessingState::New
        } else if in_progress > 0 {
            ProcessingState::InProgress
        } else if failed > 0 {
            ProcessingState::Failed
        } else if completed == total {
            ProcessingState::Completed
        } else {
            // Some requests finished while others have not started.
            ProcessingState::InProgress
        }
    }

    /// Records a request's latest state and recomputes the aggregate.
    ///
    /// Once the execution is terminal the record is append-only: further
    /// updates are ignored. The terminal timestamp is written exactly once.
    pub fn record_request_status(
        &mut self,
        request_object_id: impl Into<String>,
        state: ProcessingState,
    ) {
        if self.processing_state.is_terminal() {
            return;
        }
        let request_object_id = request_object_id.into();
        if !self
            .vectorization_request_object_ids
            .contains(&request_object_id)
        {
            self.vectorization_request_object_ids
                .push(request_object_id.clone());
        }
        self.vectorization_request_statuses
            .insert(request_object_id, state);
        self.recompute();
    }

    /// Recomputes the derived state and maintains the two timestamps.
    pub fn recompute(&mut self) {
        if self.processing_state.is_terminal() {
            return;
        }
        let derived =
            Self::derive_processing_state(self.vectorization_request_statuses.values());
        if self.processing_state == ProcessingState::New && derived != ProcessingState::New {
            self.execution_start = Some(Utc::now());
        }
        if derived.is_terminal() && self.execution_end.is_none() {
            self.execution_end = Some(Utc::now());
        }
        self.processing_state = derived;
    }
}
