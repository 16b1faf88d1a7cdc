//! Core types for the vectorline pipeline engine.
//!
//! This module defines the fundamental vocabulary shared by every other
//! module: the fixed set of pipeline step kinds, the request lifecycle
//! states, and the processing-mode selector that routes a request to the
//! synchronous or asynchronous service.
//!
//! # Key Types
//!
//! - [`StepKind`]: The fixed vocabulary of pipeline steps (extract,
//!   partition, embed, index)
//! - [`ProcessingState`]: Request and pipeline lifecycle states
//! - [`ProcessingType`]: Synchronous vs. asynchronous execution
//! - [`VectorizationResult`]: The structured outcome callers branch on
//!
//! # Examples
//!
//! ```rust
//! use vectorline::types::{ProcessingState, StepKind};
//!
//! let kind = StepKind::Embed;
//! assert_eq!(kind.encode(), "embed");
//! assert_eq!(StepKind::decode("embed"), Some(StepKind::Embed));
//!
//! assert!(!ProcessingState::InProgress.is_terminal());
//! assert!(ProcessingState::Failed.is_terminal());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// Identifies one step kind in the vectorization pipeline.
///
/// Step kinds form a fixed, known vocabulary. Within a single request each
/// kind may appear at most once, and the declared order is the execution
/// order. The kind also names the request source (queue) that holds requests
/// waiting to enter that step in asynchronous mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Read the source content and produce raw text.
    Extract,
    /// Split extracted text into partitions (chunks).
    Partition,
    /// Produce an embedding vector per partition.
    Embed,
    /// Write embeddings into a vector index.
    Index,
}

impl StepKind {
    /// Every step kind, in canonical pipeline order.
    pub const ALL: [StepKind; 4] = [
        StepKind::Extract,
        StepKind::Partition,
        StepKind::Embed,
        StepKind::Index,
    ];

    /// Encode a step kind into its persisted string form.
    ///
    /// The encoding doubles as the request source (queue) name for the step.
    #[must_use]
    pub fn encode(self) -> &'static str {
        match self {
            StepKind::Extract => "extract",
            StepKind::Partition => "partition",
            StepKind::Embed => "embed",
            StepKind::Index => "index",
        }
    }

    /// Decode a persisted string form back into a step kind.
    ///
    /// Returns `None` for unknown names; the step vocabulary is closed, so
    /// unknown names are configuration errors rather than custom steps.
    #[must_use]
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "extract" => Some(StepKind::Extract),
            "partition" => Some(StepKind::Partition),
            "embed" => Some(StepKind::Embed),
            "index" => Some(StepKind::Index),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

impl std::str::FromStr for StepKind {
    type Err = UnknownStepKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::decode(s).ok_or_else(|| UnknownStepKind {
            name: s.to_string(),
        })
    }
}

/// Error raised when a persisted or configured step name is not part of the
/// step vocabulary.
#[derive(Debug, Error, Diagnostic)]
#[error("unknown step kind: {name}")]
#[diagnostic(
    code(vectorline::types::unknown_step_kind),
    help("Valid step kinds are: extract, partition, embed, index.")
)]
pub struct UnknownStepKind {
    /// The offending name.
    pub name: String,
}

/// Lifecycle state of a vectorization request or pipeline execution.
///
/// Transitions are monotonic: `New → InProgress → {Completed | Failed}`.
/// `Completed` and `Failed` are terminal; no further processing may move a
/// record out of them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Created but not yet picked up by a service.
    #[default]
    New,
    /// At least one step has started and no terminal state has been reached.
    InProgress,
    /// Every step completed successfully.
    Completed,
    /// A step failed, or the request was given up on after repeated errors.
    Failed,
}

impl ProcessingState {
    /// Returns `true` for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingState::Completed | ProcessingState::Failed)
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Selects which vectorization service processes a request.
///
/// Chosen at creation time and immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingType {
    /// The caller's task drives every step in-process.
    Synchronous,
    /// The request is enqueued and driven by per-step queue workers.
    Asynchronous,
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronous => write!(f, "synchronous"),
            Self::Asynchronous => write!(f, "asynchronous"),
        }
    }
}

/// Queuing engine backing the request sources.
///
/// A deployment concern resolved once at startup; see
/// [`crate::sources::RequestSourcesBuilder`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuingEngine {
    /// Process-local queues; at-most-once, lost on restart.
    #[default]
    Memory,
    /// SQLite-backed durable queues; at-least-once, survive restart.
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl std::str::FromStr for QueuingEngine {
    type Err = UnknownQueuingEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(QueuingEngine::Memory),
            #[cfg(feature = "sqlite")]
            "sqlite" => Ok(QueuingEngine::Sqlite),
            other => Err(UnknownQueuingEngine {
                name: other.to_string(),
            }),
        }
    }
}

/// Error raised for an unsupported queuing engine name in configuration.
#[derive(Debug, Error, Diagnostic)]
#[error("unsupported queuing engine: {name}")]
#[diagnostic(
    code(vectorline::types::unknown_queuing_engine),
    help("Supported queuing engines are: memory, sqlite (with the `sqlite` feature).")
)]
pub struct UnknownQueuingEngine {
    /// The offending configured name.
    pub name: String,
}

/// Opaque identity token propagated through the pipeline.
///
/// The engine never inspects the token; it is passed through to the resource
/// store and step implementations, which may enforce authorization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// A fixed identity for engine-internal maintenance operations
    /// (pipeline polling, worker finalization).
    #[must_use]
    pub fn service() -> Self {
        Self("vectorline-service".to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Structured outcome of submitting or processing a vectorization request.
///
/// Services never propagate step failures as errors; they convert them into
/// a `VectorizationResult` with `success == false`. Callers must branch on
/// [`VectorizationResult::success`], not on `Result`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationResult {
    /// Resource path of the request this result refers to.
    pub object_id: String,
    /// Whether processing (or submission) succeeded.
    pub success: bool,
    /// Failure detail naming the offending step, when `success` is false.
    pub error_message: Option<String>,
}

impl VectorizationResult {
    /// A successful result for the given request resource path.
    #[must_use]
    pub fn ok(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            success: true,
            error_message: None,
        }
    }

    /// A failed result carrying a human-readable message.
    #[must_use]
    pub fn failed(object_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            success: false,
            error_message: Some(message.into()),
        }
    }
}
