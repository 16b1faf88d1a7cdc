//! Request sources: named queues holding requests awaiting a step.
//!
//! One source exists per step kind. Producers submit whole requests;
//! consumers receive them wrapped in a [`ReceivedRequest`] envelope carrying
//! the queue message id, the pop receipt required to acknowledge, and the
//! dequeue count.
//!
//! Two implementations exist:
//!
//! - [`MemoryRequestSource`]: process-local, at-most-once — a received
//!   message is gone even if never acknowledged.
//! - [`SqliteRequestSource`] (`sqlite` feature): durable, at-least-once —
//!   received messages become invisible for a visibility timeout and are
//!   re-delivered unless deleted with the matching pop receipt.
//!
//! The per-step cache of sources is built once at startup by
//! [`RequestSourcesBuilder`] and is immutable afterwards.

pub mod builder;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use builder::{RequestSourceSettings, RequestSources, RequestSourcesBuilder};
pub use memory::MemoryRequestSource;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRequestSource;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::request::VectorizationRequest;
use crate::types::StepKind;

/// A request dequeued from a source, plus the metadata needed to
/// acknowledge or update it.
#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    /// The dequeued request.
    pub request: VectorizationRequest,
    /// Identifier of the underlying queue message.
    pub message_id: String,
    /// Receipt required to delete or update the message.
    pub pop_receipt: String,
    /// How many times the message has been received so far.
    pub dequeue_count: u32,
}

/// Errors raised by request sources.
#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    /// The queue backend failed.
    #[error("queue backend error ({source_name}): {message}")]
    #[diagnostic(code(vectorline::sources::backend))]
    Backend {
        /// Name of the affected source.
        source_name: String,
        /// Backend detail.
        message: String,
    },

    /// A queued request could not be (de)serialized.
    #[error("failed to serialize queued request: {0}")]
    #[diagnostic(code(vectorline::sources::serde))]
    Serde(#[from] serde_json::Error),
}

/// Configuration errors detected while building the source cache.
///
/// These fail fast at startup and never surface at request-processing time.
#[derive(Debug, Error, Diagnostic)]
pub enum SourceConfigError {
    /// No source settings were provided.
    #[error("cannot build request sources without settings")]
    #[diagnostic(code(vectorline::sources::missing_settings))]
    MissingSettings,

    /// Two settings entries name the same step kind.
    #[error("duplicate request source for step [{step}]")]
    #[diagnostic(code(vectorline::sources::duplicate_source))]
    DuplicateSource {
        /// The repeated step kind.
        step: StepKind,
    },

    /// The durable engine was selected but no database URL is configured.
    #[error("the sqlite queuing engine requires a database URL")]
    #[diagnostic(
        code(vectorline::sources::missing_database_url),
        help("Set VECTORLINE_DATABASE_URL or pass a URL to the builder.")
    )]
    MissingDatabaseUrl,

    /// No source was configured for a step a request needs.
    #[error("no request source is configured for step [{step}]")]
    #[diagnostic(code(vectorline::sources::unknown_source))]
    UnknownSource {
        /// The unconfigured step kind.
        step: StepKind,
    },

    /// The backend could not be initialized.
    #[error("queue backend initialization failed: {message}")]
    #[diagnostic(code(vectorline::sources::backend_init))]
    BackendInit {
        /// Backend detail.
        message: String,
    },
}

/// A named queue of vectorization requests awaiting one step.
#[async_trait]
pub trait RequestSource: Send + Sync {
    /// The source name (the step kind it feeds).
    fn source_name(&self) -> &str;

    /// Whether the source currently has deliverable requests.
    async fn has_requests(&self) -> Result<bool, SourceError>;

    /// Dequeues up to `count` requests without blocking. Returns fewer when
    /// the source is short. Durable sources make the returned messages
    /// invisible until the visibility timeout elapses or they are deleted.
    async fn receive_requests(&self, count: usize) -> Result<Vec<ReceivedRequest>, SourceError>;

    /// Acknowledges (removes) an in-flight message. Idempotent: deleting an
    /// already-removed message succeeds silently.
    async fn delete_request(&self, message_id: &str, pop_receipt: &str)
    -> Result<(), SourceError>;

    /// Enqueues a request. Never blocks indefinitely; the submission is
    /// visible to subsequent `has_requests`/`receive_requests` calls.
    async fn submit_request(&self, request: &VectorizationRequest) -> Result<(), SourceError>;

    /// Rewrites an in-flight message with updated request content and makes
    /// it deliverable again. Returns the new pop receipt.
    async fn update_request(
        &self,
        message_id: &str,
        pop_receipt: &str,
        request: &VectorizationRequest,
    ) -> Result<String, SourceError>;
}
