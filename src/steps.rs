//! Pluggable step implementation contracts.
//!
//! The pipeline core does not extract, split, embed, or index anything
//! itself; it drives implementations of the narrow traits in this module.
//! Each trait is the seam where a deployment plugs in its content readers,
//! text splitters, embedding clients, and index writers.
//!
//! Embedding supports long-running operations: a service may return
//! [`EmbeddingJob::Running`] from [`EmbeddingService::start_embedding`], in
//! which case the embed handler records the operation on the request and the
//! driver polls [`EmbeddingService::poll_embedding`] until it resolves.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifier::ContentIdentifier;
use crate::profiles::{
    ContentSourceProfile, IndexingProfile, TextEmbeddingProfile, TextPartitioningProfile,
};

/// A single embedding vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Typed failures raised by step implementations.
///
/// Handlers propagate these unchanged; the orchestrating service converts
/// them into a terminal `Failed` state naming the offending step.
#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    /// The content source could not produce the requested content.
    #[error("content source error ({profile}): {message}")]
    #[diagnostic(code(vectorline::steps::content_source))]
    ContentSource {
        /// The content source profile in use.
        profile: String,
        /// Backend detail.
        message: String,
    },

    /// Text partitioning failed.
    #[error("partitioning error: {0}")]
    #[diagnostic(code(vectorline::steps::partitioning))]
    Partitioning(String),

    /// The embedding service rejected or lost the work.
    #[error("embedding service error: {0}")]
    #[diagnostic(code(vectorline::steps::embedding))]
    EmbeddingService(String),

    /// A previously started operation is no longer known to the service.
    #[error("embedding operation {operation_id} is not known to the service")]
    #[diagnostic(
        code(vectorline::steps::unknown_operation),
        help("The operation may have expired; roll the request back to re-run the embed step.")
    )]
    UnknownOperation {
        /// The stale operation id.
        operation_id: String,
    },

    /// The index writer could not persist the entries.
    #[error("index write error ({index}): {message}")]
    #[diagnostic(code(vectorline::steps::index_write))]
    IndexWrite {
        /// The target index name.
        index: String,
        /// Backend detail.
        message: String,
    },
}

/// Reads source content and produces raw text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extracts the text of the content identified by `content`, using the
    /// connection details in `profile`. Implementations validate the
    /// multipart id arity their source requires before any I/O.
    async fn extract_text(
        &self,
        content: &ContentIdentifier,
        profile: &ContentSourceProfile,
    ) -> Result<String, StepError>;
}

/// Splits extracted text into partitions.
#[async_trait]
pub trait TextPartitioner: Send + Sync {
    /// Splits `text` according to the partitioning profile. The returned
    /// order is the partition order used for embedding and indexing.
    async fn partition(
        &self,
        text: &str,
        profile: &TextPartitioningProfile,
    ) -> Result<Vec<String>, StepError>;
}

/// Outcome of starting or polling an embedding job.
#[derive(Clone, Debug, PartialEq)]
pub enum EmbeddingJob {
    /// The embeddings are ready, one per input partition, in input order.
    Completed(Vec<Embedding>),
    /// The service accepted the work as a long-running operation.
    Running {
        /// Identifier to poll the operation with.
        operation_id: String,
    },
}

/// Produces embedding vectors for text partitions.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Starts embedding the given partitions. May complete synchronously or
    /// hand back a long-running operation id.
    async fn start_embedding(
        &self,
        partitions: &[String],
        profile: &TextEmbeddingProfile,
    ) -> Result<EmbeddingJob, StepError>;

    /// Polls a previously started operation. Must be safe to call
    /// repeatedly; returns [`EmbeddingJob::Running`] until the operation
    /// resolves.
    async fn poll_embedding(&self, operation_id: &str) -> Result<EmbeddingJob, StepError>;
}

/// One entry to be written into a vector index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// 1-based partition position this entry corresponds to.
    pub position: u32,
    /// The partition text.
    pub text: String,
    /// The partition's embedding.
    pub embedding: Embedding,
    /// Canonical id of the source content.
    pub canonical_id: String,
}

/// Writes embeddings into a vector index.
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Writes the entries and returns the ids assigned by the index, in
    /// entry order.
    async fn write_entries(
        &self,
        entries: Vec<IndexEntry>,
        profile: &IndexingProfile,
    ) -> Result<Vec<String>, StepError>;
}
