//! Vectorization state: durable per-request artifacts and execution log.
//!
//! A [`VectorizationState`] record accumulates the artifacts produced by
//! completed steps (extracted text, partitions, embeddings, index
//! references) so a resumed or retried request never redoes finished work.
//! It is addressed by the stable key derived from the request's content
//! identifier and is append-only across the steps of one request: step N's
//! artifacts must exist before step N+1 can consume them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::{ContentIdentifier, ContentIdentifierError};
use crate::request::VectorizationRequest;
use crate::types::StepKind;

/// The kind of artifact a pipeline step produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Raw text produced by the extract step.
    ExtractedText,
    /// One text chunk produced by the partition step.
    TextPartition,
    /// One embedding vector (JSON-serialized) produced by the embed step.
    TextEmbeddingVector,
}

/// An artifact produced by a completed pipeline step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationArtifact {
    /// What the artifact is.
    pub kind: ArtifactKind,
    /// 1-based position among artifacts of the same kind.
    pub position: u32,
    /// The artifact payload (text, or serialized vector).
    pub content: String,
}

impl VectorizationArtifact {
    pub fn new(kind: ArtifactKind, position: u32, content: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            content: content.into(),
        }
    }
}

/// Reference to one entry written into a vector index by the index step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReference {
    /// Identifier of the entry in the target index.
    pub index_entry_id: String,
    /// 1-based position matching the embedded partition.
    pub position: u32,
}

/// One entry in the per-request execution log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// Name of the request the action belongs to.
    pub request_id: String,
    /// Queue message id the request arrived under ("n/a" when in-process).
    pub message_id: String,
    /// The step that performed the action.
    pub step: StepKind,
    /// Free-form entry text.
    pub text: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Durable record of the artifacts produced for one content item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorizationState {
    /// Name of the request currently producing artifacts. Subsequent
    /// requests for the same content reuse the record under a new name.
    pub current_request_id: String,
    /// The content this state belongs to.
    pub content_identifier: ContentIdentifier,
    /// Artifacts keyed by kind and position.
    #[serde(default)]
    pub artifacts: Vec<VectorizationArtifact>,
    /// Index entries written by the index step.
    #[serde(default)]
    pub index_references: Vec<IndexReference>,
    /// Append-only log of handler actions.
    #[serde(default)]
    pub log: Vec<ExecutionLogEntry>,
}

impl VectorizationState {
    /// Creates a fresh state record for a request.
    #[must_use]
    pub fn from_request(request: &VectorizationRequest) -> Self {
        Self {
            current_request_id: request.name.clone(),
            content_identifier: request.content_identifier.clone(),
            artifacts: Vec::new(),
            index_references: Vec::new(),
            log: Vec::new(),
        }
    }

    /// The stable key addressing this record in the state store.
    pub fn state_key(&self) -> Result<String, ContentIdentifierError> {
        self.content_identifier.state_key()
    }

    /// Adds an artifact, replacing any existing artifact with the same kind
    /// and position. Replacement (rather than append) keeps retried steps
    /// idempotent.
    pub fn add_or_replace_artifact(&mut self, artifact: VectorizationArtifact) {
        self.artifacts
            .retain(|a| !(a.kind == artifact.kind && a.position == artifact.position));
        self.artifacts.push(artifact);
    }

    /// Artifacts of one kind, in position order.
    #[must_use]
    pub fn artifacts_of(&self, kind: ArtifactKind) -> Vec<&VectorizationArtifact> {
        let mut found: Vec<&VectorizationArtifact> =
            self.artifacts.iter().filter(|a| a.kind == kind).collect();
        found.sort_by_key(|a| a.position);
        found
    }

    /// Replaces the index references with the ordered list of entry ids
    /// returned by the index writer.
    pub fn replace_index_references(&mut self, index_entry_ids: Vec<String>) {
        self.index_references = index_entry_ids
            .into_iter()
            .enumerate()
            .map(|(i, index_entry_id)| IndexReference {
                index_entry_id,
                position: (i + 1) as u32,
            })
            .collect();
    }

    /// Appends a generic log entry.
    pub fn log_entry(
        &mut self,
        step: StepKind,
        request_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.log.push(ExecutionLogEntry {
            request_id: request_id.into(),
            message_id: message_id.into(),
            step,
            text: text.into(),
            recorded_at: Utc::now(),
        });
    }

    /// Marks the start of a handler invocation.
    pub fn log_handler_start(
        &mut self,
        step: StepKind,
        request_id: impl Into<String>,
        message_id: impl Into<String>,
    ) {
        self.log_entry(step, request_id, message_id, "started handling step");
    }

    /// Marks the end of a handler invocation.
    pub fn log_handler_end(
        &mut self,
        step: StepKind,
        request_id: impl Into<String>,
        message_id: impl Into<String>,
    ) {
        self.log_entry(step, request_id, message_id, "finished handling step");
    }

    /// Records a handler error.
    pub fn log_handler_error(
        &mut self,
        step: StepKind,
        request_id: impl Into<String>,
        message_id: impl Into<String>,
        error: &(dyn std::error::Error + '_),
    ) {
        self.log_entry(step, request_id, message_id, format!("ERROR: {error}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::VectorizationStep;
    use crate::types::ProcessingType;

    fn state() -> VectorizationState {
        let request = VectorizationRequest::new(
            ContentIdentifier::new("docs", vec!["a".into(), "b.txt".into()], "a/b.txt"),
            ProcessingType::Synchronous,
            vec![VectorizationStep::new(StepKind::Extract)],
        );
        VectorizationState::from_request(&request)
    }

    #[test]
    fn artifacts_replace_by_kind_and_position() {
        let mut st = state();
        st.add_or_replace_artifact(VectorizationArtifact::new(
            ArtifactKind::TextPartition,
            1,
            "first",
        ));
        st.add_or_replace_artifact(VectorizationArtifact::new(
            ArtifactKind::TextPartition,
            2,
            "second",
        ));
        st.add_or_replace_artifact(VectorizationArtifact::new(
            ArtifactKind::TextPartition,
            1,
            "first, retried",
        ));

        let partitions = st.artifacts_of(ArtifactKind::TextPartition);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].content, "first, retried");
        assert_eq!(partitions[1].content, "second");
    }

    #[test]
    fn artifacts_of_sorts_by_position() {
        let mut st = state();
        st.add_or_replace_artifact(VectorizationArtifact::new(
            ArtifactKind::TextEmbeddingVector,
            2,
            "[2.0]",
        ));
        st.add_or_replace_artifact(VectorizationArtifact::new(
            ArtifactKind::TextEmbeddingVector,
            1,
            "[1.0]",
        ));
        let vectors = st.artifacts_of(ArtifactKind::TextEmbeddingVector);
        assert_eq!(vectors[0].position, 1);
        assert_eq!(vectors[1].position, 2);
    }

    #[test]
    fn index_references_are_positional() {
        let mut st = state();
        st.replace_index_references(vec!["idx-a".into(), "idx-b".into()]);
        assert_eq!(st.index_references[0].position, 1);
        assert_eq!(st.index_references[1].index_entry_id, "idx-b");
    }
}
