use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vectorline::handlers::{HandlerError, HandlerServices, StepHandler, StepHandlerFactory};
use vectorline::identifier::ContentIdentifier;
use vectorline::profiles::{
    ContentSourceProfile, IndexingProfile, TextEmbeddingProfile, TextPartitioningProfile,
};
use vectorline::request::{VectorizationRequest, VectorizationStep};
use vectorline::state::VectorizationState;
use vectorline::steps::{
    ContentExtractor, Embedding, EmbeddingJob, EmbeddingService, IndexEntry, IndexWriter,
    StepError, TextPartitioner,
};
use vectorline::store::{MemoryResourceStore, MemoryStateStore};
use vectorline::types::{IdentityToken, StepKind};

// ---------------------------------------------------------------------------
// Stub step implementations for exercising the profile-driven handlers.
// ---------------------------------------------------------------------------

/// Extractor returning fixed text for any content.
pub struct StaticExtractor {
    pub text: String,
}

#[async_trait]
impl ContentExtractor for StaticExtractor {
    async fn extract_text(
        &self,
        content: &ContentIdentifier,
        _profile: &ContentSourceProfile,
    ) -> Result<String, StepError> {
        content
            .validate_multipart_id(2)
            .map_err(|e| StepError::ContentSource {
                profile: content.content_source_profile_name.clone(),
                message: e.to_string(),
            })?;
        Ok(self.text.clone())
    }
}

/// Partitioner splitting on blank lines.
pub struct ParagraphPartitioner;

#[async_trait]
impl TextPartitioner for ParagraphPartitioner {
    async fn partition(
        &self,
        text: &str,
        _profile: &TextPartitioningProfile,
    ) -> Result<Vec<String>, StepError> {
        Ok(text
            .split("\n\n")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Embedder answering immediately with deterministic vectors.
#[derive(Default)]
pub struct ImmediateEmbedder {
    pub calls: AtomicU32,
}

#[async_trait]
impl EmbeddingService for ImmediateEmbedder {
    async fn start_embedding(
        &self,
        partitions: &[String],
        _profile: &TextEmbeddingProfile,
    ) -> Result<EmbeddingJob, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EmbeddingJob::Completed(
            partitions
                .iter()
                .enumerate()
                .map(|(i, text)| Embedding(vec![i as f32, text.len() as f32, 1.0]))
                .collect(),
        ))
    }

    async fn poll_embedding(&self, operation_id: &str) -> Result<EmbeddingJob, StepError> {
        Err(StepError::UnknownOperation {
            operation_id: operation_id.to_string(),
        })
    }
}

/// Embedder that hands back a long-running operation and completes it after
/// a scripted number of polls.
pub struct DeferredEmbedder {
    polls_required: u32,
    next_operation: AtomicU32,
    operations: Mutex<HashMap<String, (u32, usize)>>,
    pub started: AtomicU32,
    pub polled: AtomicU32,
}

impl DeferredEmbedder {
    pub fn new(polls_required: u32) -> Self {
        Self {
            polls_required,
            next_operation: AtomicU32::new(1),
            operations: Mutex::new(HashMap::new()),
            started: AtomicU32::new(0),
            polled: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingService for DeferredEmbedder {
    async fn start_embedding(
        &self,
        partitions: &[String],
        _profile: &TextEmbeddingProfile,
    ) -> Result<EmbeddingJob, StepError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let operation_id = format!("op-{}", self.next_operation.fetch_add(1, Ordering::SeqCst));
        self.operations
            .lock()
            .expect("operations lock")
            .insert(operation_id.clone(), (0, partitions.len()));
        Ok(EmbeddingJob::Running { operation_id })
    }

    async fn poll_embedding(&self, operation_id: &str) -> Result<EmbeddingJob, StepError> {
        self.polled.fetch_add(1, Ordering::SeqCst);
        let mut operations = self.operations.lock().expect("operations lock");
        let (polls, partitions) =
            operations
                .get_mut(operation_id)
                .map(|entry| {
                    entry.0 += 1;
                    *entry
                })
                .ok_or_else(|| StepError::UnknownOperation {
                    operation_id: operation_id.to_string(),
                })?;
        if polls < self.polls_required {
            Ok(EmbeddingJob::Running {
                operation_id: operation_id.to_string(),
            })
        } else {
            Ok(EmbeddingJob::Completed(
                (0..partitions)
                    .map(|i| Embedding(vec![i as f32, 0.0, 2.0]))
                    .collect(),
            ))
        }
    }
}

/// Index writer capturing every entry it receives.
#[derive(Default)]
pub struct RecordingIndexWriter {
    pub entries: Mutex<Vec<IndexEntry>>,
}

#[async_trait]
impl IndexWriter for RecordingIndexWriter {
    async fn write_entries(
        &self,
        entries: Vec<IndexEntry>,
        profile: &IndexingProfile,
    ) -> Result<Vec<String>, StepError> {
        let ids = entries
            .iter()
            .map(|e| format!("{}-{}", profile.settings.index_name, e.position))
            .collect();
        self.entries.lock().expect("entries lock").extend(entries);
        Ok(ids)
    }
}

/// Bundle of memory stores + stub step implementations.
pub struct TestHarness {
    pub services: Arc<HandlerServices>,
    pub resource_store: Arc<MemoryResourceStore>,
    pub state_store: Arc<MemoryStateStore>,
    pub index_writer: Arc<RecordingIndexWriter>,
}

/// Builds handler services around memory stores, a fixed-text extractor,
/// and the given embedder.
pub fn harness_with_embedder(embedder: Arc<dyn EmbeddingService>) -> TestHarness {
    let resource_store = Arc::new(MemoryResourceStore::new());
    let state_store = Arc::new(MemoryStateStore::new());
    let index_writer = Arc::new(RecordingIndexWriter::default());
    let services = Arc::new(HandlerServices {
        state_store: state_store.clone(),
        resource_store: resource_store.clone(),
        extractor: Arc::new(StaticExtractor {
            text: "first paragraph\n\nsecond paragraph\n\nthird paragraph".into(),
        }),
        partitioner: Arc::new(ParagraphPartitioner),
        embedder,
        index_writer: index_writer.clone(),
    });
    TestHarness {
        services,
        resource_store,
        state_store,
        index_writer,
    }
}

pub fn harness() -> TestHarness {
    harness_with_embedder(Arc::new(ImmediateEmbedder::default()))
}

// ---------------------------------------------------------------------------
// Scripted handlers for service-level state machine tests.
// ---------------------------------------------------------------------------

/// Behavior of one scripted step handler.
#[derive(Clone, Copy, Debug)]
pub enum StepScript {
    /// Complete on the first invocation.
    Complete,
    /// Raise a step failure.
    Fail(&'static str),
    /// Report a pending long-running operation for `polls` invocations,
    /// then complete.
    RunningThenComplete { polls: u32 },
}

/// Factory producing scripted handlers and recording invocation order.
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<StepKind, StepScript>>,
    invocations: Arc<Mutex<Vec<StepKind>>>,
    poll_counts: Arc<Mutex<HashMap<StepKind, u32>>>,
}

impl ScriptedFactory {
    /// Every step completes immediately unless overridden.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            invocations: Arc::new(Mutex::new(Vec::new())),
            poll_counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_script(self, kind: StepKind, script: StepScript) -> Self {
        self.scripts.lock().expect("scripts lock").insert(kind, script);
        self
    }

    /// Invocation order observed across every handler this factory created.
    pub fn invocations(&self) -> Vec<StepKind> {
        self.invocations.lock().expect("invocations lock").clone()
    }
}

impl Default for ScriptedFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StepHandlerFactory for ScriptedFactory {
    fn create(
        &self,
        step: &VectorizationStep,
        message_id: &str,
        _services: Arc<HandlerServices>,
    ) -> Result<Box<dyn StepHandler>, HandlerError> {
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get(&step.id)
            .copied()
            .unwrap_or(StepScript::Complete);
        Ok(Box::new(ScriptedHandler {
            kind: step.id,
            message_id: message_id.to_string(),
            script,
            invocations: self.invocations.clone(),
            poll_counts: self.poll_counts.clone(),
        }))
    }
}

struct ScriptedHandler {
    kind: StepKind,
    message_id: String,
    script: StepScript,
    invocations: Arc<Mutex<Vec<StepKind>>>,
    poll_counts: Arc<Mutex<HashMap<StepKind, u32>>>,
}

#[async_trait]
impl StepHandler for ScriptedHandler {
    fn step_kind(&self) -> StepKind {
        self.kind
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }

    async fn process(
        &self,
        request: &mut VectorizationRequest,
        _state: &mut VectorizationState,
        _identity: &IdentityToken,
        _cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        self.invocations
            .lock()
            .expect("invocations lock")
            .push(self.kind);
        match self.script {
            StepScript::Complete => Ok(true),
            StepScript::Fail(message) => {
                Err(StepError::EmbeddingService(message.to_string()).into())
            }
            StepScript::RunningThenComplete { polls } => {
                let mut counts = self.poll_counts.lock().expect("poll counts lock");
                let seen = counts.entry(self.kind).or_insert(0);
                *seen += 1;
                let operation_id = format!("op-{}", self.kind);
                if *seen <= polls {
                    request.record_running_operation(self.kind, operation_id, false);
                    Ok(false)
                } else {
                    request.record_running_operation(self.kind, operation_id, true);
                    Ok(true)
                }
            }
        }
    }
}
