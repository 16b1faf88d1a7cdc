//! Profile resources: typed configuration consumed by step handlers.
//!
//! Profiles live in the resource store and are referenced by name from step
//! parameters. Each profile carries a strongly-typed settings struct that is
//! deserialized once when loaded; handlers never inspect loose string maps
//! at processing time.

use serde::{Deserialize, Serialize};

/// File extensions accepted from file-backed content sources.
///
/// Extraction of any other extension is rejected at submission time, before
/// any step runs.
pub const ALLOWED_FILE_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "csv", "html", "pdf", "docx", "pptx", "xlsx",
];

/// The family of content source a profile connects to.
///
/// The family decides which submission-time checks apply to a content
/// identifier (file extension for stores, protocol for the web).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSourceKind {
    /// A file/object store addressed by path segments.
    ObjectStore,
    /// Web content addressed by protocol + host + path.
    Web,
    /// A database addressed by schema/table/column coordinates.
    Database,
}

/// Connection settings for a content source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSourceSettings {
    /// Name of the host-supplied configuration entry holding the
    /// connection string. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_config_name: Option<String>,
    /// Optional root path prepended to multipart ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_path: Option<String>,
}

/// Profile describing how to reach a content source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSourceProfile {
    /// Profile name, referenced by content identifiers.
    pub name: String,
    /// The content source family.
    pub kind: ContentSourceKind,
    #[serde(default)]
    pub settings: ContentSourceSettings,
}

/// Settings for the partition step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitioningSettings {
    /// Maximum partition size, in characters.
    pub chunk_size_chars: usize,
    /// Overlap between consecutive partitions, in characters.
    #[serde(default)]
    pub overlap_chars: usize,
}

impl Default for PartitioningSettings {
    fn default() -> Self {
        Self {
            chunk_size_chars: 2000,
            overlap_chars: 200,
        }
    }
}

/// Profile configuring the partition step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPartitioningProfile {
    pub name: String,
    #[serde(default)]
    pub settings: PartitioningSettings,
}

/// Settings for the embed step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Embedding model deployment name, interpreted by the embedding
    /// service implementation.
    pub model: String,
    /// Expected vector dimensionality, when the service supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

/// Profile configuring the embed step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEmbeddingProfile {
    pub name: String,
    pub settings: EmbeddingSettings,
}

/// Settings for the index step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Name of the target vector index.
    pub index_name: String,
}

/// Profile configuring the index step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingProfile {
    pub name: String,
    pub settings: IndexingSettings,
}
