//! Resource path layout.
//!
//! All persisted documents are addressed by hierarchical path strings built
//! here, so the layout lives in exactly one place.

/// Collection holding vectorization request documents.
pub const REQUESTS: &str = "vectorization-requests";
/// Collection holding pipeline definitions.
pub const PIPELINES: &str = "vectorization-pipelines";
/// Collection holding pipeline execution records.
pub const PIPELINE_EXECUTIONS: &str = "vectorization-pipeline-executions";
/// Collection holding content source profiles.
pub const CONTENT_SOURCE_PROFILES: &str = "profiles/content-source";
/// Collection holding text partitioning profiles.
pub const TEXT_PARTITIONING_PROFILES: &str = "profiles/text-partitioning";
/// Collection holding text embedding profiles.
pub const TEXT_EMBEDDING_PROFILES: &str = "profiles/text-embedding";
/// Collection holding indexing profiles.
pub const INDEXING_PROFILES: &str = "profiles/indexing";

/// Path of a vectorization request resource.
#[must_use]
pub fn request_resource(name: &str) -> String {
    format!("{REQUESTS}/{name}")
}

/// Path of a pipeline definition resource.
#[must_use]
pub fn pipeline_resource(name: &str) -> String {
    format!("{PIPELINES}/{name}")
}

/// Path of one pipeline execution record.
#[must_use]
pub fn pipeline_execution_resource(pipeline_name: &str, execution_id: &str) -> String {
    format!("{PIPELINE_EXECUTIONS}/{pipeline_name}/{execution_id}")
}

/// Path of a content source profile.
#[must_use]
pub fn content_source_profile_resource(name: &str) -> String {
    format!("{CONTENT_SOURCE_PROFILES}/{name}")
}

/// Path of a text partitioning profile.
#[must_use]
pub fn text_partitioning_profile_resource(name: &str) -> String {
    format!("{TEXT_PARTITIONING_PROFILES}/{name}")
}

/// Path of a text embedding profile.
#[must_use]
pub fn text_embedding_profile_resource(name: &str) -> String {
    format!("{TEXT_EMBEDDING_PROFILES}/{name}")
}

/// Path of an indexing profile.
#[must_use]
pub fn indexing_profile_resource(name: &str) -> String {
    format!("{INDEXING_PROFILES}/{name}")
}

/// The trailing segment of a resource path (the resource name).
#[must_use]
pub fn resource_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
