use std::sync::Arc;

use vectorline::identifier::ContentIdentifier;
use vectorline::profiles::{
    ContentSourceKind, ContentSourceProfile, ContentSourceSettings, EmbeddingSettings,
    IndexingProfile, IndexingSettings, PartitioningSettings, TextEmbeddingProfile,
    TextPartitioningProfile,
};
use vectorline::request::{VectorizationRequest, VectorizationStep};
use vectorline::store::{MemoryResourceStore, ResourceStoreExt, paths};
use vectorline::types::{IdentityToken, ProcessingType, StepKind};

pub fn identity() -> IdentityToken {
    IdentityToken::new("test-user")
}

pub fn content(name: &str) -> ContentIdentifier {
    ContentIdentifier::new(
        "docs",
        vec!["tenant".into(), format!("{name}.txt")],
        format!("tenant/{name}.txt"),
    )
}

/// The full four-step list, wired to the profiles seeded by
/// [`seed_profiles`].
pub fn full_steps() -> Vec<VectorizationStep> {
    vec![
        VectorizationStep::new(StepKind::Extract),
        VectorizationStep::new(StepKind::Partition)
            .with_parameter("text_partitioning_profile_name", "default"),
        VectorizationStep::new(StepKind::Embed)
            .with_parameter("text_embedding_profile_name", "default"),
        VectorizationStep::new(StepKind::Index).with_parameter("indexing_profile_name", "default"),
    ]
}

pub fn full_request(name: &str, processing_type: ProcessingType) -> VectorizationRequest {
    VectorizationRequest::new(content(name), processing_type, full_steps())
}

pub fn request_with_steps(
    name: &str,
    processing_type: ProcessingType,
    kinds: &[StepKind],
) -> VectorizationRequest {
    let steps = full_steps()
        .into_iter()
        .filter(|s| kinds.contains(&s.id))
        .collect();
    VectorizationRequest::new(content(name), processing_type, steps)
}

/// Seeds the resource store with the profiles the fixtures reference.
pub async fn seed_profiles(store: &Arc<MemoryResourceStore>) {
    let identity = identity();
    store
        .upsert_typed(
            &paths::content_source_profile_resource("docs"),
            &ContentSourceProfile {
                name: "docs".into(),
                kind: ContentSourceKind::ObjectStore,
                settings: ContentSourceSettings::default(),
            },
            &identity,
        )
        .await
        .expect("seed content source profile");
    store
        .upsert_typed(
            &paths::text_partitioning_profile_resource("default"),
            &TextPartitioningProfile {
                name: "default".into(),
                settings: PartitioningSettings {
                    chunk_size_chars: 64,
                    overlap_chars: 0,
                },
            },
            &identity,
        )
        .await
        .expect("seed partitioning profile");
    store
        .upsert_typed(
            &paths::text_embedding_profile_resource("default"),
            &TextEmbeddingProfile {
                name: "default".into(),
                settings: EmbeddingSettings {
                    model: "test-embedding".into(),
                    dimensions: Some(3),
                },
            },
            &identity,
        )
        .await
        .expect("seed embedding profile");
    store
        .upsert_typed(
            &paths::indexing_profile_resource("default"),
            &IndexingProfile {
                name: "default".into(),
                settings: IndexingSettings {
                    index_name: "test-index".into(),
                },
            },
            &identity,
        )
        .await
        .expect("seed indexing profile");
}
