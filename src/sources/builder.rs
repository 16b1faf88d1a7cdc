//! Builder for the per-step request source cache.
//!
//! The cache is constructed once at startup, validated eagerly, and is
//! immutable afterwards — safe for concurrent access without locking. All
//! configuration problems (missing settings, duplicate steps, missing
//! database URL, unsupported engine) surface here, never at
//! request-processing time.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::types::{QueuingEngine, StepKind};

use super::memory::MemoryRequestSource;
use super::{RequestSource, SourceConfigError};

/// Settings for one request source.
#[derive(Clone, Debug)]
pub struct RequestSourceSettings {
    /// The step kind the source feeds; doubles as the queue name.
    pub step: StepKind,
    /// How long received messages stay invisible on durable queues.
    pub visibility_timeout: Duration,
}

impl RequestSourceSettings {
    #[must_use]
    pub fn new(step: StepKind) -> Self {
        Self {
            step,
            visibility_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// One settings entry per step kind, in canonical order.
    #[must_use]
    pub fn for_all_steps() -> Vec<Self> {
        StepKind::ALL.into_iter().map(Self::new).collect()
    }
}

/// The immutable per-step-kind cache of request sources.
pub struct RequestSources {
    sources: FxHashMap<StepKind, Arc<dyn RequestSource>>,
}

impl std::fmt::Debug for RequestSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSources")
            .field("steps", &self.steps())
            .finish()
    }
}

impl RequestSources {
    /// The source feeding a step, if one is configured.
    #[must_use]
    pub fn for_step(&self, step: StepKind) -> Option<Arc<dyn RequestSource>> {
        self.sources.get(&step).cloned()
    }

    /// Like [`for_step`](Self::for_step) but fails with a configuration
    /// error naming the missing step.
    pub fn require(&self, step: StepKind) -> Result<Arc<dyn RequestSource>, SourceConfigError> {
        self.for_step(step)
            .ok_or(SourceConfigError::UnknownSource { step })
    }

    /// The configured step kinds.
    #[must_use]
    pub fn steps(&self) -> Vec<StepKind> {
        let mut steps: Vec<StepKind> = self.sources.keys().copied().collect();
        steps.sort_by_key(|k| StepKind::ALL.iter().position(|s| s == k));
        steps
    }
}

/// Builder for [`RequestSources`].
#[derive(Default)]
pub struct RequestSourcesBuilder {
    settings: Option<Vec<RequestSourceSettings>>,
    queuing: QueuingEngine,
    database_url: Option<String>,
}

impl RequestSourcesBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Specifies the settings for each source to be built.
    #[must_use]
    pub fn with_settings(mut self, settings: Vec<RequestSourceSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Selects the queuing engine backing the sources.
    #[must_use]
    pub fn with_queuing(mut self, queuing: QueuingEngine) -> Self {
        self.queuing = queuing;
        self
    }

    /// Supplies the database URL for the durable engine. Falls back to the
    /// `VECTORLINE_DATABASE_URL` environment variable when not set.
    #[must_use]
    pub fn with_database_url(mut self, database_url: impl Into<String>) -> Self {
        self.database_url = Some(database_url.into());
        self
    }

    fn validated_settings(&self) -> Result<&[RequestSourceSettings], SourceConfigError> {
        let settings = self
            .settings
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SourceConfigError::MissingSettings)?;
        let mut seen: Vec<StepKind> = Vec::with_capacity(settings.len());
        for entry in settings {
            if seen.contains(&entry.step) {
                return Err(SourceConfigError::DuplicateSource { step: entry.step });
            }
            seen.push(entry.step);
        }
        Ok(settings)
    }

    /// Builds the immutable source cache, failing fast on any
    /// configuration problem.
    pub async fn build(self) -> Result<RequestSources, SourceConfigError> {
        let settings = self.validated_settings()?.to_vec();
        let mut sources: FxHashMap<StepKind, Arc<dyn RequestSource>> = FxHashMap::default();

        match self.queuing {
            QueuingEngine::Memory => {
                for entry in &settings {
                    sources.insert(
                        entry.step,
                        Arc::new(MemoryRequestSource::new(entry.step.encode())),
                    );
                }
            }
            #[cfg(feature = "sqlite")]
            QueuingEngine::Sqlite => {
                let database_url = self
                    .database_url
                    .or_else(|| {
                        dotenvy::dotenv().ok();
                        std::env::var("VECTORLINE_DATABASE_URL").ok()
                    })
                    .ok_or(SourceConfigError::MissingDatabaseUrl)?;
                let pool = crate::store::sqlite::connect_pool(&database_url)
                    .await
                    .map_err(|e| SourceConfigError::BackendInit {
                        message: e.to_string(),
                    })?;
                for entry in &settings {
                    sources.insert(
                        entry.step,
                        Arc::new(super::sqlite::SqliteRequestSource::new(
                            entry.step.encode(),
                            pool.clone(),
                            entry.visibility_timeout,
                        )),
                    );
                }
            }
        }

        Ok(RequestSources { sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_rejects_missing_and_duplicate_settings() {
        let err = RequestSourcesBuilder::new().build().await.unwrap_err();
        assert!(matches!(err, SourceConfigError::MissingSettings));

        let err = RequestSourcesBuilder::new()
            .with_settings(vec![
                RequestSourceSettings::new(StepKind::Extract),
                RequestSourceSettings::new(StepKind::Extract),
            ])
            .build()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceConfigError::DuplicateSource {
                step: StepKind::Extract
            }
        ));
    }

    #[tokio::test]
    async fn memory_cache_serves_every_configured_step() {
        let sources = RequestSourcesBuilder::new()
            .with_settings(RequestSourceSettings::for_all_steps())
            .with_queuing(QueuingEngine::Memory)
            .build()
            .await
            .unwrap();
        for step in StepKind::ALL {
            assert!(sources.for_step(step).is_some());
        }
        assert_eq!(sources.steps(), StepKind::ALL.to_vec());
    }
}
