//! Deployment-level engine configuration.
//!
//! Hosts can construct [`EngineConfig`] explicitly or resolve it from the
//! environment (`.env` files are honored via `dotenvy`):
//!
//! - `VECTORLINE_QUEUING_ENGINE` — `memory` (default) or `sqlite`
//! - `VECTORLINE_DATABASE_URL` — SQLite URL for durable queues and state

use crate::types::{QueuingEngine, UnknownQueuingEngine};

/// Engine-wide deployment settings.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Queuing engine backing the request sources.
    pub queuing: QueuingEngine,
    /// Database URL for the durable backends, when configured.
    pub database_url: Option<String>,
}

impl EngineConfig {
    /// Resolves the configuration from the process environment.
    pub fn from_env() -> Result<Self, UnknownQueuingEngine> {
        dotenvy::dotenv().ok();
        let queuing = match std::env::var("VECTORLINE_QUEUING_ENGINE") {
            Ok(name) => name.parse()?,
            Err(_) => QueuingEngine::default(),
        };
        Ok(Self {
            queuing,
            database_url: std::env::var("VECTORLINE_DATABASE_URL").ok(),
        })
    }

    #[must_use]
    pub fn with_queuing(mut self, queuing: QueuingEngine) -> Self {
        self.queuing = queuing;
        self
    }

    #[must_use]
    pub fn with_database_url(mut self, database_url: impl Into<String>) -> Self {
        self.database_url = Some(database_url.into());
        self
    }
}
