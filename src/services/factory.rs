//! Routing of requests to the synchronous or asynchronous service.

use std::sync::Arc;

use crate::types::ProcessingType;

use super::asynchronous::AsynchronousVectorizationService;
use super::synchronous::SynchronousVectorizationService;
use super::VectorizationService;
use crate::handlers::StepHandlerFactory;

/// Returns the fully wired service for a request's processing type.
///
/// Pure routing; owns no state beyond the two shared service instances.
pub struct VectorizationServiceFactory<F> {
    synchronous: Arc<SynchronousVectorizationService<F>>,
    asynchronous: Arc<AsynchronousVectorizationService>,
}

impl<F: StepHandlerFactory + 'static> VectorizationServiceFactory<F> {
    #[must_use]
    pub fn new(
        synchronous: Arc<SynchronousVectorizationService<F>>,
        asynchronous: Arc<AsynchronousVectorizationService>,
    ) -> Self {
        Self {
            synchronous,
            asynchronous,
        }
    }

    /// The service handling requests of the given processing type.
    #[must_use]
    pub fn service_for(&self, processing_type: ProcessingType) -> Arc<dyn VectorizationService> {
        match processing_type {
            ProcessingType::Synchronous => self.synchronous.clone(),
            ProcessingType::Asynchronous => self.asynchronous.clone(),
        }
    }
}
