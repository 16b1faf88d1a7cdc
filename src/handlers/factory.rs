//! Step handler factory.
//!
//! Handlers are created per invocation, keyed by the step kind and
//! configured from the step's parameters. The factory is a seam: the
//! default [`ProfileStepHandlerFactory`] wires the profile-driven handlers
//! in this crate, while tests substitute scripted handlers.

use std::sync::Arc;

use crate::request::VectorizationStep;
use crate::types::StepKind;

use super::{
    EmbedHandler, ExtractHandler, HandlerError, HandlerServices, IndexHandler, PartitionHandler,
    StepHandler,
};

/// Creates the handler for one step of one request.
pub trait StepHandlerFactory: Send + Sync {
    /// Builds a handler for `step`, parsing its parameters into typed
    /// settings. Configuration problems (unknown parameters, missing
    /// profile names) surface here, before the step runs.
    fn create(
        &self,
        step: &VectorizationStep,
        message_id: &str,
        services: Arc<HandlerServices>,
    ) -> Result<Box<dyn StepHandler>, HandlerError>;
}

impl<F: StepHandlerFactory + ?Sized> StepHandlerFactory for Arc<F> {
    fn create(
        &self,
        step: &VectorizationStep,
        message_id: &str,
        services: Arc<HandlerServices>,
    ) -> Result<Box<dyn StepHandler>, HandlerError> {
        (**self).create(step, message_id, services)
    }
}

/// Default factory wiring the profile-driven handlers.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProfileStepHandlerFactory;

impl ProfileStepHandlerFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StepHandlerFactory for ProfileStepHandlerFactory {
    fn create(
        &self,
        step: &VectorizationStep,
        message_id: &str,
        services: Arc<HandlerServices>,
    ) -> Result<Box<dyn StepHandler>, HandlerError> {
        Ok(match step.id {
            StepKind::Extract => Box::new(ExtractHandler::from_step(step, message_id, services)?),
            StepKind::Partition => {
                Box::new(PartitionHandler::from_step(step, message_id, services)?)
            }
            StepKind::Embed => Box::new(EmbedHandler::from_step(step, message_id, services)?),
            StepKind::Index => Box::new(IndexHandler::from_step(step, message_id, services)?),
        })
    }
}
