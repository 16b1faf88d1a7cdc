//! # Vectorline: Vectorization Pipeline Execution Engine
//!
//! Vectorline turns a content-vectorization request into a sequence of
//! durable, resumable processing steps — extract → partition → embed →
//! index — with per-step progress tracking, partial-failure handling, and
//! both synchronous (in-process) and asynchronous (queue-driven) execution.
//!
//! ## Core Concepts
//!
//! - **Requests**: The unit of work — content reference, ordered step list,
//!   and a cursor over completed/remaining steps
//! - **State**: Durable per-content artifact record, so retries and resumes
//!   never redo finished steps
//! - **Request Sources**: Named queues (memory or SQLite) holding requests
//!   awaiting a step
//! - **Step Handlers**: One pluggable handler per step kind, created by a
//!   factory and safe to poll for long-running operations
//! - **Services**: The synchronous state machine, the queue-submitting
//!   asynchronous service, and per-step workers
//! - **Pipelines**: Triggerable definitions spawning request batches, with
//!   derived aggregate status
//!
//! ## Quick Start
//!
//! ### Describing work
//!
//! ```rust
//! use vectorline::identifier::ContentIdentifier;
//! use vectorline::request::{VectorizationRequest, VectorizationStep};
//! use vectorline::types::{ProcessingType, StepKind};
//!
//! let request = VectorizationRequest::new(
//!     ContentIdentifier::new(
//!         "docs-store",
//!         vec!["tenant".into(), "reports".into(), "q3.txt".into()],
//!         "tenant/reports/q3.txt",
//!     ),
//!     ProcessingType::Synchronous,
//!     vec![
//!         VectorizationStep::new(StepKind::Extract),
//!         VectorizationStep::new(StepKind::Partition)
//!             .with_parameter("text_partitioning_profile_name", "default"),
//!         VectorizationStep::new(StepKind::Embed)
//!             .with_parameter("text_embedding_profile_name", "default"),
//!         VectorizationStep::new(StepKind::Index)
//!             .with_parameter("indexing_profile_name", "default"),
//!     ],
//! );
//!
//! assert_eq!(request.current_step(), Some(StepKind::Extract));
//! assert!(request.validate_for_submission().is_ok());
//! ```
//!
//! ### Building the request source cache
//!
//! ```rust,no_run
//! use vectorline::sources::{RequestSourceSettings, RequestSourcesBuilder};
//! use vectorline::types::QueuingEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Built once at startup; immutable (and lock-free) afterwards.
//! let sources = RequestSourcesBuilder::new()
//!     .with_settings(RequestSourceSettings::for_all_steps())
//!     .with_queuing(QueuingEngine::Memory)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Configuration errors fail fast at build time; validation errors reject a
//! request while it is still `New`; step execution errors are caught at the
//! service boundary and converted into a terminal `Failed` state plus a
//! structured [`types::VectorizationResult`]. Callers branch on
//! `result.success`, never on exceptions.
//!
//! ## Module Guide
//!
//! - [`types`] - Step kinds, lifecycle states, processing modes
//! - [`identifier`] - Multi-part content identifiers and state keys
//! - [`request`] - Requests, steps, and the execution cursor
//! - [`state`] - Durable artifacts and the execution log
//! - [`pipeline`] - Pipeline definitions and execution aggregation
//! - [`profiles`] - Typed profile resources for step configuration
//! - [`steps`] - Pluggable extract/partition/embed/index contracts
//! - [`handlers`] - The step handler framework and factory
//! - [`sources`] - Memory and durable request sources
//! - [`store`] - Resource and state storage seams
//! - [`services`] - Synchronous/asynchronous services, workers, pipelines
//! - [`telemetry`] - Tracing initialization helper

pub mod config;
pub mod handlers;
pub mod identifier;
pub mod pipeline;
pub mod profiles;
pub mod request;
pub mod services;
pub mod sources;
pub mod state;
pub mod steps;
pub mod store;
pub mod telemetry;
pub mod types;
