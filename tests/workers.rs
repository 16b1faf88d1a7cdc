//! Queue-driven worker tests: inter-step hand-off, finalization, and the
//! retry/give-up policy.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use vectorline::request::VectorizationRequest;
use vectorline::services::{
    AsynchronousVectorizationService, StepWorkerSettings, VectorizationService, WorkerHostBuilder,
};
use vectorline::sources::{RequestSourceSettings, RequestSources, RequestSourcesBuilder};
use vectorline::store::ResourceStoreExt;
use vectorline::types::{ProcessingState, ProcessingType, QueuingEngine, StepKind};

mod common;
use common::*;

async fn memory_sources() -> Arc<RequestSources> {
    Arc::new(
        RequestSourcesBuilder::new()
            .with_settings(RequestSourceSettings::for_all_steps())
            .with_queuing(QueuingEngine::Memory)
            .build()
            .await
            .unwrap(),
    )
}

fn fast_settings(step: StepKind, max_retries: u32) -> StepWorkerSettings {
    StepWorkerSettings::new(step)
        .with_max_retries(max_retries)
        .with_queue_polling_interval(Duration::from_millis(10))
        .with_queue_processing_pace(Duration::from_millis(5))
}

/// Polls the resource store until the request reaches a terminal state.
async fn wait_for_terminal(
    harness: &TestHarness,
    object_id: &str,
) -> VectorizationRequest {
    for _ in 0..500 {
        if let Some(request) = harness
            .resource_store
            .get_typed::<VectorizationRequest>(object_id, &identity())
            .await
            .unwrap()
        {
            if request.processing_state.is_terminal() {
                return request;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request {object_id} did not reach a terminal state in time");
}

#[tokio::test]
async fn workers_hand_the_request_from_step_to_step() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let sources = memory_sources().await;
    let factory = Arc::new(ScriptedFactory::new());
    let cancel = CancellationToken::new();

    let host = WorkerHostBuilder::new()
        .with_settings(vec![
            fast_settings(StepKind::Extract, 3),
            fast_settings(StepKind::Partition, 3),
        ])
        .with_sources(sources.clone())
        .with_services(h.services.clone())
        .with_factory(factory.clone())
        .with_cancellation(cancel.clone())
        .build()
        .unwrap();
    let handles = host.spawn();

    let service = AsynchronousVectorizationService::new(sources.clone(), h.resource_store.clone());
    let request = request_with_steps(
        "doc",
        ProcessingType::Asynchronous,
        &[StepKind::Extract, StepKind::Partition],
    );
    let object_id = request.object_id.clone();

    let result = service
        .process_request(request, &identity(), CancellationToken::new())
        .await;
    assert!(result.success, "submission failed: {:?}", result.error_message);

    let finished = wait_for_terminal(&h, &object_id).await;
    assert_eq!(finished.processing_state, ProcessingState::Completed);
    assert!(finished.complete());
    assert!(finished.execution_start.is_some());
    assert!(finished.execution_end.is_some());

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Each step ran exactly once: the hand-off submitted the request to the
    // partition queue exactly once.
    assert_eq!(
        factory.invocations(),
        vec![StepKind::Extract, StepKind::Partition]
    );
    let extract_source = sources.require(StepKind::Extract).unwrap();
    let partition_source = sources.require(StepKind::Partition).unwrap();
    assert!(!extract_source.has_requests().await.unwrap());
    assert!(!partition_source.has_requests().await.unwrap());
}

#[tokio::test]
async fn failing_requests_are_retried_then_given_up() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let sources = memory_sources().await;
    let factory = Arc::new(
        ScriptedFactory::new().with_script(StepKind::Extract, StepScript::Fail("no such blob")),
    );
    let cancel = CancellationToken::new();

    let host = WorkerHostBuilder::new()
        .with_settings(vec![fast_settings(StepKind::Extract, 1)])
        .with_sources(sources.clone())
        .with_services(h.services.clone())
        .with_factory(factory.clone())
        .with_cancellation(cancel.clone())
        .build()
        .unwrap();
    let handles = host.spawn();

    let service = AsynchronousVectorizationService::new(sources.clone(), h.resource_store.clone());
    let request = request_with_steps(
        "doc",
        ProcessingType::Asynchronous,
        &[StepKind::Extract, StepKind::Partition],
    );
    let object_id = request.object_id.clone();
    assert!(
        service
            .process_request(request, &identity(), CancellationToken::new())
            .await
            .success
    );

    let finished = wait_for_terminal(&h, &object_id).await;
    cancel.cancel();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(finished.processing_state, ProcessingState::Failed);
    assert!(finished.execution_end.is_some());
    // max_retries = 1 allows two attempts in total.
    assert_eq!(
        factory.invocations(),
        vec![StepKind::Extract, StepKind::Extract]
    );
    assert!(
        finished
            .error_messages
            .iter()
            .any(|m| m.contains("discarded")),
        "error messages: {:?}",
        finished.error_messages
    );

    // The request never reached the next step's queue.
    let partition_source = sources.require(StepKind::Partition).unwrap();
    assert!(!partition_source.has_requests().await.unwrap());
    // The failed current step is still extract.
    assert_eq!(finished.current_step(), Some(StepKind::Extract));
}

#[tokio::test]
async fn worker_host_builder_fails_fast_on_bad_configuration() {
    let h = harness();
    let sources = memory_sources().await;
    let factory = Arc::new(ScriptedFactory::new());

    let err = WorkerHostBuilder::new()
        .with_sources(sources.clone())
        .with_services(h.services.clone())
        .with_factory(factory.clone())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("worker settings"));

    let err = WorkerHostBuilder::new()
        .with_settings(vec![
            fast_settings(StepKind::Extract, 1),
            fast_settings(StepKind::Extract, 1),
        ])
        .with_sources(sources)
        .with_services(h.services.clone())
        .with_factory(factory)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}
