use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use vectorline::request::VectorizationRequest;
use vectorline::services::{SynchronousVectorizationService, VectorizationService};
use vectorline::store::{ResourceStoreExt, StateStore};
use vectorline::types::{ProcessingState, ProcessingType, StepKind};

mod common;
use common::*;

fn service(
    harness: &TestHarness,
    factory: Arc<ScriptedFactory>,
) -> SynchronousVectorizationService<Arc<ScriptedFactory>> {
    SynchronousVectorizationService::new(harness.services.clone(), factory)
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn happy_path_runs_every_step_in_declared_order() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(&h, factory.clone());

    let request = full_request("doc", ProcessingType::Synchronous);
    let object_id = request.object_id.clone();
    let state_key = request.content_identifier.state_key().unwrap();

    let result = service
        .process_request(request, &identity(), CancellationToken::new())
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.error_message);
    assert_eq!(
        factory.invocations(),
        vec![
            StepKind::Extract,
            StepKind::Partition,
            StepKind::Embed,
            StepKind::Index
        ]
    );

    let stored: VectorizationRequest = h
        .resource_store
        .require_typed(&object_id, &identity())
        .await
        .unwrap();
    assert_eq!(stored.processing_state, ProcessingState::Completed);
    assert!(stored.complete());
    assert!(stored.execution_start.is_some());
    assert!(stored.execution_end.is_some());
    assert_eq!(
        stored.completed_steps,
        vec![
            StepKind::Extract,
            StepKind::Partition,
            StepKind::Embed,
            StepKind::Index
        ]
    );

    // The execution log shows each step handled once, in order.
    let state = h
        .state_store
        .read_state(&state_key)
        .await
        .unwrap()
        .expect("state persisted");
    let handled: Vec<StepKind> = state
        .log
        .iter()
        .filter(|e| e.text == "started handling step")
        .map(|e| e.step)
        .collect();
    assert_eq!(
        handled,
        vec![
            StepKind::Extract,
            StepKind::Partition,
            StepKind::Embed,
            StepKind::Index
        ]
    );
}

#[tokio::test]
async fn mid_pipeline_failure_names_the_step_and_stops() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let factory =
        Arc::new(ScriptedFactory::new().with_script(StepKind::Embed, StepScript::Fail("boom")));
    let service = service(&h, factory.clone());

    let request = full_request("doc", ProcessingType::Synchronous);
    let object_id = request.object_id.clone();

    let result = service
        .process_request(request, &identity(), CancellationToken::new())
        .await;

    assert!(!result.success);
    let message = result.error_message.expect("failure message");
    assert!(message.contains("embed"), "message was: {message}");

    // The index handler never ran.
    assert_eq!(
        factory.invocations(),
        vec![StepKind::Extract, StepKind::Partition, StepKind::Embed]
    );

    let stored: VectorizationRequest = h
        .resource_store
        .require_typed(&object_id, &identity())
        .await
        .unwrap();
    assert_eq!(stored.processing_state, ProcessingState::Failed);
    assert!(stored.execution_end.is_some());
    assert!(!stored.error_messages.is_empty());
    assert_eq!(stored.current_step(), Some(StepKind::Embed));
}

#[tokio::test]
async fn long_running_step_is_polled_until_it_resolves() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let factory = Arc::new(
        ScriptedFactory::new()
            .with_script(StepKind::Embed, StepScript::RunningThenComplete { polls: 2 }),
    );
    let service = service(&h, factory.clone());

    let request = full_request("doc", ProcessingType::Synchronous);
    let object_id = request.object_id.clone();

    let started = std::time::Instant::now();
    let result = service
        .process_request(request, &identity(), CancellationToken::new())
        .await;
    assert!(result.success);

    // Two "still running" reports mean two poll delays were observed.
    assert!(started.elapsed() >= Duration::from_millis(20));

    let embed_invocations = factory
        .invocations()
        .iter()
        .filter(|k| **k == StepKind::Embed)
        .count();
    assert_eq!(embed_invocations, 3);

    let stored: VectorizationRequest = h
        .resource_store
        .require_typed(&object_id, &identity())
        .await
        .unwrap();
    assert_eq!(stored.processing_state, ProcessingState::Completed);
    // The cursor advanced past embed exactly once.
    let embed_completions = stored
        .completed_steps
        .iter()
        .filter(|k| **k == StepKind::Embed)
        .count();
    assert_eq!(embed_completions, 1);
    let operation = stored
        .running_operation(StepKind::Embed)
        .expect("operation recorded");
    assert!(operation.complete);
}

#[tokio::test]
async fn invalid_request_is_rejected_without_leaving_new() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(&h, factory.clone());

    let mut request = full_request("doc", ProcessingType::Synchronous);
    // Tamper with the cursor so validation fails.
    request.move_to_next_step();
    let object_id = request.object_id.clone();

    let result = service
        .process_request(request, &identity(), CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(factory.invocations().is_empty());
    // Rejected requests are never persisted as started.
    let stored: Option<VectorizationRequest> = h
        .resource_store
        .get_typed(&object_id, &identity())
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn terminal_requests_stay_terminal() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(&h, factory.clone());

    let request = full_request("doc", ProcessingType::Synchronous);
    let object_id = request.object_id.clone();
    let result = service
        .process_request(request, &identity(), CancellationToken::new())
        .await;
    assert!(result.success);

    // Re-submitting the completed resource must not flip it back to
    // in-progress.
    let completed: VectorizationRequest = h
        .resource_store
        .require_typed(&object_id, &identity())
        .await
        .unwrap();
    let first_end = completed.execution_end;
    let replay = service
        .process_request(completed, &identity(), CancellationToken::new())
        .await;
    assert!(!replay.success);

    let stored: VectorizationRequest = h
        .resource_store
        .require_typed(&object_id, &identity())
        .await
        .unwrap();
    assert_eq!(stored.processing_state, ProcessingState::Completed);
    assert_eq!(stored.execution_end, first_end);
}

#[tokio::test]
async fn cancellation_leaves_the_request_in_progress() {
    let h = harness();
    seed_profiles(&h.resource_store).await;
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(&h, factory.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = full_request("doc", ProcessingType::Synchronous);
    let object_id = request.object_id.clone();
    let result = service.process_request(request, &identity(), cancel).await;

    assert!(!result.success);
    let message = result.error_message.expect("cancellation message");
    assert!(message.contains("cancel"), "message was: {message}");

    let stored: VectorizationRequest = h
        .resource_store
        .require_typed(&object_id, &identity())
        .await
        .unwrap();
    assert_eq!(stored.processing_state, ProcessingState::InProgress);
    assert!(stored.execution_end.is_none());
    // No step ran, so nothing advanced.
    assert_eq!(stored.current_step(), Some(StepKind::Extract));
}
