//! Property tests for the data-model invariants.

use proptest::prelude::*;

use vectorline::identifier::ContentIdentifier;
use vectorline::pipeline::PipelineExecution;
use vectorline::request::{VectorizationRequest, VectorizationStep};
use vectorline::types::{ProcessingState, ProcessingType, StepKind};

fn step_subset() -> impl Strategy<Value = Vec<StepKind>> {
    // Any non-empty subset of the step vocabulary, in canonical order —
    // step kinds are unique within a request by invariant.
    prop::collection::vec(any::<bool>(), 4).prop_filter_map("at least one step", |mask| {
        let steps: Vec<StepKind> = StepKind::ALL
            .into_iter()
            .zip(mask)
            .filter_map(|(kind, keep)| keep.then_some(kind))
            .collect();
        (!steps.is_empty()).then_some(steps)
    })
}

fn processing_states() -> impl Strategy<Value = Vec<ProcessingState>> {
    prop::collection::vec(
        prop_oneof![
            Just(ProcessingState::New),
            Just(ProcessingState::InProgress),
            Just(ProcessingState::Completed),
            Just(ProcessingState::Failed),
        ],
        0..8,
    )
}

proptest! {
    #[test]
    fn cursor_yields_each_step_exactly_once(kinds in step_subset()) {
        let mut request = VectorizationRequest::new(
            ContentIdentifier::new("docs", vec!["a".into(), "b.txt".into()], "a/b.txt"),
            ProcessingType::Synchronous,
            kinds.iter().map(|k| VectorizationStep::new(*k)).collect(),
        );

        let mut seen = Vec::new();
        // Advance well past the end; the cursor must never run past
        // terminal no matter how often it is pushed.
        for _ in 0..(kinds.len() + 3) {
            let transition = request.move_to_next_step();
            if let Some(previous) = transition.previous {
                seen.push(previous);
            } else {
                prop_assert!(request.complete());
            }
        }
        prop_assert_eq!(seen, kinds);
        prop_assert!(request.complete());
        prop_assert_eq!(request.current_step(), None);
    }

    #[test]
    fn multipart_validation_accepts_exactly_the_expected_arity(
        parts in prop::collection::vec("[a-z]{1,6}|[ ]{0,3}", 0..6),
        expected in 0usize..6,
    ) {
        let id = ContentIdentifier::new("docs", parts.clone(), "canonical");
        let should_accept =
            parts.len() == expected && parts.iter().all(|p| !p.trim().is_empty());
        prop_assert_eq!(id.validate_multipart_id(expected).is_ok(), should_accept);
    }

    #[test]
    fn derived_pipeline_state_matches_the_specification(states in processing_states()) {
        let derived = PipelineExecution::derive_processing_state(states.iter());

        let total = states.len();
        let news = states.iter().filter(|s| **s == ProcessingState::New).count();
        let running = states.iter().filter(|s| **s == ProcessingState::InProgress).count();
        let completed = states.iter().filter(|s| **s == ProcessingState::Completed).count();
        let failed = states.iter().filter(|s| **s == ProcessingState::Failed).count();

        if total == 0 || news == total {
            prop_assert_eq!(derived, ProcessingState::New);
        } else if running > 0 {
            prop_assert_eq!(derived, ProcessingState::InProgress);
        } else if failed > 0 {
            prop_assert_eq!(derived, ProcessingState::Failed);
        } else if completed == total {
            prop_assert_eq!(derived, ProcessingState::Completed);
        } else {
            // Finished work plus not-yet-started work: still in progress.
            prop_assert_eq!(derived, ProcessingState::InProgress);
        }
    }
}
