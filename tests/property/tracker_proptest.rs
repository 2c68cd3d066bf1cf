//! Property-based tests for failure tracking and notices

use pattern_sync::offline::{MutationId, MutationTracker};
use pattern_sync::shared::clock::system_clock;
use pattern_sync::sync::{
    ConnectivityMonitor, ListenerPolicy, Notice, StatusListener, SyncStatusCoordinator,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::common::RecordingNotifier;

fn failures() -> impl Strategy<Value = Vec<(u64, usize)>> {
    prop::collection::vec((1u64..6, 0usize..3), 1..30)
}

const MESSAGES: [&str; 3] = ["network error", "conflict", "timeout"];

/// Feed failures through a tracker watched by a mounted listener
fn run_failures(sequence: &[(u64, usize)]) -> (Vec<Notice>, MutationTracker) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    runtime.block_on(async {
        let monitor = ConnectivityMonitor::new(true, Duration::from_millis(250), system_clock());
        let tracker = MutationTracker::new();
        let coordinator = SyncStatusCoordinator::new(&monitor, tracker.clone());
        let notifier = RecordingNotifier::new();
        let listener = StatusListener::new(coordinator, notifier.clone(), ListenerPolicy::default());
        listener.mount();

        for (id, message) in sequence {
            tracker.fail(MutationId(*id), MESSAGES[*message]).await;
        }
        (notifier.take(), tracker)
    })
}

proptest! {
    #[test]
    fn test_each_mutation_announced_once_in_failure_order(sequence in failures()) {
        let (notices, _) = run_failures(&sequence);

        let mut surfaced = BTreeSet::new();
        let expected: Vec<(u64, &str)> = sequence
            .iter()
            .filter(|(id, _)| surfaced.insert(*id))
            .map(|(id, message)| (*id, MESSAGES[*message]))
            .collect();
        let announced: Vec<(u64, &str)> = notices
            .iter()
            .filter_map(|notice| match notice {
                Notice::SyncFailed { mutation_id, message } => {
                    Some((mutation_id.0, message.as_str()))
                }
                _ => None,
            })
            .collect();

        prop_assert_eq!(announced, expected);
    }

    #[test]
    fn test_last_error_is_latest_failure(sequence in failures()) {
        let (_, tracker) = run_failures(&sequence);
        let distinct: BTreeSet<u64> = sequence.iter().map(|(id, _)| *id).collect();

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (len, last) = runtime.block_on(async {
            (tracker.len().await, tracker.last_error().await)
        });

        prop_assert_eq!(len, distinct.len());
        let last = last.unwrap();
        let (latest_id, latest_message) = sequence.last().unwrap();
        prop_assert_eq!(last.mutation_id, MutationId(*latest_id));
        prop_assert_eq!(last.message.as_str(), MESSAGES[*latest_message]);
    }
}
