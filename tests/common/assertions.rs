//! Custom assertion macros
//!
//! Shorthands for the checks most tests repeat on status snapshots and
//! recorded notices.

/// Assert the failure exposed by a snapshot
///
/// `assert_last_error!(snapshot, None)` checks that nothing is exposed.
#[macro_export]
macro_rules! assert_last_error {
    ($snapshot:expr, None) => {
        assert_eq!(
            $snapshot.last_error_mutation_id, None,
            "expected no exposed failure, got {:?}",
            $snapshot.last_error_message
        );
    };
    ($snapshot:expr, $id:expr, $message:expr) => {
        assert_eq!(
            $snapshot.last_error_mutation_id,
            Some(pattern_sync::offline::MutationId($id)),
            "unexpected exposed mutation"
        );
        assert_eq!(
            $snapshot.last_error_message.as_deref(),
            Some($message),
            "unexpected exposed message"
        );
    };
}

/// Assert how many `SyncFailed` notices a list contains
#[macro_export]
macro_rules! assert_failure_notices {
    ($notices:expr, $count:expr) => {
        let failures = $notices
            .iter()
            .filter(|n| matches!(n, pattern_sync::sync::Notice::SyncFailed { .. }))
            .count();
        assert_eq!(failures, $count, "notices: {:?}", $notices);
    };
}
