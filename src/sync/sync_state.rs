//! # Sync Status Snapshot
//!
//! Immutable read model handed to status subscribers, and the transitions
//! derived by comparing two snapshots.
//!
//! ## Features
//!
//! - **Sequence numbers**: every published snapshot carries a strictly
//!   increasing `seq`, so subscribers can drop anything they already saw
//! - **Handled marker**: `last_handled_failure_seq` is the first-failure
//!   sequence of the newest failure already surfaced; a failure is announced
//!   only when it advances, so a mutation is announced once however often it
//!   fails and in whatever order ids fail
//! - **Transition diff**: [`SyncStatusSnapshot::transitions_since`] turns two
//!   snapshots into the events a listener must announce

use serde::{Deserialize, Serialize};

use crate::offline::tracker::MutationId;

/// Read model published by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    /// Publication sequence number
    pub seq: u64,
    /// Debounced connectivity
    pub is_online: bool,
    /// Message of the most recently failed mutation
    pub last_error_message: Option<String>,
    /// Id of the most recently failed mutation
    pub last_error_mutation_id: Option<MutationId>,
    /// Mutation whose failure was surfaced last
    pub last_handled_mutation_id: Option<MutationId>,
    /// First-failure sequence of that mutation, 0 before any failure
    pub last_handled_failure_seq: u64,
}

/// Event a listener announces once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTransition {
    /// Online to offline
    WentOffline,
    /// Offline to online
    CameOnline,
    /// A mutation failed that was not surfaced before
    MutationFailed {
        /// Failing mutation
        mutation_id: MutationId,
        /// Its failure message
        message: String,
    },
}

impl SyncStatusSnapshot {
    /// First snapshot of a session
    pub fn initial(is_online: bool) -> Self {
        Self {
            seq: 0,
            is_online,
            last_error_message: None,
            last_error_mutation_id: None,
            last_handled_mutation_id: None,
            last_handled_failure_seq: 0,
        }
    }

    /// Whether a failed mutation is currently exposed
    pub fn has_error(&self) -> bool {
        self.last_error_mutation_id.is_some()
    }

    /// Whether both snapshots expose the same state, ignoring `seq`
    pub fn same_state(&self, other: &Self) -> bool {
        self.is_online == other.is_online
            && self.last_error_message == other.last_error_message
            && self.last_error_mutation_id == other.last_error_mutation_id
            && self.last_handled_mutation_id == other.last_handled_mutation_id
            && self.last_handled_failure_seq == other.last_handled_failure_seq
    }

    /// Transitions that lead from `previous` to this snapshot
    ///
    /// Connectivity comes first. A failure is reported only when the handled
    /// marker advanced, which is what keeps repeated failures of a surfaced
    /// mutation silent.
    pub fn transitions_since(&self, previous: &Self) -> Vec<StatusTransition> {
        let mut transitions = Vec::new();

        if self.is_online != previous.is_online {
            transitions.push(if self.is_online {
                StatusTransition::CameOnline
            } else {
                StatusTransition::WentOffline
            });
        }

        if self.last_handled_failure_seq > previous.last_handled_failure_seq {
            if let (Some(mutation_id), Some(message)) =
                (self.last_error_mutation_id, &self.last_error_message)
            {
                transitions.push(StatusTransition::MutationFailed {
                    mutation_id,
                    message: message.clone(),
                });
            }
        }

        transitions
    }
}
