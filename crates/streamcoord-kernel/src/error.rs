//! Error kinds propagated in replies (spec §7). None of these mutate state —
//! a failed command leaves the machine exactly as it was.

use streamcoord_types::StreamId;

/// Reason `add_replica` was refused by the (non-replicated) freshness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DisallowedReason {
    #[error("replica set spans more than the allowed wall-clock skew")]
    OutOfSyncReplica,
}

/// Error kinds propagated in command replies and query results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator unavailable")]
    CoordinatorUnavailable,

    #[error("request timed out")]
    Timeout,

    #[error("not found")]
    NotFound,

    #[error("stream {0} not found")]
    StreamNotFound(StreamId),

    #[error("writer not found for stream {0}")]
    WriterNotFound(StreamId),

    #[error("refusing to remove the last member of stream {0}")]
    LastStreamMember(StreamId),

    #[error("disallowed: {0}")]
    Disallowed(DisallowedReason),

    #[error("unknown command")]
    UnknownCommand,
}
