//! The `add_replica` freshness gate (spec §7, §9 open question: "the source
//! places it in the caller; the spec follows that placement — it is not
//! replicated"). Lives here rather than in `streamcoord-kernel` because it
//! reads live wall-clock offsets from the current writer, which the
//! deterministic core must never depend on.

use std::time::Duration;

use streamcoord_kernel::{CoordinatorError, DisallowedReason};
use streamcoord_types::Node;

/// One replica's last-observed write offset and when it was observed, as
/// read from the current writer before `add_replica` is submitted.
#[derive(Debug, Clone)]
pub struct ReplicaFreshness {
    pub node: Node,
    pub observed_at: Duration,
}

/// Refuses `add_replica` if the existing replicas' observation timestamps
/// span more than `max_skew` (spec §7: "more than 10 seconds of wall-clock
/// skew"). An empty or single-replica set never spans any skew.
pub fn check_freshness(replicas: &[ReplicaFreshness], max_skew: Duration) -> Result<(), CoordinatorError> {
    let (Some(min), Some(max)) = (
        replicas.iter().map(|r| r.observed_at).min(),
        replicas.iter().map(|r| r.observed_at).max(),
    ) else {
        return Ok(());
    };

    if max - min > max_skew {
        return Err(CoordinatorError::Disallowed(DisallowedReason::OutOfSyncReplica));
    }
    Ok(())
}
