//! Runtime-facing capability traits (spec §9 "Source patterns requiring
//! re-architecture"). The pure state machine in `kernel`/`stream_fsm`/
//! `evaluator` never implements any of these — they are the seams a
//! concrete Raft runtime, aux worker, and cluster bootstrapper plug into.

use std::collections::BTreeSet;

use streamcoord_types::{Node, StreamId};

use crate::command::Command;
use crate::effects::AuxAction;

/// A clock abstraction, used only by `Aux` implementations for throttling
/// (spec §4.6: "graceful throttling on transient errors... via a sleep").
/// The deterministic core never reads wall-clock time itself.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Where an `Aux` implementation (or anything else running outside the
/// replicated log) injects a command so it re-enters the deterministic
/// command stream.
pub trait CommandSink: Send + Sync {
    fn inject(&self, command: Command);
}

/// The out-of-band worker contract (spec §4.6, §9 "Aux as an out-of-band
/// worker"). `submit` is asynchronous: this call only schedules the action.
/// Its eventual outcome — success or failure — is reported by injecting a
/// command through `sink`, never by a return value here.
pub trait Aux: Send + Sync {
    fn submit(&self, action: AuxAction, sink: &dyn CommandSink);

    /// Leader-change robustness (spec §4.6): for every stream not in
    /// `exclude`, synthesize `action_failed` for each stranded in-flight
    /// action.
    fn fail_active_actions(&self, exclude: &BTreeSet<StreamId>, sink: &dyn CommandSink);
}

/// First-boot cluster formation, abstracted away from any concrete
/// cluster-wide lock (spec §9 "Global startup lock"). The state machine
/// itself never depends on this; it exists so `tick`'s cluster-resize task
/// (spec §6.5) has somewhere to call.
pub trait BootstrapCoordinator: Send + Sync {
    /// Returns the subset of `members` that are confirmed started.
    fn ensure_cluster(&self, members: &[Node]) -> Vec<Node>;
}
