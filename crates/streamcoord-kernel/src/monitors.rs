//! Monitor registry (spec §4.5).
//!
//! The evaluator (`evaluator::evaluate_stream`) handles the steady-state
//! case of discovering newly-running member pids; this module covers the
//! two remaining cases named in spec §4.5: monitoring a newly-registered
//! listener pid, and re-issuing every tracked monitor after the replicated
//! machine itself changes leader.

use streamcoord_types::{Node, Pid};

use crate::effects::{Effect, MonitorTarget};
use crate::state::{MonitorPurpose, Stream};

/// Effects to monitor a newly-registered listener pid (spec §4.5:
/// "When a listener is registered: emit `monitor(process, pid)`").
pub fn monitor_for_new_listener(pid: &Pid) -> Vec<Effect> {
    vec![Effect::Monitor(MonitorTarget::Process(pid.clone()))]
}

/// Also watch the node a disconnected pid lives on, so `nodeup` is observed
/// (spec §4.5: "When a down has reason noconnection: also emit
/// monitor(node, node(pid))").
pub fn monitor_node_for_disconnected(node: &Node) -> Vec<Effect> {
    vec![Effect::Monitor(MonitorTarget::Node(node.clone()))]
}

/// Re-issues `monitor(process, pid)` for every tracked pid and
/// `monitor(node, n)` for every node appearing in any member, on a leader
/// transition of the replicated machine itself (spec §4.5).
pub fn remonitor_on_leader_transition(
    monitors: impl IntoIterator<Item = Pid>,
    streams: impl IntoIterator<Item = Node>,
) -> Vec<Effect> {
    let mut effects: Vec<Effect> = monitors.into_iter().map(|pid| Effect::Monitor(MonitorTarget::Process(pid))).collect();
    effects.extend(streams.into_iter().map(|node| Effect::Monitor(MonitorTarget::Node(node))));
    effects
}

/// Every distinct node referenced by any member of `stream`, for the
/// leader-transition re-monitor sweep.
pub fn nodes_of(stream: &Stream) -> impl Iterator<Item = Node> + '_ {
    stream.members.keys().cloned()
}

pub fn purpose_for_listener(stream_ids: impl IntoIterator<Item = streamcoord_types::StreamId>) -> MonitorPurpose {
    MonitorPurpose::Listener(stream_ids.into_iter().collect())
}
