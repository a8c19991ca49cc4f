//! Cluster membership reconciliation (spec §6.5): `tick` compares the
//! external cluster roster against the Raft runtime's current membership
//! and produces `add_member`/`remove_member` RPCs for the caller to issue.
//! Out of scope: the Raft runtime's own membership storage, and node
//! discovery that produces the roster in the first place (spec §1) — this
//! module only computes the diff and tracks the single-in-flight gate.

use std::collections::BTreeSet;

use streamcoord_types::Node;

/// One membership change the caller must RPC to the Raft runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    AddMember(Node),
    RemoveMember(Node),
}

/// Computes the diff between the runtime's current membership and the
/// external roster. Order is deterministic (`BTreeSet` iteration) but
/// otherwise carries no meaning — the caller issues each RPC independently
/// and re-tries failures on the next tick (spec §6.5: "best-effort;
/// joins/leaves that fail are re-tried on the next tick").
pub fn diff_membership(current: &BTreeSet<Node>, roster: &BTreeSet<Node>) -> Vec<MembershipChange> {
    let mut changes: Vec<MembershipChange> =
        roster.difference(current).cloned().map(MembershipChange::AddMember).collect();
    changes.extend(current.difference(roster).cloned().map(MembershipChange::RemoveMember));
    changes
}

/// Gates `tick`'s cluster-resize task to a single in-flight resizer process
/// (spec §6.5: "gated by a single in-flight resizer process per tick").
#[derive(Debug, Default)]
pub struct ResizeGate {
    in_flight: bool,
}

impl ResizeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to start a resize; `false` if one is already running.
    pub fn try_start(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Marks the in-flight resizer as finished, whether it succeeded or
    /// every RPC failed (failures are re-tried on a later tick, not by
    /// keeping this one running).
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Node {
        Node::from(name)
    }

    #[test]
    fn diff_reports_joins_and_leaves() {
        let current: BTreeSet<Node> = [node("n1"), node("n2")].into_iter().collect();
        let roster: BTreeSet<Node> = [node("n2"), node("n3")].into_iter().collect();

        let changes = diff_membership(&current, &roster);
        assert!(changes.contains(&MembershipChange::AddMember(node("n3"))));
        assert!(changes.contains(&MembershipChange::RemoveMember(node("n1"))));
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn no_diff_when_equal() {
        let set: BTreeSet<Node> = [node("n1")].into_iter().collect();
        assert!(diff_membership(&set, &set).is_empty());
    }

    #[test]
    fn gate_refuses_concurrent_resize() {
        let mut gate = ResizeGate::new();
        assert!(gate.try_start());
        assert!(!gate.try_start());
        gate.finish();
        assert!(gate.try_start());
    }
}
