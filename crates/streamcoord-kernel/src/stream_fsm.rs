//! The Stream FSM (spec §4.2: `update_stream`).
//!
//! Pure and total by construction: every transition below either matches an
//! expected precondition and produces a new `Stream`, or falls through to
//! `None`/unchanged. The one place this function is allowed to panic is a
//! violated internal invariant (an `assert!`) — `kernel::apply` wraps the
//! call in `catch_unwind` so a violation degrades to "stream left
//! unchanged, warning logged" rather than taking down the whole machine
//! (spec: "any exception is caught and yields the pre-command stream
//! unchanged").

use std::collections::BTreeMap;

use streamcoord_types::{quorum_size, Epoch, Index, Node, Pid, StreamId, Tail};

use crate::command::DownReason;
use crate::election::select_leader;
use crate::state::{
    ActionTag, CatalogState, CatalogStatus, Conf, ListenerKind, ListenerPayload, Member, MemberState,
    MemberTarget, ReplyTo, Role, Stream, StreamTarget,
};

/// A stream-scoped event, resolved by the dispatcher from the wire
/// `Command` (and, for `Down`/`NodeUp`, from the monitor registry) before
/// being handed to `update_stream`.
#[derive(Debug, Clone)]
pub enum StreamTransition {
    New { stream_id: StreamId, leader: Node, nodes: Vec<Node>, conf: Conf, reply_to: Option<ReplyTo> },
    Delete,
    AddReplica(Node),
    DeleteReplica(Node),
    PolicyChanged(Conf),
    MemberStarted { node: Node, epoch: Epoch, index: Index, pid: Pid },
    MemberStopped { node: Node, epoch: Epoch, index: Index, tail: Tail },
    MemberDeleted(Node),
    RetentionUpdated(Node),
    CatalogUpdated(Epoch),
    ActionFailed { node: Node, index: Index, action: ActionTag },
    RegisterListener { pid: Pid, kind: ListenerKind },
    WriterDown(Node),
    ReplicaDown { node: Node, pid: Pid, reason: DownReason, index: Index },
    NodeUp(Node),
}

/// Applies one `transition` to `stream` (`None` only valid for `New`),
/// returning the resulting stream or `None` if the stream is now destroyed.
pub fn update_stream(
    transition: &StreamTransition,
    stream: Option<Stream>,
    machine_version: u32,
) -> Option<Stream> {
    match transition {
        StreamTransition::New { stream_id, leader, nodes, conf, reply_to } => {
            assert!(stream.is_none(), "new_stream routed to an existing stream");
            Some(new_stream(stream_id.clone(), leader.clone(), nodes.clone(), conf.clone(), *reply_to))
        }
        StreamTransition::Delete => stream.map(delete_stream),
        StreamTransition::AddReplica(node) => stream.map(|s| add_replica(s, node.clone())),
        StreamTransition::DeleteReplica(node) => stream.map(|s| delete_replica(s, node)),
        StreamTransition::PolicyChanged(conf) => stream.map(|s| policy_changed(s, conf.clone())),
        StreamTransition::MemberStarted { node, epoch, index: started_index, pid } => {
            stream.map(|s| member_started(s, node, *epoch, *started_index, pid.clone()))
        }
        StreamTransition::MemberStopped { node, epoch, index: stopped_index, tail } => {
            stream.and_then(|s| member_stopped(s, node, *epoch, *stopped_index, *tail, machine_version))
        }
        StreamTransition::MemberDeleted(node) => stream.and_then(|s| member_deleted(s, node)),
        StreamTransition::RetentionUpdated(node) => stream.map(|s| retention_updated(s, node)),
        StreamTransition::CatalogUpdated(epoch) => stream.map(|s| catalog_updated(s, *epoch)),
        StreamTransition::ActionFailed { node, index: failed_index, action } => {
            stream.map(|s| action_failed(s, node, *failed_index, *action))
        }
        StreamTransition::RegisterListener { pid, kind } => {
            stream.map(|s| register_listener(s, pid.clone(), kind.clone()))
        }
        StreamTransition::WriterDown(node) => stream.map(|s| writer_down(s, node)),
        StreamTransition::ReplicaDown { node, pid, reason, index } => {
            stream.map(|s| replica_down(s, node, pid.clone(), reason, *index))
        }
        StreamTransition::NodeUp(node) => stream.map(|s| node_up(s, node)),
    }
}

fn new_stream(stream_id: StreamId, leader: Node, nodes: Vec<Node>, conf: Conf, reply_to: Option<ReplyTo>) -> Stream {
    let epoch = Epoch::INITIAL;
    let mut members = BTreeMap::new();
    for node in &nodes {
        let role = if *node == leader { Role::writer(epoch) } else { Role::replica(epoch) };
        members.insert(node.clone(), Member::new(node.clone(), role, conf.clone()));
    }
    let queue_ref = format!("{leader}");
    Stream {
        id: stream_id,
        epoch,
        nodes,
        members,
        queue_ref,
        conf,
        target: StreamTarget::Running,
        reply_to,
        catalog_state: CatalogState::default(),
        listeners: BTreeMap::new(),
    }
}

fn delete_stream(stream: Stream) -> Stream {
    let members = stream
        .members
        .into_iter()
        .map(|(node, member)| (node, member.with_target(MemberTarget::Deleted)))
        .collect();
    stream.with_members(members).with_reply_to(None).with_target(StreamTarget::Deleted)
}

/// Stops every currently-running member so a full stop+elect round runs
/// (spec §4.2 "force-cycle").
fn force_cycle_running_to_stopped(stream: Stream) -> Stream {
    let members = stream
        .members
        .into_iter()
        .map(|(node, member)| {
            if matches!(member.target, MemberTarget::Running) {
                (node, member.with_target(MemberTarget::Stopped))
            } else {
                (node, member)
            }
        })
        .collect();
    stream.with_members(members)
}

fn add_replica(stream: Stream, node: Node) -> Stream {
    if stream.members.contains_key(&node) {
        return stream;
    }
    let epoch = stream.epoch;
    let conf = stream.conf.clone();
    let member = Member::new(node.clone(), Role::replica(epoch), conf).with_target(MemberTarget::Stopped);
    let mut nodes = stream.nodes.clone();
    nodes.push(node.clone());
    let stream = stream.with_nodes(nodes).with_member(member);
    force_cycle_running_to_stopped(stream)
}

fn delete_replica(stream: Stream, node: &Node) -> Stream {
    let members = stream
        .members
        .into_iter()
        .map(|(n, member)| {
            if &n == node {
                (n, member.with_target(MemberTarget::Deleted))
            } else if matches!(member.target, MemberTarget::Running) {
                (n, member.with_target(MemberTarget::Stopped))
            } else {
                (n, member)
            }
        })
        .collect();
    stream.with_members(members)
}

fn policy_changed(stream: Stream, conf: Conf) -> Stream {
    stream.with_conf(conf)
}

fn member_started(stream: Stream, node: &Node, epoch: Epoch, started_index: Index, pid: Pid) -> Stream {
    let Some(member) = stream.members.get(node) else { return stream };
    let matches = matches!(member.current, Some((ActionTag::Starting, idx)) if idx == started_index)
        && member.role.epoch == epoch
        && pid.node() == node;
    if !matches {
        // spec §9 open question: index/epoch mismatch is logged and ignored, never propagated.
        return stream;
    }
    let member = member.clone().with_state(MemberState::Running(epoch, pid)).with_current(None);
    stream.with_member(member)
}

fn member_stopped(
    stream: Stream,
    node: &Node,
    reported_epoch: Epoch,
    stopped_index: Index,
    tail: Tail,
    machine_version: u32,
) -> Option<Stream> {
    let Some(member) = stream.members.get(node) else { return Some(stream) };
    let matches = matches!(member.current, Some((ActionTag::Stopping, idx)) if idx == stopped_index);
    if !matches {
        return Some(stream);
    }

    // Shortcut: a writer is already ready/running in the current epoch and
    // targeted to run — this replica is just catching up past an election
    // that already happened.
    if !member.role.is_writer() {
        if let Some(writer) = stream.writer() {
            let writer_settled = matches!(writer.state, MemberState::Ready(e) | MemberState::Running(e, _) if e == stream.epoch)
                && matches!(writer.target, MemberTarget::Running);
            if writer_settled {
                // Same target reset as the main path below: a confirmed stop
                // always makes the member an election candidate again,
                // restoring `target = running` so the Evaluator starts it
                // instead of re-stopping it.
                let target = if matches!(member.target, MemberTarget::Stopped) { MemberTarget::Running } else { member.target };
                let updated = member.clone().with_target(target).with_state(MemberState::Ready(stream.epoch)).with_current(None);
                let stream = stream.with_member(updated);
                return Some(stream);
            }
        }
    }

    // `target = stopped` only ever means "mid force-cycle, restart pending"
    // (spec §4.2: force-cycle is how add_replica/writer_down/action_failed
    // drive a stop+elect round) — a genuine permanent removal instead drives
    // `target = deleted`. So a confirmed stop always makes the member an
    // election candidate again, restoring `target = running`.
    let target = if matches!(member.target, MemberTarget::Stopped) { MemberTarget::Running } else { member.target };
    let updated = member.clone().with_state(MemberState::Stopped(reported_epoch, tail)).with_target(target).with_current(None);
    let stream = stream.with_member(updated);

    if reported_epoch != stream.epoch {
        // Stale stop confirmation from a previous epoch's stop request;
        // target is retried by the Evaluator, no election eligibility yet.
        return Some(stream);
    }

    try_elect(stream, machine_version)
}

/// Counts members stopped at the current epoch and still targeted to run;
/// if they form a quorum of `nodes`, elects the next writer.
fn try_elect(stream: Stream, machine_version: u32) -> Option<Stream> {
    let candidates: Vec<(Node, Tail)> = stream
        .members
        .values()
        .filter(|m| matches!(m.target, MemberTarget::Running) && m.state.is_stopped_at(stream.epoch))
        .filter_map(|m| match m.state {
            MemberState::Stopped(_, tail) => Some((m.node.clone(), tail)),
            _ => None,
        })
        .collect();

    if candidates.len() < quorum_size(stream.nodes.len()) {
        return Some(stream);
    }

    let Some(new_writer) = select_leader(&candidates, machine_version) else {
        return Some(stream);
    };

    let next = stream.epoch.next();
    let members = stream
        .members
        .into_iter()
        .map(|(node, member)| {
            if member.is_deleted_target() {
                return (node, member);
            }
            let role = if node == new_writer { Role::writer(next) } else { Role::replica(next) };
            (node, member.with_role(role).with_state(MemberState::Ready(next)))
        })
        .collect();

    Some(stream.with_members(members).with_epoch(next))
}

fn member_deleted(stream: Stream, node: &Node) -> Option<Stream> {
    let stream = stream.without_member(node);
    if stream.members.is_empty() {
        None
    } else {
        Some(stream)
    }
}

fn retention_updated(stream: Stream, node: &Node) -> Stream {
    let Some(member) = stream.members.get(node) else { return stream };
    let conf = stream.conf.clone();
    let updated = member.clone().with_current(None).with_conf(conf);
    stream.with_member(updated)
}

fn catalog_updated(stream: Stream, epoch: Epoch) -> Stream {
    stream.with_catalog_state(CatalogState { status: CatalogStatus::Updated, epoch })
}

fn action_failed(stream: Stream, node: &Node, failed_index: Index, action: ActionTag) -> Stream {
    let Some(member) = stream.members.get(node) else { return stream };
    let matches = matches!(member.current, Some((tag, idx)) if tag == action && idx == failed_index);
    if !matches {
        return stream;
    }
    let cleared = member.clone().with_current(None);
    let stream = stream.with_member(cleared.clone());

    let writer_start_failed =
        cleared.role.is_writer() && action == ActionTag::Starting && matches!(cleared.state, MemberState::Ready(e) if e == stream.epoch);
    if writer_start_failed {
        force_cycle_running_to_stopped(stream)
    } else {
        stream
    }
}

fn register_listener(stream: Stream, pid: Pid, kind: ListenerKind) -> Stream {
    let payload = match &kind {
        ListenerKind::Leader => ListenerPayload::Leader(None),
        ListenerKind::LocalMember(_) => ListenerPayload::LocalMember(None),
    };
    let mut listeners = stream.listeners.clone();
    listeners.entry((pid, kind)).or_insert(payload);
    stream.with_listeners(listeners)
}

fn writer_down(stream: Stream, node: &Node) -> Stream {
    let Some(member) = stream.members.get(node) else { return stream };
    let epoch = match member.state.epoch() {
        Some(e) => e,
        None => return stream,
    };
    let down = member.clone().with_state(MemberState::Down(epoch));
    let stream = stream.with_member(down);
    force_cycle_running_to_stopped(stream)
}

fn replica_down(stream: Stream, node: &Node, pid: Pid, reason: &DownReason, index: Index) -> Stream {
    let Some(member) = stream.members.get(node) else { return stream };
    let epoch = match member.state.epoch() {
        Some(e) => e,
        None => return stream,
    };
    let mut updated = member.clone();
    if matches!(reason, DownReason::NoConnection) {
        // Pause the Evaluator on this member until `node_up` reports the
        // node reachable again; otherwise it would keep re-scheduling aux
        // actions no process can currently receive.
        updated = updated.with_state(MemberState::Disconnected(epoch, pid)).with_current(Some((ActionTag::Sleeping, index)));
    } else {
        updated = updated.with_state(MemberState::Down(epoch));
    }
    stream.with_member(updated)
}

fn node_up(stream: Stream, node: &Node) -> Stream {
    let Some(member) = stream.members.get(node) else { return stream };
    if matches!(member.current, Some((ActionTag::Sleeping, _))) {
        stream.with_member(member.clone().with_current(None))
    } else {
        stream
    }
}
