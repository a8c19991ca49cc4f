//! The dispatcher (spec §4.1: `apply`) — the single deterministic entry
//! point. Everything else in this crate is plumbing `apply` wires together:
//! `stream_fsm::update_stream` advances one stream's FSM, `evaluator::
//! evaluate_stream` turns the result into aux/monitor/listener effects, and
//! this module resolves cluster-wide commands to a stream, enforces the
//! command-level guards spec.md lists outside the FSM itself (refusing to
//! delete a stream's last member, rejecting unknown wire tags), and applies
//! the release-cursor policy.
//!
//! `update_stream` is the only place this machine is allowed to panic (an
//! internal `assert!` on a violated precondition); `apply` catches it so a
//! violation degrades to "stream left unchanged, warning logged" rather
//! than crashing the whole machine (spec: "any exception in update_stream
//! is caught; state is left unchanged; a warning is logged").

use std::panic::{self, AssertUnwindSafe};

use streamcoord_types::{Node, Pid, StreamId};

use crate::command::{Command, DownReason, Meta};
use crate::effects::{Effect, ReleaseCursor, Reply};
use crate::error::CoordinatorError;
use crate::evaluator::{self, EvaluationOutcome};
use crate::listeners;
use crate::monitors;
use crate::sac::SacMachine;
use crate::state::{MonitorPurpose, ReplyTo, State, Stream};
use crate::stream_fsm::{self, StreamTransition};

/// Commands are nudged to snapshot a release cursor every this many applied
/// indexes (spec §4.1, §6.4). Chosen to match the teacher's own log
/// checkpoint cadence.
pub const RELEASE_CURSOR_INTERVAL: u64 = 4096;

/// Applies one command to `state`, returning the new state, the synchronous
/// reply, and the effects the runtime must carry out (spec §4.1: "Input:
/// `(meta, command, state)`... Output: `(state', reply, effects)`").
pub fn apply(meta: Meta, command: Command, state: State) -> (State, Reply, Vec<Effect>) {
    let (state, reply, mut effects) = apply_inner(&meta, command, state);

    if meta.index.is_release_cursor_boundary(RELEASE_CURSOR_INTERVAL) {
        let state_hash = state.compute_state_hash();
        effects.push(Effect::ReleaseCursor(ReleaseCursor { index: meta.index, state_hash }));
    }

    (state, reply, effects)
}

fn apply_inner(meta: &Meta, command: Command, mut state: State) -> (State, Reply, Vec<Effect>) {
    match command {
        Command::NewStream { stream_id, leader, nodes, conf } => {
            if state.stream_exists(&stream_id) {
                // Replaying an already-applied create is a no-op success,
                // not an error: the log may legitimately redeliver it.
                return (state, Reply::NoReply, Vec::new());
            }
            let reply_to = Some(ReplyTo(meta.index));
            let transition = StreamTransition::New { stream_id: stream_id.clone(), leader, nodes, conf, reply_to };
            let (state, effects) = route(meta, state, &stream_id, transition, false);
            (state, Reply::NoReply, effects)
        }

        Command::DeleteStream { stream_id } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let (state, effects) = route(meta, state, &stream_id, StreamTransition::Delete, false);
            (state, Reply::Ok, effects)
        }

        Command::AddReplica { stream_id, node } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let (state, effects) = route(meta, state, &stream_id, StreamTransition::AddReplica(node), false);
            (state, Reply::Ok, effects)
        }

        Command::DeleteReplica { stream_id, node } => {
            let Some(stream) = state.stream(&stream_id) else {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            };
            let non_deleted = stream
                .members
                .values()
                .filter(|m| !matches!(m.target, crate::state::MemberTarget::Deleted))
                .count();
            let target_is_non_deleted = stream
                .members
                .get(&node)
                .map(|m| !matches!(m.target, crate::state::MemberTarget::Deleted))
                .unwrap_or(false);
            let remaining = if target_is_non_deleted { non_deleted.saturating_sub(1) } else { non_deleted };
            if remaining < 2 {
                return (state, Reply::Error(CoordinatorError::LastStreamMember(stream_id)), Vec::new());
            }
            let (state, effects) = route(meta, state, &stream_id, StreamTransition::DeleteReplica(node), false);
            (state, Reply::Ok, effects)
        }

        Command::PolicyChanged { stream_id, conf } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let (state, effects) = route(meta, state, &stream_id, StreamTransition::PolicyChanged(conf), false);
            (state, Reply::Ok, effects)
        }

        Command::MemberStarted { stream_id, node, epoch, index, pid } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let transition = StreamTransition::MemberStarted { node, epoch, index, pid };
            let (state, effects) = route(meta, state, &stream_id, transition, false);
            (state, Reply::Ok, effects)
        }

        Command::MemberStopped { stream_id, node, epoch, index, tail } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let transition = StreamTransition::MemberStopped { node, epoch, index, tail };
            let (state, effects) = route(meta, state, &stream_id, transition, false);
            (state, Reply::Ok, effects)
        }

        Command::MemberDeleted { stream_id, node } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let (state, effects) = route(meta, state, &stream_id, StreamTransition::MemberDeleted(node), false);
            (state, Reply::Ok, effects)
        }

        Command::RetentionUpdated { stream_id, node } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let (state, effects) = route(meta, state, &stream_id, StreamTransition::RetentionUpdated(node), false);
            (state, Reply::Ok, effects)
        }

        Command::CatalogUpdated { stream_id, epoch } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let (state, effects) = route(meta, state, &stream_id, StreamTransition::CatalogUpdated(epoch), false);
            (state, Reply::Ok, effects)
        }

        Command::ActionFailed { stream_id, node, index, action } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let transition = StreamTransition::ActionFailed { node, index, action };
            let (state, effects) = route(meta, state, &stream_id, transition, false);
            (state, Reply::Ok, effects)
        }

        Command::RegisterListener { pid, stream_id, kind } => {
            if !state.stream_exists(&stream_id) {
                return (state, Reply::Error(CoordinatorError::StreamNotFound(stream_id)), Vec::new());
            }
            let transition = StreamTransition::RegisterListener { pid: pid.clone(), kind };
            let (mut state, mut effects) = route(meta, state, &stream_id, transition, true);

            let already_watched = state.monitors.contains_key(&pid);
            let purpose = match state.monitors.remove(&pid) {
                Some(MonitorPurpose::Listener(mut ids)) => {
                    ids.insert(stream_id.clone());
                    MonitorPurpose::Listener(ids)
                }
                Some(other) => other,
                None => monitors::purpose_for_listener([stream_id.clone()]),
            };
            state = state.with_monitor(pid.clone(), purpose);
            if !already_watched {
                effects.extend(monitors::monitor_for_new_listener(&pid));
            }
            (state, Reply::Ok, effects)
        }

        Command::Down { pid, reason } => handle_down(meta, state, pid, reason),

        Command::NodeUp { node } => {
            let mut effects = Vec::new();
            let stream_ids: Vec<StreamId> = state
                .streams
                .iter()
                .filter(|(_, stream)| stream.members.contains_key(&node))
                .map(|(id, _)| id.clone())
                .collect();
            for stream_id in stream_ids {
                let (next_state, next_effects) = route(meta, state, &stream_id, StreamTransition::NodeUp(node.clone()), false);
                state = next_state;
                effects.extend(next_effects);
            }
            (state, Reply::Ok, effects)
        }

        Command::Sac(cmd) => {
            let (sac, effects) = state.sac.clone().apply(&cmd);
            state = state.with_sac(sac);
            (state, Reply::Ok, effects)
        }

        Command::MachineVersion { from, to } => {
            // A legacy pre-v2 listener snapshot, when one exists, is
            // supplied out of band by the bootstrap path that calls
            // `upgrade::migrate` directly before replay re-enters `apply`;
            // from here the v1 step is a documented no-op.
            let (state, effects) = crate::upgrade::migrate(state, from, to, None);
            (state, Reply::Ok, effects)
        }

        Command::Unknown(_tag) => (state, Reply::Error(CoordinatorError::UnknownCommand), Vec::new()),
    }
}

fn handle_down(meta: &Meta, mut state: State, pid: Pid, reason: DownReason) -> (State, Reply, Vec<Effect>) {
    let Some(purpose) = state.monitors.get(&pid).cloned() else {
        return (state, Reply::Ok, Vec::new());
    };

    match purpose {
        MonitorPurpose::Sac => {
            let (sac, effects) = state.sac.clone().handle_down(&pid);
            state = state.with_sac(sac).without_monitor(&pid);
            (state, Reply::Ok, effects)
        }
        MonitorPurpose::Listener(stream_ids) => {
            state = state.without_monitor(&pid);
            for stream_id in &stream_ids {
                if let Some(stream) = state.streams.get(stream_id).cloned() {
                    let listeners = stream.listeners.clone().into_iter().filter(|((p, _), _)| p != &pid).collect();
                    state = state.with_stream(stream.with_listeners(listeners));
                }
            }
            (state, Reply::Ok, Vec::new())
        }
        MonitorPurpose::Member(stream_id, node) => {
            state = state.without_monitor(&pid);
            let is_writer = state
                .streams
                .get(&stream_id)
                .and_then(|s| s.members.get(&node))
                .map(|m| m.role.is_writer())
                .unwrap_or(false);
            let is_no_connection = matches!(reason, DownReason::NoConnection);

            let transition = if is_writer {
                StreamTransition::WriterDown(node.clone())
            } else {
                StreamTransition::ReplicaDown { node: node.clone(), pid, reason, index: meta.index }
            };
            let (state, mut effects) = route(meta, state, &stream_id, transition, false);
            if is_no_connection {
                effects.extend(monitors::monitor_node_for_disconnected(&node));
            }
            (state, Reply::Ok, effects)
        }
    }
}

/// Routes one stream-scoped `transition` through `update_stream` and, if the
/// stream survives, the Evaluator — merging the result back into `state`.
/// `force_listener_eval` bypasses the "members map unchanged" skip for
/// transitions (like `register_listener`) that change listener-visible
/// state without touching `stream.members`.
fn route(
    meta: &Meta,
    mut state: State,
    stream_id: &StreamId,
    transition: StreamTransition,
    force_listener_eval: bool,
) -> (State, Vec<Effect>) {
    let existing = state.streams.get(stream_id).cloned();
    let members_before = existing.as_ref().map(|s| s.members.clone());
    let machine_version = meta.machine_version;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stream_fsm::update_stream(&transition, existing.clone(), machine_version)));

    let new_stream = match outcome {
        Ok(new_stream) => new_stream,
        Err(_) => {
            tracing::warn!(%stream_id, ?transition, "update_stream panicked; stream left unchanged");
            return (state, Vec::new());
        }
    };

    match new_stream {
        None => {
            let mut effects = Vec::new();
            if let Some(destroyed) = existing {
                effects.extend(listeners::eol_notifications(&destroyed));
                state = cleanup_destroyed_stream(state, stream_id, &destroyed);
            }
            (state, effects)
        }
        Some(stream) => {
            let members_changed = force_listener_eval || members_before.as_ref() != Some(&stream.members);
            let already_monitored: std::collections::BTreeSet<Pid> = state.monitors.keys().cloned().collect();
            let EvaluationOutcome { stream, effects, new_monitors } =
                evaluator::evaluate_stream(meta, stream, members_changed, &already_monitored);
            state = state.with_stream(stream);
            for (pid, purpose) in new_monitors {
                state = state.with_monitor(pid, purpose);
            }
            (state, effects)
        }
    }
}

/// Drops a destroyed stream's entry and unwinds everything `State::monitors`
/// was tracking on its behalf: member monitors for this stream disappear
/// outright, listener monitors lose this stream from their set (and
/// disappear too if it was the only one left).
fn cleanup_destroyed_stream(mut state: State, stream_id: &StreamId, destroyed: &Stream) -> State {
    state = state.without_stream(stream_id);

    let member_pids: Vec<Pid> = destroyed.members.values().filter_map(|m| m.state.pid()).collect();
    for pid in member_pids {
        if matches!(state.monitors.get(&pid), Some(MonitorPurpose::Member(sid, _)) if sid == stream_id) {
            state = state.without_monitor(&pid);
        }
    }

    let mut to_remove = Vec::new();
    let mut to_update = Vec::new();
    for (pid, purpose) in &state.monitors {
        if let MonitorPurpose::Listener(stream_ids) = purpose {
            if stream_ids.contains(stream_id) {
                let mut remaining = stream_ids.clone();
                remaining.remove(stream_id);
                if remaining.is_empty() {
                    to_remove.push(pid.clone());
                } else {
                    to_update.push((pid.clone(), MonitorPurpose::Listener(remaining)));
                }
            }
        }
    }
    for pid in to_remove {
        state = state.without_monitor(&pid);
    }
    for (pid, purpose) in to_update {
        state = state.with_monitor(pid, purpose);
    }

    state
}

/// The current writer's pid, if the stream exists and its writer is running
/// (spec §5: `writer_pid` query).
pub fn writer_pid(state: &State, stream_id: &StreamId) -> Result<Pid, CoordinatorError> {
    let stream = state.stream(stream_id).ok_or_else(|| CoordinatorError::StreamNotFound(stream_id.clone()))?;
    stream.writer().and_then(|w| w.state.pid()).ok_or_else(|| CoordinatorError::WriterNotFound(stream_id.clone()))
}

/// The running pid for one specific node of a stream, if any (spec §5:
/// `local_pid` query).
pub fn local_pid(state: &State, stream_id: &StreamId, node: &Node) -> Result<Option<Pid>, CoordinatorError> {
    let stream = state.stream(stream_id).ok_or_else(|| CoordinatorError::StreamNotFound(stream_id.clone()))?;
    Ok(stream.members.get(node).and_then(|m| m.state.pid()))
}

/// Every member of a stream as `(node, running_pid, is_writer)`, in node
/// order (spec §5: `members` query, also the shape of `Reply::Members`).
pub fn members(state: &State, stream_id: &StreamId) -> Result<Vec<(Node, Option<Pid>, bool)>, CoordinatorError> {
    let stream = state.stream(stream_id).ok_or_else(|| CoordinatorError::StreamNotFound(stream_id.clone()))?;
    Ok(stream
        .members
        .iter()
        .map(|(node, member)| (node.clone(), member.state.pid(), member.role.is_writer()))
        .collect())
}

/// All streams currently hosted on `node`, for a `BootstrapCoordinator` or
/// an operator query that needs a node-scoped view (spec §9).
pub fn streams_on_node(state: &State, node: &Node) -> Vec<StreamId> {
    state.streams.iter().filter(|(_, s)| s.members.contains_key(node)).map(|(id, _)| id.clone()).collect()
}
