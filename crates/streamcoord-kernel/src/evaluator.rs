//! The Evaluator (spec §4.3: `evaluate_stream`).
//!
//! Idempotent by construction: every rule below only fires when
//! `current = None` and leaves `current` set afterwards, so re-running the
//! evaluator against its own output emits nothing new (spec invariant 6).
//! This module also folds in the listener (§4.4) and monitor (§4.5)
//! registries, since both are driven from the same per-command walk over
//! `stream.members`.

use std::collections::BTreeSet;

use streamcoord_types::{Epoch, Pid};

use crate::command::Meta;
use crate::effects::{AuxAction, AuxActionKind, AuxMeta, Effect, MonitorTarget, Reply};
use crate::listeners;
use crate::state::{
    ActionTag, CatalogState, CatalogStatus, Conf, Member, MemberState, MemberTarget, MonitorPurpose, RoleKind, Stream,
};

/// Result of a single evaluation pass: the (possibly updated) stream, the
/// effects to hand the runtime, and any newly-discovered pids the monitor
/// registry must start tracking (the caller owns `State::monitors`, so the
/// additions are returned rather than applied here).
pub struct EvaluationOutcome {
    pub stream: Stream,
    pub effects: Vec<Effect>,
    pub new_monitors: Vec<(Pid, MonitorPurpose)>,
}

pub fn evaluate_stream(
    meta: &Meta,
    mut stream: Stream,
    members_changed: bool,
    already_monitored: &BTreeSet<Pid>,
) -> EvaluationOutcome {
    let mut effects = Vec::new();
    let stream_id = stream.id.clone();
    let stream_conf = stream.conf.clone();
    let leader_running = stream.writer().and_then(|w| match &w.state {
        MemberState::Running(epoch, pid) => Some((*epoch, pid.clone())),
        _ => None,
    });

    let mut new_catalog_state = stream.catalog_state;
    let mut clear_reply_to = false;
    let mut updated = stream.members.clone();

    for (node, member) in stream.members.iter() {
        if member.role.kind == RoleKind::Writer {
            if let Some((new_member, effect)) = evaluate_writer_action(meta, &stream_id, member, &stream_conf) {
                updated.insert(node.clone(), new_member);
                effects.push(effect);
            } else if let MemberState::Running(epoch, pid) = &member.state {
                if matches!(member.target, MemberTarget::Running)
                    && catalog_state_is_behind(&stream.catalog_state, *epoch)
                {
                    new_catalog_state = CatalogState { status: CatalogStatus::Updating, epoch: *epoch };
                    if let Some(reply_to) = stream.reply_to {
                        effects.push(Effect::DeliverReply { reply_to, reply: Reply::OkWithPid(pid.clone()) });
                        clear_reply_to = true;
                    }
                    effects.push(Effect::Aux(AuxAction {
                        stream_id: stream_id.clone(),
                        meta: AuxMeta { index: meta.index, epoch: *epoch, node: node.clone() },
                        conf: stream_conf.clone(),
                        kind: AuxActionKind::UpdateCatalog,
                    }));
                }
            }
        } else if let Some((new_member, effect)) = evaluate_replica_action(meta, &stream_id, member, &stream_conf, leader_running.as_ref())
        {
            updated.insert(node.clone(), new_member);
            effects.push(effect);
        }
    }

    // Retention sweep (spec §4.3 `eval_retention`).
    for (node, member) in updated.clone().into_iter() {
        if member.current.is_none()
            && matches!(member.target, MemberTarget::Running)
            && member.conf.retention_secs != stream_conf.retention_secs
        {
            effects.push(Effect::Aux(AuxAction {
                stream_id: stream_id.clone(),
                meta: AuxMeta { index: meta.index, epoch: member.role.epoch, node: node.clone() },
                conf: stream_conf.clone(),
                kind: AuxActionKind::UpdateRetention,
            }));
            updated.insert(node, member.with_current(Some((ActionTag::Updating, meta.index))));
        }
    }

    stream = stream.with_members(updated).with_catalog_state(new_catalog_state);
    if clear_reply_to {
        stream = stream.with_reply_to(None);
    }

    let mut new_monitors = Vec::new();
    for member in stream.members.values() {
        if let MemberState::Running(_, pid) = &member.state {
            if !already_monitored.contains(pid) {
                effects.push(Effect::Monitor(MonitorTarget::Process(pid.clone())));
                effects.push(Effect::Monitor(MonitorTarget::Node(member.node.clone())));
                new_monitors.push((pid.clone(), MonitorPurpose::Member(stream_id.clone(), member.node.clone())));
            }
        }
    }

    let (stream, listener_effects) = listeners::evaluate_listeners(stream, members_changed);
    effects.extend(listener_effects);

    EvaluationOutcome { stream, effects, new_monitors }
}

/// Whether the stream's `catalog_state` still reflects an epoch older than
/// the running writer's (spec §4.3 rule 4).
pub fn catalog_state_is_behind(catalog_state: &CatalogState, writer_epoch: Epoch) -> bool {
    matches!(catalog_state.status, CatalogStatus::Updated) && catalog_state.epoch < writer_epoch
}

/// Writer rules 1, 2, 3, 5 (spec §4.3), checked in order; rule 4 (catalog
/// sync) is handled by the caller since it mutates stream-level
/// `catalog_state` rather than `member.current`.
fn evaluate_writer_action(
    meta: &Meta,
    stream_id: &streamcoord_types::StreamId,
    member: &Member,
    conf: &Conf,
) -> Option<(Member, Effect)> {
    if member.current.is_some() {
        return None;
    }
    // Rule 1: deletion.
    if matches!(member.target, MemberTarget::Deleted) && !matches!(member.state, MemberState::Deleted) {
        return Some(aux_action(meta, stream_id, member, conf, AuxActionKind::DeleteMember, ActionTag::Deleting));
    }
    // Rule 2: down and targeted to stop.
    if matches!(member.state, MemberState::Down(_)) && matches!(member.target, MemberTarget::Stopped) {
        return Some(aux_action(meta, stream_id, member, conf, AuxActionKind::Stop, ActionTag::Stopping));
    }
    // Rule 3: ready and targeted to run.
    if matches!(member.state, MemberState::Ready(_)) && matches!(member.target, MemberTarget::Running) {
        return Some(aux_action(meta, stream_id, member, conf, AuxActionKind::StartWriter, ActionTag::Starting));
    }
    // Rule 5: not stopped yet but targeted to stop.
    if !matches!(member.state, MemberState::Stopped(..)) && matches!(member.target, MemberTarget::Stopped) {
        return Some(aux_action(meta, stream_id, member, conf, AuxActionKind::Stop, ActionTag::Stopping));
    }
    None
}

/// Replica rules (spec §4.3), evaluated relative to the current writer.
fn evaluate_replica_action(
    meta: &Meta,
    stream_id: &streamcoord_types::StreamId,
    member: &Member,
    conf: &Conf,
    leader_running: Option<&(Epoch, Pid)>,
) -> Option<(Member, Effect)> {
    if member.current.is_some() {
        return None;
    }
    if matches!(member.target, MemberTarget::Stopped) {
        return Some(aux_action(meta, stream_id, member, conf, AuxActionKind::Stop, ActionTag::Stopping));
    }
    if matches!(member.target, MemberTarget::Deleted) && !matches!(member.state, MemberState::Deleted) {
        return Some(aux_action(meta, stream_id, member, conf, AuxActionKind::DeleteMember, ActionTag::Deleting));
    }
    if matches!(member.target, MemberTarget::Running) {
        let eligible = matches!(member.state, MemberState::Ready(_) | MemberState::Down(_));
        if eligible {
            if let Some((epoch, pid)) = leader_running {
                if *epoch == member.role.epoch {
                    return Some(aux_action(
                        meta,
                        stream_id,
                        member,
                        conf,
                        AuxActionKind::StartReplica { leader_pid: pid.clone() },
                        ActionTag::Starting,
                    ));
                }
            }
        }
    }
    None
}

fn aux_action(
    meta: &Meta,
    stream_id: &streamcoord_types::StreamId,
    member: &Member,
    conf: &Conf,
    kind: AuxActionKind,
    tag: ActionTag,
) -> (Member, Effect) {
    let new_member = member.clone().with_current(Some((tag, meta.index)));
    let effect = Effect::Aux(AuxAction {
        stream_id: stream_id.clone(),
        meta: AuxMeta { index: meta.index, epoch: member.role.epoch, node: member.node.clone() },
        conf: conf.clone(),
        kind,
    });
    (new_member, effect)
}
