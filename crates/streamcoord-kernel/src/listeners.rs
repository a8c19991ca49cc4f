//! Listener registry (spec §4.4).
//!
//! Two kinds of listener exist: `leader` (wants the current writer pid) and
//! `local_member` (wants the running member pid on one specific node). Both
//! are re-evaluated on every command that may have changed `stream.members`,
//! and skipped entirely when it didn't (spec: "if the members map is
//! unchanged from the pre-command state, evaluation is skipped entirely").

use crate::effects::{Effect, Notification, NotificationKind};
use crate::state::{ListenerKind, ListenerPayload, MemberState, MemberTarget, Stream};

/// Re-evaluates every registered listener against the current member map,
/// emitting a notification for each one whose observed endpoint changed.
pub fn evaluate_listeners(stream: Stream, members_changed: bool) -> (Stream, Vec<Effect>) {
    if !members_changed {
        return (stream, Vec::new());
    }

    let writer_pid = stream.writer().and_then(|w| match &w.state {
        MemberState::Running(_, pid) if !matches!(stream.target, crate::state::StreamTarget::Deleted) => Some(pid.clone()),
        _ => None,
    });

    let mut effects = Vec::new();
    let mut listeners = stream.listeners.clone();

    for ((pid, kind), payload) in stream.listeners.iter() {
        match (kind, payload) {
            (ListenerKind::Leader, ListenerPayload::Leader(last)) => {
                if *last != writer_pid {
                    if let Some(new_pid) = &writer_pid {
                        effects.push(Effect::Notify(Notification {
                            to: pid.clone(),
                            queue_ref: stream.queue_ref.clone(),
                            kind: NotificationKind::LeaderChange(new_pid.clone()),
                        }));
                    }
                    listeners.insert((pid.clone(), kind.clone()), ListenerPayload::Leader(writer_pid.clone()));
                }
            }
            (ListenerKind::LocalMember(node), ListenerPayload::LocalMember(last)) => {
                let current_pid = stream.members.get(node).and_then(|m| match &m.state {
                    MemberState::Running(_, pid) if matches!(m.target, MemberTarget::Running) => Some(pid.clone()),
                    _ => None,
                });
                if *last != current_pid {
                    if let Some(new_pid) = &current_pid {
                        effects.push(Effect::Notify(Notification {
                            to: pid.clone(),
                            queue_ref: stream.queue_ref.clone(),
                            kind: NotificationKind::LocalMemberChange(new_pid.clone()),
                        }));
                    }
                    listeners.insert((pid.clone(), kind.clone()), ListenerPayload::LocalMember(current_pid));
                }
            }
            _ => {}
        }
    }

    (stream.with_listeners(listeners), effects)
}

/// End-of-life broadcast: every distinct listener pid gets exactly one
/// `eol` notification before the stream's state is dropped (spec §4.4).
pub fn eol_notifications(stream: &Stream) -> Vec<Effect> {
    stream
        .listener_pids()
        .into_iter()
        .map(|pid| {
            Effect::Notify(Notification { to: pid, queue_ref: stream.queue_ref.clone(), kind: NotificationKind::Eol })
        })
        .collect()
}
