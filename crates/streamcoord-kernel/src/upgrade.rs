//! In-place migration of persisted state between machine versions
//! (spec §9 "Legacy persisted state").
//!
//! `machine_version(from, to)` applies the migration for each integer step
//! in `[from, to)`, in order, logging one line per step — the same
//! per-step-application logging style as the teacher's migration tracker,
//! adapted from file-based tracking to an in-memory schema bump.

use std::collections::BTreeMap;

use streamcoord_types::{Pid, StreamId};

use crate::effects::{Effect, MonitorTarget};
use crate::state::{ListenerKind, ListenerPayload, MonitorPurpose, State};

/// The pre-v2 listener shape: per stream, a flat map from listener pid to
/// the last leader pid it was told about. Only `leader` listeners existed
/// before v2; `local_member` listeners were introduced alongside the
/// `(pid, kind) → payload` representation.
pub type LegacyListenersV1 = BTreeMap<StreamId, BTreeMap<Pid, Pid>>;

/// v1 → v2: rewrites `{stream_id → {pid → leader_pid}}` into
/// `stream.listeners{(pid, leader) → Leader(Some(leader_pid))}`, and emits
/// `monitor(process, pid)` for every listener pid — the v1 machine never
/// monitored them.
pub fn migrate_v1_to_v2(mut state: State, legacy: &LegacyListenersV1) -> (State, Vec<Effect>) {
    let mut effects = Vec::new();

    for (stream_id, listeners) in legacy {
        let Some(stream) = state.streams.get(stream_id).cloned() else { continue };
        let mut new_listeners = stream.listeners.clone();
        let mut newly_monitored_pids = Vec::new();

        for (pid, leader_pid) in listeners {
            let key = (pid.clone(), ListenerKind::Leader);
            new_listeners.entry(key).or_insert_with(|| ListenerPayload::Leader(Some(leader_pid.clone())));
            if !state.monitors.contains_key(pid) {
                newly_monitored_pids.push(pid.clone());
            }
        }

        state = state.with_stream(stream.with_listeners(new_listeners));
        for pid in newly_monitored_pids {
            effects.push(Effect::Monitor(MonitorTarget::Process(pid.clone())));
            state = state.with_monitor(pid, MonitorPurpose::Listener([stream_id.clone()].into_iter().collect()));
        }
    }

    tracing::info!(step = "v1_to_v2", streams_migrated = legacy.len(), "applied listener-storage migration");
    (state, effects)
}

/// v2 → v3: installs the (empty) SAC sub-machine state.
pub fn migrate_v2_to_v3(state: State) -> State {
    tracing::info!(step = "v2_to_v3", "installed empty sac state");
    state.with_sac(crate::sac::SacState::default())
}

/// Applies every migration step in `[from, to)`, in order. `legacy`
/// supplies the pre-v2 listener snapshot when the range crosses the v1→v2
/// boundary; it is ignored otherwise.
pub fn migrate(
    mut state: State,
    from: u32,
    to: u32,
    legacy: Option<&LegacyListenersV1>,
) -> (State, Vec<Effect>) {
    let mut effects = Vec::new();
    for version in from..to {
        match version {
            1 => {
                if let Some(legacy) = legacy {
                    let (next_state, next_effects) = migrate_v1_to_v2(state, legacy);
                    state = next_state;
                    effects.extend(next_effects);
                } else {
                    tracing::warn!(step = "v1_to_v2", "no legacy listener snapshot supplied; skipping");
                }
            }
            2 => {
                state = migrate_v2_to_v3(state);
            }
            other => {
                tracing::warn!(from_version = other, "no migration registered for this step; state left unchanged");
            }
        }
    }
    (state, effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamcoord_types::Node;

    #[test]
    fn v1_to_v2_rewrites_listener_keys_and_monitors() {
        let stream_id = StreamId::from("s1");
        let pid = Pid::new(Node::from("n1"), 1);
        let leader_pid = Pid::new(Node::from("n2"), 2);

        let mut legacy: LegacyListenersV1 = BTreeMap::new();
        legacy.insert(stream_id.clone(), BTreeMap::from([(pid.clone(), leader_pid.clone())]));

        let stream = crate::stream_fsm::update_stream(
            &crate::stream_fsm::StreamTransition::New {
                stream_id: stream_id.clone(),
                leader: Node::from("n2"),
                nodes: vec![Node::from("n2")],
                conf: crate::state::Conf::new(Node::from("n2"), vec![], 60),
                reply_to: None,
            },
            None,
            3,
        )
        .unwrap();
        let state = State::default().with_stream(stream);

        let (migrated, effects) = migrate_v1_to_v2(state, &legacy);
        let listeners = &migrated.streams[&stream_id].listeners;
        assert_eq!(listeners.get(&(pid.clone(), ListenerKind::Leader)), Some(&ListenerPayload::Leader(Some(leader_pid))));
        assert_eq!(effects.len(), 1);
        assert!(migrated.monitors.contains_key(&pid));
    }

    #[test]
    fn v2_to_v3_installs_sac_state() {
        let state = migrate_v2_to_v3(State::default());
        assert_eq!(state.sac, crate::sac::SacState::default());
    }

    #[test]
    fn multi_step_migration_applies_in_order() {
        let stream_id = StreamId::from("s1");
        let stream = crate::stream_fsm::update_stream(
            &crate::stream_fsm::StreamTransition::New {
                stream_id: stream_id.clone(),
                leader: Node::from("n1"),
                nodes: vec![Node::from("n1")],
                conf: crate::state::Conf::new(Node::from("n1"), vec![], 60),
                reply_to: None,
            },
            None,
            3,
        )
        .unwrap();
        let state = State::default().with_stream(stream);
        let (migrated, _effects) = migrate(state, 1, 3, Some(&BTreeMap::new()));
        assert_eq!(migrated.sac, crate::sac::SacState::default());
    }
}
