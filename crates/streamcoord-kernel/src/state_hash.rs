//! Deterministic state hashing (spec §8 invariant 5: "the same ordered
//! sequence applied to two fresh initial states yields byte-identical
//! states"). A BLAKE3 hash over a fixed, `BTreeMap`-ordered traversal of
//! every field lets two replicas (or a test replaying the same command log
//! twice) confirm they converged without comparing the full state byte for
//! byte. Modeled directly on the teacher's own `compute_state_hash`.

use streamcoord_types::{Epoch, Index, Node, Pid, StreamId, Tail};

use crate::state::{
    ActionTag, CatalogStatus, Conf, ListenerKind, ListenerPayload, MemberState, MemberTarget, MonitorPurpose, RoleKind,
    State, StreamTarget,
};

impl State {
    /// Computes a 32-byte BLAKE3 digest over the entire machine state.
    /// `BTreeMap` iteration is already key-sorted, so this is deterministic
    /// across processes and platforms.
    pub fn compute_state_hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();

        hasher.update(&(self.streams.len() as u64).to_le_bytes());
        for (stream_id, stream) in &self.streams {
            hash_stream_id(&mut hasher, stream_id);
            hasher.update(&stream.epoch.as_u64().to_le_bytes());
            hasher.update(&[match stream.target {
                StreamTarget::Running => 0u8,
                StreamTarget::Deleted => 1,
            }]);
            hasher.update(stream.queue_ref.as_bytes());
            hasher.update(&(stream.nodes.len() as u64).to_le_bytes());
            for node in &stream.nodes {
                hash_node(&mut hasher, node);
            }
            hash_conf(&mut hasher, &stream.conf);
            hasher.update(&[match stream.catalog_state.status {
                CatalogStatus::Updated => 0u8,
                CatalogStatus::Updating => 1,
            }]);
            hasher.update(&stream.catalog_state.epoch.as_u64().to_le_bytes());

            hasher.update(&(stream.members.len() as u64).to_le_bytes());
            for (node, member) in &stream.members {
                hash_node(&mut hasher, node);
                hasher.update(&[match member.role.kind {
                    RoleKind::Writer => 0u8,
                    RoleKind::Replica => 1,
                }]);
                hasher.update(&member.role.epoch.as_u64().to_le_bytes());
                hash_member_state(&mut hasher, &member.state);
                hasher.update(&[match member.target {
                    MemberTarget::Running => 0u8,
                    MemberTarget::Stopped => 1,
                    MemberTarget::Deleted => 2,
                }]);
                hash_conf(&mut hasher, &member.conf);
                match &member.current {
                    None => hasher.update(&[0u8]),
                    Some((tag, index)) => {
                        hasher.update(&[1u8]);
                        hash_action_tag(&mut hasher, tag);
                        hash_index(&mut hasher, *index);
                    }
                };
            }

            hasher.update(&(stream.listeners.len() as u64).to_le_bytes());
            for ((pid, kind), payload) in &stream.listeners {
                hash_pid(&mut hasher, pid);
                hash_listener_kind(&mut hasher, kind);
                hash_listener_payload(&mut hasher, payload);
            }
        }

        hasher.update(&(self.monitors.len() as u64).to_le_bytes());
        for (pid, purpose) in &self.monitors {
            hash_pid(&mut hasher, pid);
            hash_monitor_purpose(&mut hasher, purpose);
        }

        *hasher.finalize().as_bytes()
    }
}

fn hash_stream_id(hasher: &mut blake3::Hasher, id: &StreamId) {
    let bytes = id.as_bytes();
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn hash_node(hasher: &mut blake3::Hasher, node: &Node) {
    let bytes = node.as_str().as_bytes();
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn hash_conf(hasher: &mut blake3::Hasher, conf: &Conf) {
    hasher.update(&conf.retention_secs.to_le_bytes());
    hash_node(hasher, &conf.leader_node);
    hasher.update(&(conf.replica_nodes.len() as u64).to_le_bytes());
    for node in &conf.replica_nodes {
        hash_node(hasher, node);
    }
    hasher.update(&conf.epoch.as_u64().to_le_bytes());
    hasher.update(&(conf.reference.len() as u64).to_le_bytes());
    hasher.update(conf.reference.as_bytes());
}

fn hash_pid(hasher: &mut blake3::Hasher, pid: &Pid) {
    hash_node(hasher, pid.node());
    hasher.update(&pid.token().to_le_bytes());
}

fn hash_index(hasher: &mut blake3::Hasher, index: Index) {
    hasher.update(&index.as_u64().to_le_bytes());
}

fn hash_epoch(hasher: &mut blake3::Hasher, epoch: Epoch) {
    hasher.update(&epoch.as_u64().to_le_bytes());
}

fn hash_tail(hasher: &mut blake3::Hasher, tail: &Tail) {
    match tail {
        Tail::Empty => hasher.update(&[0u8]),
        Tail::At(epoch, offset) => {
            hasher.update(&[1u8]);
            hash_epoch(hasher, *epoch);
            hasher.update(&offset.as_u64().to_le_bytes());
        }
    };
}

fn hash_member_state(hasher: &mut blake3::Hasher, state: &MemberState) {
    match state {
        MemberState::Ready(epoch) => {
            hasher.update(&[0u8]);
            hash_epoch(hasher, *epoch);
        }
        MemberState::Running(epoch, pid) => {
            hasher.update(&[1u8]);
            hash_epoch(hasher, *epoch);
            hash_pid(hasher, pid);
        }
        MemberState::Stopped(epoch, tail) => {
            hasher.update(&[2u8]);
            hash_epoch(hasher, *epoch);
            hash_tail(hasher, tail);
        }
        MemberState::Disconnected(epoch, pid) => {
            hasher.update(&[3u8]);
            hash_epoch(hasher, *epoch);
            hash_pid(hasher, pid);
        }
        MemberState::Down(epoch) => {
            hasher.update(&[4u8]);
            hash_epoch(hasher, *epoch);
        }
        MemberState::Deleted => hasher.update(&[5u8]),
    };
}

fn hash_action_tag(hasher: &mut blake3::Hasher, tag: &ActionTag) {
    let byte = match tag {
        ActionTag::Starting => 0u8,
        ActionTag::Stopping => 1,
        ActionTag::Deleting => 2,
        ActionTag::Updating => 3,
        ActionTag::Sleeping => 4,
    };
    hasher.update(&[byte]);
}

fn hash_listener_kind(hasher: &mut blake3::Hasher, kind: &ListenerKind) {
    match kind {
        ListenerKind::Leader => hasher.update(&[0u8]),
        ListenerKind::LocalMember(node) => {
            hasher.update(&[1u8]);
            hash_node(hasher, node);
        }
    };
}

fn hash_listener_payload(hasher: &mut blake3::Hasher, payload: &ListenerPayload) {
    match payload {
        ListenerPayload::Leader(pid) | ListenerPayload::LocalMember(pid) => match pid {
            None => hasher.update(&[0u8]),
            Some(pid) => {
                hasher.update(&[1u8]);
                hash_pid(hasher, pid);
            }
        },
    };
}

fn hash_monitor_purpose(hasher: &mut blake3::Hasher, purpose: &MonitorPurpose) {
    match purpose {
        MonitorPurpose::Member(stream_id, node) => {
            hasher.update(&[0u8]);
            hash_stream_id(hasher, stream_id);
            hash_node(hasher, node);
        }
        MonitorPurpose::Listener(stream_ids) => {
            hasher.update(&[1u8]);
            hasher.update(&(stream_ids.len() as u64).to_le_bytes());
            for id in stream_ids {
                hash_stream_id(hasher, id);
            }
        }
        MonitorPurpose::Sac => hasher.update(&[2u8]),
    };
}
