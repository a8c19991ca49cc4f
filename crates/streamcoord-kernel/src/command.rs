//! Inbound commands recognized by the dispatcher (spec §4.1 table).

use serde::{Deserialize, Serialize};
use streamcoord_types::{Epoch, Index, Node, Pid, StreamId, Tail};

use crate::sac::SacCommand;
use crate::state::{ActionTag, Conf, ListenerKind};

/// Metadata the runtime attaches to every command (spec §4.1: "`meta`
/// carries at least `index`, `system_time`, and `machine_version`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub index: Index,
    pub system_time_ms: u64,
    pub machine_version: u32,
}

/// Why the runtime reported a pid as down (spec §4.2 `down(pid)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownReason {
    Crashed,
    NoConnection,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    NewStream {
        stream_id: StreamId,
        leader: Node,
        nodes: Vec<Node>,
        conf: Conf,
    },
    DeleteStream {
        stream_id: StreamId,
    },
    AddReplica {
        stream_id: StreamId,
        node: Node,
    },
    DeleteReplica {
        stream_id: StreamId,
        node: Node,
    },
    PolicyChanged {
        stream_id: StreamId,
        conf: Conf,
    },
    MemberStarted {
        stream_id: StreamId,
        node: Node,
        epoch: Epoch,
        index: Index,
        pid: Pid,
    },
    MemberStopped {
        stream_id: StreamId,
        node: Node,
        epoch: Epoch,
        index: Index,
        tail: Tail,
    },
    MemberDeleted {
        stream_id: StreamId,
        node: Node,
    },
    RetentionUpdated {
        stream_id: StreamId,
        node: Node,
    },
    CatalogUpdated {
        stream_id: StreamId,
        epoch: Epoch,
    },
    ActionFailed {
        stream_id: StreamId,
        node: Node,
        index: Index,
        action: ActionTag,
    },
    RegisterListener {
        pid: Pid,
        stream_id: StreamId,
        kind: ListenerKind,
    },
    Down {
        pid: Pid,
        reason: DownReason,
    },
    NodeUp {
        node: Node,
    },
    Sac(SacCommand),
    MachineVersion {
        from: u32,
        to: u32,
    },
    /// A wire tag the dispatcher does not recognize (spec §4.1 table, last
    /// row): replied to with `error(unknown_command)`, no state change.
    Unknown(String),
}

impl Command {
    /// The stream this command is routed to, if any. Cluster-wide commands
    /// (`Down`, `NodeUp`, `Sac`, `MachineVersion`) return `None` — the
    /// dispatcher handles those without selecting a single stream first.
    pub fn stream_id(&self) -> Option<&StreamId> {
        match self {
            Command::NewStream { stream_id, .. }
            | Command::DeleteStream { stream_id }
            | Command::AddReplica { stream_id, .. }
            | Command::DeleteReplica { stream_id, .. }
            | Command::PolicyChanged { stream_id, .. }
            | Command::MemberStarted { stream_id, .. }
            | Command::MemberStopped { stream_id, .. }
            | Command::MemberDeleted { stream_id, .. }
            | Command::RetentionUpdated { stream_id, .. }
            | Command::CatalogUpdated { stream_id, .. }
            | Command::ActionFailed { stream_id, .. }
            | Command::RegisterListener { stream_id, .. } => Some(stream_id),
            Command::Down { .. }
            | Command::NodeUp { .. }
            | Command::Sac(_)
            | Command::MachineVersion { .. } => None,
        }
    }
}
