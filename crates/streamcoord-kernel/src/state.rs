//! Data model (spec §3): `Conf`, `Member`, `Stream`, and the global `State`.
//!
//! Every mutator here takes `self` by value and returns `Self` — the same
//! builder style as the command-dispatch layer, so a transition reads as a
//! chain of `state.with_x(..).with_y(..)` rather than a sequence of `&mut`
//! statements. Fields are `pub`, but by convention outside code only ever
//! touches state through `kernel::apply` and the read-only query functions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use streamcoord_types::{Epoch, Index, Node, Pid, StreamId, Tail};

use crate::sac::SacState;

/// The configuration snapshot shipped to members for an epoch. The machine
/// only reads `retention` and rewrites `leader_node`/`replica_nodes`/`epoch`
/// on each election; everything else (`reference`) passes through opaquely
/// (spec §9 open question: "leave the type opaque").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conf {
    pub retention_secs: u64,
    pub leader_node: Node,
    pub replica_nodes: Vec<Node>,
    pub epoch: Epoch,
    pub reference: String,
}

impl Conf {
    pub fn new(leader_node: Node, replica_nodes: Vec<Node>, retention_secs: u64) -> Self {
        Self {
            retention_secs,
            leader_node,
            replica_nodes,
            epoch: Epoch::INITIAL,
            reference: String::new(),
        }
    }

    #[must_use]
    pub fn with_retention_secs(mut self, retention_secs: u64) -> Self {
        self.retention_secs = retention_secs;
        self
    }

    #[must_use]
    pub fn with_epoch_and_roles(mut self, epoch: Epoch, leader_node: Node, replica_nodes: Vec<Node>) -> Self {
        self.epoch = epoch;
        self.leader_node = leader_node;
        self.replica_nodes = replica_nodes;
        self
    }
}

/// Whether a member is the stream's writer or one of its replicas, tagged
/// with the epoch it was assigned that role in (spec §3.2: `role`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleKind {
    Writer,
    Replica,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub kind: RoleKind,
    pub epoch: Epoch,
}

impl Role {
    pub fn writer(epoch: Epoch) -> Self {
        Self { kind: RoleKind::Writer, epoch }
    }

    pub fn replica(epoch: Epoch) -> Self {
        Self { kind: RoleKind::Replica, epoch }
    }

    pub fn is_writer(&self) -> bool {
        matches!(self.kind, RoleKind::Writer)
    }
}

/// Observed state of a member's log process (spec §3.2: `state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    /// Constructed but not yet started in this epoch.
    Ready(Epoch),
    /// Process alive and serving.
    Running(Epoch, Pid),
    /// Gracefully stopped in `epoch`, tail reported.
    Stopped(Epoch, Tail),
    /// Last-known pid, node unreachable.
    Disconnected(Epoch, Pid),
    /// Known-dead pid.
    Down(Epoch),
    /// Terminal, to be removed.
    Deleted,
}

impl MemberState {
    /// The epoch this state was recorded in, if any (invariant 2: `state.epoch ≤ stream.epoch`).
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            MemberState::Ready(e)
            | MemberState::Running(e, _)
            | MemberState::Stopped(e, _)
            | MemberState::Disconnected(e, _)
            | MemberState::Down(e) => Some(*e),
            MemberState::Deleted => None,
        }
    }

    pub fn pid(&self) -> Option<Pid> {
        match self {
            MemberState::Running(_, pid) | MemberState::Disconnected(_, pid) => Some(pid.clone()),
            _ => None,
        }
    }

    pub fn is_stopped_at(&self, epoch: Epoch) -> bool {
        matches!(self, MemberState::Stopped(e, _) if *e == epoch)
    }
}

/// The desired state of a member (spec §3.2: `target`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberTarget {
    Running,
    Stopped,
    Deleted,
}

/// An aux action tag, recorded on `Member::current` while the action is in
/// flight (spec §3.2, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionTag {
    Starting,
    Stopping,
    Deleting,
    Updating,
    /// Waiting on a `nodeup` signal before the Evaluator may act again
    /// (spec §4.2 `nodeup`).
    Sleeping,
}

/// At most one in-flight aux action, tagged with the index of the command
/// that scheduled it (spec invariant 3).
pub type Current = Option<(ActionTag, Index)>;

/// One replica's desired and observed state on one node for one stream
/// (spec §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub node: Node,
    pub role: Role,
    pub state: MemberState,
    pub target: MemberTarget,
    pub current: Current,
    pub conf: Conf,
}

impl Member {
    pub fn new(node: Node, role: Role, conf: Conf) -> Self {
        let epoch = role.epoch;
        Self {
            node,
            role,
            state: MemberState::Ready(epoch),
            target: MemberTarget::Running,
            current: None,
            conf,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: MemberState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: MemberTarget) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_current(mut self, current: Current) -> Self {
        self.current = current;
        self
    }

    #[must_use]
    pub fn with_conf(mut self, conf: Conf) -> Self {
        self.conf = conf;
        self
    }

    pub fn is_deleted_target(&self) -> bool {
        matches!(self.target, MemberTarget::Deleted)
    }
}

/// Whether a stream as a whole should keep running or is being torn down
/// (spec §3.3: `target`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamTarget {
    Running,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogStatus {
    Updated,
    Updating,
}

/// The last epoch whose writer was published to the external catalog
/// (spec §3.3: `catalog_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogState {
    pub status: CatalogStatus,
    pub epoch: Epoch,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self { status: CatalogStatus::Updated, epoch: Epoch::new(0) }
    }
}

/// The two kinds of endpoint-interest a listener can register (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ListenerKind {
    Leader,
    LocalMember(Node),
}

/// Last-notified endpoint for a listener, so re-evaluation only notifies on
/// change (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerPayload {
    Leader(Option<Pid>),
    LocalMember(Option<Pid>),
}

/// Opaque reply address: the index of the command awaiting a reply
/// (spec §3.3: `reply_to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo(pub Index);

/// A stream: a replicated append-only queue and the set of members that
/// host it (spec §3.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub epoch: Epoch,
    pub nodes: Vec<Node>,
    pub members: BTreeMap<Node, Member>,
    pub queue_ref: String,
    pub conf: Conf,
    pub target: StreamTarget,
    pub reply_to: Option<ReplyTo>,
    pub catalog_state: CatalogState,
    pub listeners: BTreeMap<(Pid, ListenerKind), ListenerPayload>,
}

impl Stream {
    #[must_use]
    pub fn with_epoch(mut self, epoch: Epoch) -> Self {
        self.epoch = epoch;
        self
    }

    #[must_use]
    pub fn with_members(mut self, members: BTreeMap<Node, Member>) -> Self {
        self.members = members;
        self
    }

    #[must_use]
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.insert(member.node.clone(), member);
        self
    }

    #[must_use]
    pub fn without_member(mut self, node: &Node) -> Self {
        self.members.remove(node);
        self.nodes.retain(|n| n != node);
        self
    }

    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = nodes;
        self
    }

    #[must_use]
    pub fn with_conf(mut self, conf: Conf) -> Self {
        self.conf = conf;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: StreamTarget) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: Option<ReplyTo>) -> Self {
        self.reply_to = reply_to;
        self
    }

    #[must_use]
    pub fn with_catalog_state(mut self, catalog_state: CatalogState) -> Self {
        self.catalog_state = catalog_state;
        self
    }

    #[must_use]
    pub fn with_listeners(mut self, listeners: BTreeMap<(Pid, ListenerKind), ListenerPayload>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Current writer, if any member holds `role.kind = Writer`.
    pub fn writer(&self) -> Option<&Member> {
        self.members.values().find(|m| m.role.is_writer())
    }

    /// Every distinct pid that has ever registered a listener on this
    /// stream, used for the end-of-life broadcast.
    pub fn listener_pids(&self) -> BTreeSet<Pid> {
        self.listeners.keys().map(|(pid, _)| pid.clone()).collect()
    }
}

/// What an external pid is being watched for, so a `down(pid)` can be
/// routed without a linear scan (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorPurpose {
    Member(StreamId, Node),
    Listener(BTreeSet<StreamId>),
    Sac,
}

/// The global machine state (spec §3.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct State {
    pub streams: BTreeMap<StreamId, Stream>,
    pub monitors: BTreeMap<Pid, MonitorPurpose>,
    pub sac: SacState,
}

impl State {
    pub fn stream(&self, id: &StreamId) -> Option<&Stream> {
        self.streams.get(id)
    }

    pub fn stream_exists(&self, id: &StreamId) -> bool {
        self.streams.contains_key(id)
    }

    #[must_use]
    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.streams.insert(stream.id.clone(), stream);
        self
    }

    #[must_use]
    pub fn without_stream(mut self, id: &StreamId) -> Self {
        self.streams.remove(id);
        self
    }

    #[must_use]
    pub fn with_monitor(mut self, pid: Pid, purpose: MonitorPurpose) -> Self {
        self.monitors.insert(pid, purpose);
        self
    }

    #[must_use]
    pub fn without_monitor(mut self, pid: &Pid) -> Self {
        self.monitors.remove(pid);
        self
    }

    #[must_use]
    pub fn with_sac(mut self, sac: SacState) -> Self {
        self.sac = sac;
        self
    }
}
