//! Side-effects emitted by `apply` for the runtime and aux to execute
//! (spec §4.1, §4.6, §4.4, §4.5). The machine only ever *describes* these;
//! executing them is the caller's job — see `traits::Aux` and `runtime`.

use serde::{Deserialize, Serialize};
use streamcoord_types::{Epoch, Index, Node, Pid, StreamId};

use crate::error::CoordinatorError;
use crate::state::{Conf, ReplyTo};

/// The action tags aux accepts (spec §4.6: "the only action tags").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuxActionKind {
    StartWriter,
    StartReplica { leader_pid: Pid },
    Stop,
    DeleteMember,
    UpdateCatalog,
    UpdateRetention,
}

/// Correlation metadata carried on every aux action, matched back against
/// `member.current` when the corresponding command returns (spec §4.3: "the
/// key under which member_started/member_stopped/action_failed must
/// correlate").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxMeta {
    pub index: Index,
    pub epoch: Epoch,
    pub node: Node,
}

/// A single asynchronous side-effect scheduled for the aux worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxAction {
    pub stream_id: StreamId,
    pub meta: AuxMeta,
    pub conf: Conf,
    pub kind: AuxActionKind,
}

/// A pid or node the runtime should watch on the coordinator's behalf
/// (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorTarget {
    Process(Pid),
    Node(Node),
}

/// A message delivered to a registered listener (spec §4.4, §6.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    LeaderChange(Pid),
    LocalMemberChange(Pid),
    Eol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: Pid,
    pub queue_ref: String,
    pub kind: NotificationKind,
}

/// The release-cursor hint emitted every `RELEASE_CURSOR_INTERVAL` commands
/// (spec §4.1, §6.4). The payload shape is a supplemented detail — spec.md
/// specifies the policy but leaves the payload open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCursor {
    pub index: Index,
    pub state_hash: [u8; 32],
}

/// The dispatcher's synchronous answer to the command it just applied
/// (spec §4.1 "Reply policy"), also reused as the payload of a deferred
/// `DeliverReply` effect (spec §3.3 `reply_to`: fulfilled later, once the
/// writer becomes running).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Ok,
    OkWithPid(Pid),
    NoReply,
    Members(Vec<(Node, Option<Pid>, bool)>),
    Error(CoordinatorError),
}

/// Everything `apply` can hand back to the runtime alongside `(state',
/// reply)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Aux(AuxAction),
    Monitor(MonitorTarget),
    Notify(Notification),
    ReleaseCursor(ReleaseCursor),
    /// Fulfills a stream's `reply_to` once the writer becomes running
    /// (spec §4.3 rule 4, S1 scenario).
    DeliverReply { reply_to: ReplyTo, reply: Reply },
    /// `aux(maybe_resize)` from `tick` (spec §6.5); gated by the caller to
    /// one in-flight resizer.
    MaybeResize,
}
