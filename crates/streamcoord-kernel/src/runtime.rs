//! Non-production reference implementations of the runtime-facing traits
//! (spec §9 "Supplemented" in `SPEC_FULL.md`: "exists so the crate is
//! runnable/testable without a real log-server or Raft runtime"). Modeled
//! on the teacher's `InMemoryStorage`/`NoOpNetwork`: enough behavior to
//! drive the kernel end-to-end in tests and simulation, never intended for
//! production use.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, mpsc};
use std::time::{SystemTime, UNIX_EPOCH};

use streamcoord_types::{Node, StreamId};

use crate::command::Command;
use crate::effects::{AuxAction, AuxActionKind};
use crate::traits::{Aux, BootstrapCoordinator, Clock, CommandSink};

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}

/// A `Clock` that only advances when told to, for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self { now_ms: AtomicU64::new(start_ms) }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// A [`CommandSink`] backed by an `mpsc` channel, so a test can drain
/// injected commands after driving `apply`.
pub struct ChannelCommandSink {
    sender: mpsc::Sender<Command>,
}

impl ChannelCommandSink {
    pub fn new() -> (Self, mpsc::Receiver<Command>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl CommandSink for ChannelCommandSink {
    fn inject(&self, command: Command) {
        // A closed receiver means the test/simulation already tore down;
        // dropping the command is correct in that case.
        let _ = self.sender.send(command);
    }
}

/// An `Aux` that completes every action immediately and successfully,
/// synthesizing the matching success command. Tracks at most one in-flight
/// action per `(stream_id, node)`, per the contract (spec §4.6).
#[derive(Default)]
pub struct InMemoryAux {
    in_flight: Mutex<std::collections::BTreeMap<(StreamId, Node), (crate::state::ActionTag, streamcoord_types::Index)>>,
}

impl InMemoryAux {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aux for InMemoryAux {
    fn submit(&self, action: AuxAction, sink: &dyn CommandSink) {
        let key = (action.stream_id.clone(), action.meta.node.clone());
        {
            let mut in_flight = self.in_flight.lock().expect("aux in_flight lock poisoned");
            in_flight.insert(key, (action_tag_for(&action.kind), action.meta.index));
        }
        tracing::debug!(stream_id = %action.stream_id, node = %action.meta.node, kind = ?action.kind, "aux action submitted");

        let command = match action.kind {
            AuxActionKind::StartWriter | AuxActionKind::StartReplica { .. } => {
                let pid = streamcoord_types::Pid::new(action.meta.node.clone(), action.meta.index.as_u64());
                Command::MemberStarted {
                    stream_id: action.stream_id,
                    node: action.meta.node,
                    epoch: action.meta.epoch,
                    index: action.meta.index,
                    pid,
                }
            }
            AuxActionKind::Stop => {
                let tail = streamcoord_types::Tail::At(action.meta.epoch, streamcoord_types::Offset::new(0));
                Command::MemberStopped {
                    stream_id: action.stream_id,
                    node: action.meta.node,
                    epoch: action.meta.epoch,
                    index: action.meta.index,
                    tail,
                }
            }
            AuxActionKind::DeleteMember => {
                Command::MemberDeleted { stream_id: action.stream_id, node: action.meta.node }
            }
            AuxActionKind::UpdateCatalog => {
                Command::CatalogUpdated { stream_id: action.stream_id, epoch: action.meta.epoch }
            }
            AuxActionKind::UpdateRetention => {
                Command::RetentionUpdated { stream_id: action.stream_id, node: action.meta.node }
            }
        };
        sink.inject(command);
    }

    fn fail_active_actions(&self, exclude: &BTreeSet<StreamId>, sink: &dyn CommandSink) {
        let in_flight = self.in_flight.lock().expect("aux in_flight lock poisoned").clone();
        for ((stream_id, node), (tag, index)) in in_flight {
            if exclude.contains(&stream_id) {
                continue;
            }
            tracing::warn!(%stream_id, %node, "failing stranded aux action after leader change");
            sink.inject(Command::ActionFailed { stream_id, node, index, action: tag });
        }
    }
}

fn action_tag_for(kind: &AuxActionKind) -> crate::state::ActionTag {
    match kind {
        AuxActionKind::StartWriter | AuxActionKind::StartReplica { .. } => crate::state::ActionTag::Starting,
        AuxActionKind::Stop => crate::state::ActionTag::Stopping,
        AuxActionKind::DeleteMember => crate::state::ActionTag::Deleting,
        AuxActionKind::UpdateCatalog | AuxActionKind::UpdateRetention => crate::state::ActionTag::Updating,
    }
}

/// A [`BootstrapCoordinator`] that reports every requested member as
/// already started — suitable for single-process tests where no real
/// cluster-wide lock exists.
#[derive(Debug, Default)]
pub struct NoOpBootstrapCoordinator;

impl BootstrapCoordinator for NoOpBootstrapCoordinator {
    fn ensure_cluster(&self, members: &[Node]) -> Vec<Node> {
        members.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_request() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
    }

    #[test]
    fn bootstrap_coordinator_starts_every_member() {
        let coordinator = NoOpBootstrapCoordinator;
        let members = vec![Node::from("n1"), Node::from("n2")];
        assert_eq!(coordinator.ensure_cluster(&members), members);
    }
}
